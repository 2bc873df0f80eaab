use std::fmt::Display;
use ulid::Ulid;

/// Lexicographically sortable ident used for blob names.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Eid(String);

impl Display for Eid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Eid> for String {
    fn from(fr: Eid) -> Self {
        fr.0
    }
}

impl Eid {
    #[inline]
    pub fn new() -> Eid {
        Eid(Ulid::new().to_string())
    }
}

impl Default for Eid {
    fn default() -> Self {
        Self::new()
    }
}
