//! Zip archive manifest surrogate.
//!
//! Member contents are never decompressed; the surrogate is a sentence
//! listing the visible member names, which is enough to make the archive
//! findable by what it contains.

use std::io::Cursor;

use anyhow::Context;
use zip::ZipArchive;

const MANIFEST_PREFIX: &str = "A ZIP archive containing the following files: ";

/// Hidden entries (dotfiles) and packaging metadata (e.g. `__MACOSX/`)
/// say nothing about the archive's content.
fn is_visible(name: &str) -> bool {
    !name.starts_with('.') && !name.starts_with("__")
}

pub fn describe_members(bytes: &[u8]) -> anyhow::Result<String> {
    let mut archive = ZipArchive::new(Cursor::new(bytes)).context("zip container")?;

    let mut names = Vec::new();
    for index in 0..archive.len() {
        let entry = archive
            .by_index(index)
            .with_context(|| format!("zip entry {index}"))?;
        let name = entry.name().to_string();
        if is_visible(&name) {
            names.push(name);
        }
    }

    Ok(format!("{MANIFEST_PREFIX}{}", names.join(", ")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::office::tests::zip_container;

    #[test]
    fn lists_visible_members_only() {
        let bytes = zip_container(&[("a.txt", "alpha"), ("__MACOSX/b", "junk")]);
        assert_eq!(
            describe_members(&bytes).unwrap(),
            "A ZIP archive containing the following files: a.txt"
        );
    }

    #[test]
    fn skips_dotfiles_and_keeps_member_order() {
        let bytes = zip_container(&[
            ("docs/readme.md", "hello"),
            (".DS_Store", "junk"),
            ("src/main.rs", "fn main() {}"),
        ]);
        assert_eq!(
            describe_members(&bytes).unwrap(),
            "A ZIP archive containing the following files: docs/readme.md, src/main.rs"
        );
    }

    #[test]
    fn empty_archive_yields_bare_manifest() {
        let bytes = zip_container(&[]);
        // trailing space is trimmed by the dispatcher's post-processing
        assert_eq!(
            describe_members(&bytes).unwrap(),
            "A ZIP archive containing the following files: "
        );
    }

    #[test]
    fn non_zip_bytes_are_an_error() {
        assert!(describe_members(b"\x00\x01\x02").is_err());
    }
}
