use crate::storage::{BackendLocal, StorageManager};
use serde::{Deserialize, Serialize};

const TASK_QUEUE_MAX_THREADS: u16 = 4;
const TASK_QUEUE_MAX_RETRIES: u8 = 3;

/// Days a soft-deleted file survives before the purge sweep removes it.
const DEFAULT_PURGE_GRACE_DAYS: i64 = 7;

/// Default embedding model (768-dimensional vectors)
const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-004";
/// Default multimodal model used to describe image/audio/video uploads
const DEFAULT_MEDIA_MODEL: &str = "gemini-1.5-flash";
const DEFAULT_DIMENSIONS: usize = 768;
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_API_KEY_ENV: &str = "GEMINI_API_KEY";

/// Default relevance floor: nearest-neighbor search always returns
/// *something*, the floor suppresses the low-confidence tail.
const DEFAULT_SCORE_FLOOR: f32 = 0.40;
const DEFAULT_RESULT_LIMIT: usize = 16;
const DEFAULT_SURROGATE_MAX_CHARS: usize = 8000;

/// Configuration for the external model calls
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GenAiConfig {
    /// Embedding model name (e.g., "text-embedding-004")
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// Multimodal model used for image/audio/video description
    #[serde(default = "default_media_model")]
    pub media_model: String,

    /// Embedding dimensionality; must match the persisted vector index
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
}

impl Default for GenAiConfig {
    fn default() -> Self {
        Self {
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            media_model: DEFAULT_MEDIA_MODEL.to_string(),
            dimensions: DEFAULT_DIMENSIONS,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            api_key_env: DEFAULT_API_KEY_ENV.to_string(),
        }
    }
}

/// Configuration for semantic search and surrogate extraction
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Minimum relevance score [0.0, 1.0]; candidates at or below are dropped
    #[serde(default = "default_score_floor")]
    pub score_floor: f32,

    /// Nearest-neighbor candidate cap per query
    #[serde(default = "default_result_limit")]
    pub result_limit: usize,

    /// Extracted surrogate text is truncated to this many characters
    #[serde(default = "default_surrogate_max_chars")]
    pub surrogate_max_chars: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            score_floor: DEFAULT_SCORE_FLOOR,
            result_limit: DEFAULT_RESULT_LIMIT,
            surrogate_max_chars: DEFAULT_SURROGATE_MAX_CHARS,
        }
    }
}

fn default_embedding_model() -> String {
    DEFAULT_EMBEDDING_MODEL.to_string()
}

fn default_media_model() -> String {
    DEFAULT_MEDIA_MODEL.to_string()
}

fn default_dimensions() -> usize {
    DEFAULT_DIMENSIONS
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_api_key_env() -> String {
    DEFAULT_API_KEY_ENV.to_string()
}

fn default_score_floor() -> f32 {
    DEFAULT_SCORE_FLOOR
}

fn default_result_limit() -> usize {
    DEFAULT_RESULT_LIMIT
}

fn default_surrogate_max_chars() -> usize {
    DEFAULT_SURROGATE_MAX_CHARS
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "task_queue_max_threads")]
    pub task_queue_max_threads: u16,
    #[serde(default = "task_queue_max_retries")]
    pub task_queue_max_retries: u8,
    #[serde(default = "purge_grace_days")]
    pub purge_grace_days: i64,
    #[serde(default)]
    pub genai: GenAiConfig,
    #[serde(default)]
    pub search: SearchConfig,

    #[serde(skip_serializing, skip_deserializing)]
    base_path: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            task_queue_max_threads: TASK_QUEUE_MAX_THREADS,
            task_queue_max_retries: TASK_QUEUE_MAX_RETRIES,
            purge_grace_days: DEFAULT_PURGE_GRACE_DAYS,
            genai: GenAiConfig::default(),
            search: SearchConfig::default(),
            base_path: String::new(),
        }
    }
}

fn task_queue_max_threads() -> u16 {
    TASK_QUEUE_MAX_THREADS
}

fn task_queue_max_retries() -> u8 {
    TASK_QUEUE_MAX_RETRIES
}

fn purge_grace_days() -> i64 {
    DEFAULT_PURGE_GRACE_DAYS
}

impl Config {
    fn validate(&mut self) {
        if self.task_queue_max_threads == 0 {
            self.task_queue_max_threads = 1
        }

        if self.purge_grace_days < 0 {
            panic!(
                "purge_grace_days must not be negative, got {}",
                self.purge_grace_days
            );
        }

        let search = &self.search;
        if !(0.0..=1.0).contains(&search.score_floor) {
            panic!(
                "search.score_floor must be between 0.0 and 1.0, got {}",
                search.score_floor
            );
        }
        if search.result_limit == 0 {
            panic!("search.result_limit must be greater than 0");
        }
        if search.surrogate_max_chars == 0 {
            panic!("search.surrogate_max_chars must be greater than 0");
        }

        let genai = &self.genai;
        if genai.dimensions == 0 {
            panic!("genai.dimensions must be greater than 0");
        }
        if genai.timeout_secs == 0 {
            panic!("genai.timeout_secs must be greater than 0");
        }
    }

    pub fn load_with(base_path: &str) -> anyhow::Result<Self> {
        let store = BackendLocal::new(base_path)?;

        // create new if does not exist
        if !store.exists("config.yaml") {
            store.write(
                "config.yaml",
                serde_yml::to_string(&Self::default())?.as_bytes(),
            )?;
        }

        let config_str = String::from_utf8(
            store
                .fetch("config.yaml")
                .ok_or_else(|| anyhow::anyhow!("config.yaml vanished during load"))?,
        )?;
        let mut config: Self = serde_yml::from_str(&config_str)?;

        config.base_path = base_path.to_string();

        config.validate();

        // resave in case config version needs an upgrade
        if config_str != serde_yml::to_string(&config)? {
            config.save()?;
        }

        Ok(config)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let store = BackendLocal::new(&self.base_path)?;

        let config_str = serde_yml::to_string(&self)?;
        store.write("config.yaml", config_str.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_configuration() {
        let config = Config::default();
        assert_eq!(config.search.score_floor, 0.40);
        assert_eq!(config.search.result_limit, 16);
        assert_eq!(config.search.surrogate_max_chars, 8000);
        assert_eq!(config.genai.dimensions, 768);
        assert_eq!(config.genai.embedding_model, "text-embedding-004");
        assert_eq!(config.purge_grace_days, 7);
    }

    #[test]
    fn load_creates_config_and_roundtrips() {
        let tmp = tempfile::tempdir().unwrap();
        let base = tmp.path().to_str().unwrap();

        let config = Config::load_with(base).unwrap();
        assert_eq!(config.search.result_limit, 16);

        // second load reads the file written by the first
        let config = Config::load_with(base).unwrap();
        assert_eq!(config.genai.media_model, "gemini-1.5-flash");
    }

    #[test]
    #[should_panic(expected = "score_floor")]
    fn out_of_range_floor_panics() {
        let mut config = Config::default();
        config.search.score_floor = 1.5;
        config.validate();
    }

    #[test]
    #[should_panic(expected = "dimensions")]
    fn zero_dimensions_panics() {
        let mut config = Config::default();
        config.genai.dimensions = 0;
        config.validate();
    }
}
