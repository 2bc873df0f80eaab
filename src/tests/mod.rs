//! Crate-internal integration tests.
//!
//! Each test gets an isolated temp directory and deterministic stub
//! model clients, so no test touches the network or real data.

mod search;

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    mpsc, Arc, RwLock,
};

use crate::app::{App, EmbedOutcome, Task};
use crate::config::Config;
use crate::files::{self, FileManager};
use crate::genai::{model_id_hash, Embedder, GenAiError, MediaDescriber};
use crate::semantic::VectorStore;
use crate::storage::{self, StorageManager};

/// Stub dimensionality; small enough to eyeball, large enough that the
/// test vocabulary maps to distinct dimensions.
pub const STUB_DIMS: usize = 256;

/// Deterministic bag-of-words embedder: each lowercase token lands in
/// the dimension given by its byte sum, so texts sharing a token score
/// high and disjoint texts score zero.
pub struct StubEmbedder {
    dims: usize,
    fail_remaining: AtomicUsize,
}

impl StubEmbedder {
    pub fn new() -> Self {
        Self {
            dims: STUB_DIMS,
            fail_remaining: AtomicUsize::new(0),
        }
    }

    /// Fail the next `times` embed calls with a retryable-looking error.
    pub fn fail_next(&self, times: usize) {
        self.fail_remaining.store(times, Ordering::SeqCst);
    }
}

impl Embedder for StubEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, GenAiError> {
        let remaining = self.fail_remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_remaining.store(remaining - 1, Ordering::SeqCst);
            return Err(GenAiError::Api {
                status: 503,
                body: "embedding service unavailable".to_string(),
            });
        }

        let mut vector = vec![0.0f32; self.dims];
        for token in text
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let dim = token.bytes().map(|b| b as usize).sum::<usize>() % self.dims;
            vector[dim] += 1.0;
        }

        // punctuation-only input would otherwise produce a zero vector
        if vector.iter().all(|v| *v == 0.0) {
            vector[0] = 1.0;
        }

        Ok(vector)
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    fn model_id_hash(&self) -> [u8; 32] {
        model_id_hash("stub-embedder")
    }
}

/// Media describer returning a fixed description, or an error when
/// constructed with `None`.
pub struct StubDescriber {
    response: Option<String>,
}

impl StubDescriber {
    pub fn saying(text: &str) -> Self {
        Self {
            response: Some(text.to_string()),
        }
    }

    pub fn failing() -> Self {
        Self { response: None }
    }
}

impl MediaDescriber for StubDescriber {
    fn describe(
        &self,
        _bytes: &[u8],
        _mime_hint: &str,
        _prompt: &str,
    ) -> Result<String, GenAiError> {
        self.response
            .clone()
            .ok_or_else(|| GenAiError::Response("stub describer has no answer".to_string()))
    }
}

pub struct Harness {
    pub app: App,
    pub embedder: Arc<StubEmbedder>,
    pub task_rx: mpsc::Receiver<Task>,
    pub tmp: tempfile::TempDir,
}

/// Creates an isolated App over a unique temp directory with stub model
/// clients. The task channel's receiving end is handed back so tests can
/// observe exactly what got scheduled.
pub fn create_app() -> Harness {
    create_app_with_describer(StubDescriber::saying("described media"))
}

pub fn create_app_with_describer(describer: StubDescriber) -> Harness {
    let tmp = tempfile::tempdir().expect("failed to create temp dir");

    let file_mgr: Arc<dyn FileManager> = Arc::new(
        files::BackendCsv::load(tmp.path().join("files.csv").to_str().unwrap())
            .expect("failed to create file csv"),
    );
    let storage_mgr: Arc<dyn StorageManager> = Arc::new(
        storage::BackendLocal::new(tmp.path().join("blobs").to_str().unwrap())
            .expect("failed to create blob storage"),
    );

    let embedder = Arc::new(StubEmbedder::new());
    let vectors = Arc::new(
        VectorStore::open(
            tmp.path().join("vectors.bin"),
            embedder.dimensions(),
            embedder.model_id_hash(),
        )
        .expect("failed to open vector store"),
    );

    let (task_tx, task_rx) = mpsc::channel::<Task>();
    let config = Arc::new(RwLock::new(
        Config::load_with(tmp.path().to_str().unwrap()).expect("failed to load config"),
    ));

    let app = App::new_with(
        file_mgr,
        storage_mgr,
        vectors,
        embedder.clone(),
        Arc::new(describer),
        Arc::new(task_tx),
        config,
        tmp.path(),
    );

    Harness {
        app,
        embedder,
        task_rx,
        tmp,
    }
}

/// Run one orchestrator invocation synchronously, the way a queue worker
/// would.
pub fn run_embedding(app: &App, file_id: u64) -> anyhow::Result<EmbedOutcome> {
    App::run_embedding(
        file_id,
        &app.file_mgr,
        &app.storage_mgr,
        &app.vectors,
        &app.embedder(),
        &app.describer(),
        8000,
    )
}

/// Drain every task currently in the queue, returning the embedding ids.
pub fn drain_tasks(task_rx: &mpsc::Receiver<Task>) -> Vec<u64> {
    task_rx
        .try_iter()
        .filter_map(|task| match task {
            Task::GenerateEmbedding { file_id } => Some(file_id),
            Task::Shutdown => None,
        })
        .collect()
}
