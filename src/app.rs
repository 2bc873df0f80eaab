use crate::{
    config::Config,
    eid::Eid,
    extract,
    files::{self, FileCategory, FileCreate, FileManager, FileQuery, FileRecord},
    genai::{Embedder, GeminiClient, MediaDescriber},
    semantic::{SearchError, SearchHit, SearchService, VectorStore},
    storage::{self, StorageManager},
};
use anyhow::Context;
use std::{
    path::PathBuf,
    sync::{
        atomic::{AtomicU16, Ordering},
        mpsc, Arc, RwLock,
    },
    thread::sleep,
    time::Duration,
};

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("file not found")]
    NotFound,

    #[error("unknown file category: {0}")]
    UnknownCategory(String),

    #[error("search error: {0}")]
    Search(#[from] SearchError),

    #[error("io error: {0:?}")]
    IO(#[from] std::io::Error),

    #[error("Base64: {0:?}")]
    Base64(#[from] base64::DecodeError),

    #[error("unexpected error: {0:?}")]
    Other(#[from] anyhow::Error),
}

/// Unit of deferred work dispatched through the task queue.
#[derive(Clone, Debug)]
pub enum Task {
    /// request to (re)run extraction + embedding for a file
    GenerateEmbedding { file_id: u64 },

    /// request to gracefully shutdown the task queue
    Shutdown,
}

/// Result of one orchestrator invocation. Every variant except
/// `Embedded` is a deliberate no-op, not a failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EmbedOutcome {
    /// vector computed and persisted (overwriting any prior one)
    Embedded,
    /// record vanished before the task ran (concurrent delete)
    MissingRecord,
    /// record exists but its blob is gone
    MissingBlob,
    /// extraction produced nothing to embed
    EmptySurrogate,
}

#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub name: String,
    pub org_id: String,
    pub user_id: String,
    /// Declared category; sniffed from name/bytes when absent.
    pub category: Option<FileCategory>,
    pub data: Vec<u8>,
}

pub struct App {
    pub file_mgr: Arc<dyn FileManager>,
    pub storage_mgr: Arc<dyn StorageManager>,
    pub vectors: Arc<VectorStore>,

    embedder: Arc<dyn Embedder>,
    describer: Arc<dyn MediaDescriber>,
    search: SearchService,

    task_tx: Option<Arc<mpsc::Sender<Task>>>,
    task_queue_handle: Option<std::thread::JoinHandle<()>>,

    config: Arc<RwLock<Config>>,
    base_path: PathBuf,
}

/// Resolve the data directory: env override first, then the platform
/// user data dir.
pub fn base_path() -> String {
    use homedir::my_home;

    std::env::var("FILESHELF_BASE_PATH").unwrap_or_else(|_| {
        format!(
            "{}/.local/share/fileshelf",
            my_home()
                .expect("couldnt find home dir")
                .expect("couldnt find home dir")
                .to_string_lossy()
        )
    })
}

impl App {
    pub fn new(config: Arc<RwLock<Config>>, base_path: &str) -> anyhow::Result<Self> {
        let base = PathBuf::from(base_path);
        std::fs::create_dir_all(&base)?;

        let file_mgr: Arc<dyn FileManager> = Arc::new(
            files::BackendCsv::load(
                base.join("files.csv")
                    .to_str()
                    .context("invalid base path")?,
            )
            .context("failed to load file database")?,
        );

        let storage_mgr: Arc<dyn StorageManager> = Arc::new(storage::BackendLocal::new(
            base.join("blobs").to_str().context("invalid base path")?,
        )?);

        let (genai_cfg, search_cfg) = {
            let config = config.read().unwrap();
            (config.genai.clone(), config.search.clone())
        };

        let client = Arc::new(GeminiClient::new(&genai_cfg)?);
        let embedder: Arc<dyn Embedder> = client.clone();
        let describer: Arc<dyn MediaDescriber> = client;

        let vectors = Arc::new(VectorStore::open(
            base.join("vectors.bin"),
            genai_cfg.dimensions,
            embedder.model_id_hash(),
        )?);

        let search = SearchService::new(
            vectors.clone(),
            embedder.clone(),
            file_mgr.clone(),
            search_cfg,
        );

        Ok(Self {
            file_mgr,
            storage_mgr,
            vectors,
            embedder,
            describer,
            search,
            task_tx: None,
            task_queue_handle: None,
            config,
            base_path: base,
        })
    }

    /// Directory served by the daemon's blob route.
    pub fn blobs_path(&self) -> PathBuf {
        self.base_path.join("blobs")
    }

    pub fn config(&self) -> Arc<RwLock<Config>> {
        self.config.clone()
    }

    // ------------------------------------------------------------------
    // upload path
    // ------------------------------------------------------------------

    /// Store the raw bytes, create the record, and schedule embedding.
    ///
    /// Returns as soon as the record exists; extraction and embedding run
    /// later on the task queue, so upload latency never depends on them.
    pub fn upload(&self, request: UploadRequest) -> anyhow::Result<FileRecord> {
        let category = request
            .category
            .unwrap_or_else(|| FileCategory::sniff(&request.name, &request.data));

        let blob_id = match request.name.rsplit_once('.') {
            Some((_, ext)) if !ext.is_empty() && ext.len() <= 8 => {
                format!("{}.{}", Eid::new(), ext.to_lowercase())
            }
            _ => Eid::new().to_string(),
        };

        self.storage_mgr.write(&blob_id, &request.data)?;

        let record = self.file_mgr.create(FileCreate {
            name: request.name,
            category,
            org_id: request.org_id,
            user_id: request.user_id,
            blob_id,
        })?;

        self.schedule_embedding(record.id);

        Ok(record)
    }

    // ------------------------------------------------------------------
    // embedding orchestrator
    // ------------------------------------------------------------------

    /// One orchestrator invocation: load → fetch → extract → embed →
    /// persist.
    ///
    /// Missing record/blob and empty surrogates are silent no-ops. An
    /// embedding-service failure propagates so the record stays
    /// vectorless and visible to the backfill sweep; extraction failures
    /// never propagate (the dispatcher falls back to the display name).
    pub fn run_embedding(
        file_id: u64,
        file_mgr: &Arc<dyn FileManager>,
        storage_mgr: &Arc<dyn StorageManager>,
        vectors: &Arc<VectorStore>,
        embedder: &Arc<dyn Embedder>,
        describer: &Arc<dyn MediaDescriber>,
        surrogate_max_chars: usize,
    ) -> anyhow::Result<EmbedOutcome> {
        let Some(record) = file_mgr.get(file_id)? else {
            log::debug!("file {file_id} vanished before embedding, nothing to do");
            return Ok(EmbedOutcome::MissingRecord);
        };

        let Some(bytes) = storage_mgr.fetch(&record.blob_id) else {
            log::info!("no blob found for file {} ({:?})", record.id, record.name);
            return Ok(EmbedOutcome::MissingBlob);
        };

        let surrogate = extract::extract_surrogate(
            record.category,
            &record.name,
            &bytes,
            describer.as_ref(),
            surrogate_max_chars,
        );

        if surrogate.text.is_empty() {
            log::info!("empty surrogate for file {}, skipping embedding", record.id);
            return Ok(EmbedOutcome::EmptySurrogate);
        }

        let embedding = embedder.embed(&surrogate.text)?;

        vectors
            .persist(record.id, &record.org_id, embedding)
            .with_context(|| format!("persisting vector for file {}", record.id))?;

        log::debug!(
            "embedded file {} ({} surrogate chars{})",
            record.id,
            surrogate.text.chars().count(),
            if surrogate.fallback { ", name fallback" } else { "" }
        );

        Ok(EmbedOutcome::Embedded)
    }

    // ------------------------------------------------------------------
    // queries
    // ------------------------------------------------------------------

    pub fn search_semantic(&self, org_id: &str, query: &str) -> Result<Vec<SearchHit>, AppError> {
        Ok(self.search.search(org_id, query)?)
    }

    pub fn search_files(&self, query: FileQuery) -> anyhow::Result<Vec<FileRecord>> {
        self.file_mgr.search(query)
    }

    pub fn total(&self) -> anyhow::Result<usize> {
        self.file_mgr.total()
    }

    /// Total blob bytes of an org's active files.
    pub fn storage_usage(&self, org_id: &str) -> anyhow::Result<u64> {
        let records = self.file_mgr.search(FileQuery {
            org_id: Some(org_id.to_string()),
            ..Default::default()
        })?;

        Ok(records
            .iter()
            .filter_map(|record| self.storage_mgr.size(&record.blob_id))
            .sum())
    }

    // ------------------------------------------------------------------
    // lifecycle
    // ------------------------------------------------------------------

    pub fn soft_delete(&self, id: u64) -> Result<FileRecord, AppError> {
        if self.file_mgr.get(id)?.is_none() {
            return Err(AppError::NotFound);
        }
        Ok(self
            .file_mgr
            .soft_delete(id, chrono::Utc::now().timestamp_millis())?)
    }

    pub fn restore(&self, id: u64) -> Result<FileRecord, AppError> {
        if self.file_mgr.get(id)?.is_none() {
            return Err(AppError::NotFound);
        }
        Ok(self.file_mgr.restore(id)?)
    }

    /// Hard-delete every record soft-deleted longer than the grace
    /// period: blob, vector, then the record itself.
    pub fn purge_deleted(&self) -> anyhow::Result<usize> {
        let grace_days = self.config.read().unwrap().purge_grace_days;
        let cutoff = chrono::Utc::now().timestamp_millis() - grace_days * 24 * 60 * 60 * 1000;

        let trash = self.file_mgr.search(FileQuery {
            deleted_only: true,
            ..Default::default()
        })?;

        let mut purged = 0;
        for record in trash {
            let Some(deleted_on) = record.deleted_on else {
                continue;
            };
            if deleted_on >= cutoff {
                continue;
            }

            if let Err(err) = self.storage_mgr.delete(&record.blob_id) {
                log::warn!("failed to delete blob {}: {err}", record.blob_id);
            }
            if let Err(err) = self.vectors.remove(record.id) {
                log::warn!("failed to drop vector for file {}: {err}", record.id);
            }
            self.file_mgr.delete(record.id)?;
            purged += 1;
        }

        log::info!("purged {purged} files past the deletion grace period");
        Ok(purged)
    }

    // ------------------------------------------------------------------
    // maintenance sweeps
    // ------------------------------------------------------------------

    /// Schedule one embedding invocation for every active record without
    /// a vector. Safe to run repeatedly: once all scheduled invocations
    /// complete, the next sweep schedules nothing.
    pub fn backfill(&self) -> anyhow::Result<usize> {
        let records = self.file_mgr.search(FileQuery::default())?;

        let mut scheduled = 0;
        for record in records {
            if self.vectors.contains(record.id) {
                continue;
            }
            self.schedule_embedding(record.id);
            scheduled += 1;
        }

        log::info!("scheduled background embedding generation for {scheduled} files");
        Ok(scheduled)
    }

    /// Re-run extraction + embedding for one file regardless of its
    /// current state (manual remediation).
    pub fn schedule_retry(&self, file_id: u64) {
        log::info!("scheduled embedding retry for file {file_id}");
        self.schedule_embedding(file_id);
    }

    fn schedule_embedding(&self, file_id: u64) {
        let Some(task_tx) = self.task_tx.as_ref() else {
            log::error!("task queue is not running, dropping embedding task for {file_id}");
            return;
        };
        if let Err(err) = task_tx.send(Task::GenerateEmbedding { file_id }) {
            log::error!("failed to schedule embedding for {file_id}: {err}");
        }
    }

    // ------------------------------------------------------------------
    // task queue
    // ------------------------------------------------------------------

    pub fn run_queue(&mut self) {
        let (task_tx, task_rx) = mpsc::channel::<Task>();
        let handle = std::thread::spawn({
            let file_mgr = self.file_mgr.clone();
            let storage_mgr = self.storage_mgr.clone();
            let vectors = self.vectors.clone();
            let embedder = self.embedder.clone();
            let describer = self.describer.clone();
            let config = self.config.clone();

            move || {
                Self::start_queue(
                    task_rx,
                    file_mgr,
                    storage_mgr,
                    vectors,
                    embedder,
                    describer,
                    config,
                );
            }
        });

        self.task_queue_handle = Some(handle);
        self.task_tx = Some(Arc::new(task_tx));
    }

    fn start_queue(
        task_rx: mpsc::Receiver<Task>,
        file_mgr: Arc<dyn FileManager>,
        storage_mgr: Arc<dyn StorageManager>,
        vectors: Arc<VectorStore>,
        embedder: Arc<dyn Embedder>,
        describer: Arc<dyn MediaDescriber>,
        config: Arc<RwLock<Config>>,
    ) {
        let thread_ctr = Arc::new(AtomicU16::new(0));

        log::debug!("waiting for job");
        while let Ok(task) = task_rx.recv() {
            let thread_counter = thread_ctr.clone();

            // graceful shutdown: wait out in-flight workers
            if let Task::Shutdown = &task {
                while thread_counter.load(Ordering::Relaxed) > 0 {
                    sleep(Duration::from_millis(100));
                }
                return;
            };

            let max_threads = config.read().unwrap().task_queue_max_threads;
            while thread_counter.load(Ordering::Relaxed) >= max_threads {
                sleep(Duration::from_millis(100));
            }

            let task_handle = std::thread::spawn({
                let thread_counter = thread_counter.clone();
                let file_mgr = file_mgr.clone();
                let storage_mgr = storage_mgr.clone();
                let vectors = vectors.clone();
                let embedder = embedder.clone();
                let describer = describer.clone();
                let config = config.clone();

                move || {
                    thread_counter.fetch_add(1, Ordering::Relaxed);

                    let Task::GenerateEmbedding { file_id } = task else {
                        unreachable!()
                    };

                    let (max_retries, max_chars) = {
                        let config = config.read().unwrap();
                        (
                            config.task_queue_max_retries,
                            config.search.surrogate_max_chars,
                        )
                    };

                    let mut attempt = 0u8;
                    loop {
                        let result = Self::run_embedding(
                            file_id,
                            &file_mgr,
                            &storage_mgr,
                            &vectors,
                            &embedder,
                            &describer,
                            max_chars,
                        );

                        match result {
                            Ok(outcome) => {
                                log::debug!("embedding task for {file_id}: {outcome:?}");
                                break;
                            }
                            Err(err) if attempt < max_retries && is_retryable_error(&err) => {
                                attempt += 1;
                                let delay_ms = 5000 * 2u64.pow(attempt as u32 - 1) + rand_jitter();
                                log::info!(
                                    "embedding task for {file_id}: retrying (attempt {attempt}/{max_retries}) after error: {err:#}, backoff {delay_ms}ms"
                                );
                                sleep(Duration::from_millis(delay_ms));
                            }
                            Err(err) => {
                                // record stays vectorless; the backfill
                                // sweep will pick it up again
                                log::error!("embedding task for {file_id} failed: {err:#}");
                                break;
                            }
                        }
                    }

                    thread_counter.fetch_sub(1, Ordering::Relaxed);
                }
            });

            // handle thread panics
            std::thread::spawn(move || {
                if let Err(err) = task_handle.join() {
                    log::error!("embedding worker panicked: {err:?}");
                    thread_counter.fetch_sub(1, Ordering::Relaxed);
                }
            });
        }
    }

    pub fn shutdown(&self) {
        let Some(task_tx) = self.task_tx.as_ref() else {
            return;
        };
        if let Err(err) = task_tx.send(Task::Shutdown) {
            log::error!("failed to send shutdown: {err}");
        }
    }

    pub fn wait_task_queue_finish(&mut self) {
        if let Some(handle) = self.task_queue_handle.take() {
            if handle.join().is_err() {
                log::error!("task queue thread panicked");
            }
        }
    }
}

/// Network-ish failures are worth a backoff retry; client errors are not.
fn is_retryable_error(err: &anyhow::Error) -> bool {
    let msg = format!("{err:#}").to_lowercase();

    let retryable = msg.contains("timeout")
        || msg.contains("timed out")
        || msg.contains("connection")
        || msg.contains("reset by peer")
        || msg.contains("status 500")
        || msg.contains("status 502")
        || msg.contains("status 503")
        || msg.contains("status 504");

    let is_client_error = msg.contains("status 400")
        || msg.contains("status 401")
        || msg.contains("status 403")
        || msg.contains("status 404")
        || msg.contains("status 429");

    retryable && !is_client_error
}

fn rand_jitter() -> u64 {
    rand::random::<u64>() % 2000
}

#[cfg(test)]
impl App {
    pub fn new_with(
        file_mgr: Arc<dyn FileManager>,
        storage_mgr: Arc<dyn StorageManager>,
        vectors: Arc<VectorStore>,
        embedder: Arc<dyn Embedder>,
        describer: Arc<dyn MediaDescriber>,
        task_tx: Arc<mpsc::Sender<Task>>,
        config: Arc<RwLock<Config>>,
        base_path: &std::path::Path,
    ) -> Self {
        let search = SearchService::new(
            vectors.clone(),
            embedder.clone(),
            file_mgr.clone(),
            config.read().unwrap().search.clone(),
        );

        Self {
            file_mgr,
            storage_mgr,
            vectors,
            embedder,
            describer,
            search,
            task_tx: Some(task_tx),
            task_queue_handle: None,
            config,
            base_path: base_path.to_path_buf(),
        }
    }

    pub fn embedder(&self) -> Arc<dyn Embedder> {
        self.embedder.clone()
    }

    pub fn describer(&self) -> Arc<dyn MediaDescriber> {
        self.describer.clone()
    }
}
