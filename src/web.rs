use crate::{
    app::{App, AppError, UploadRequest},
    config::Config,
    files::{FileCategory, FileQuery, FileRecord},
    semantic::SearchHit,
};
use axum::{
    extract::{DefaultBodyLimit, State},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::{fmt::Debug, sync::Arc};
use tokio::{signal, sync::RwLock};

#[derive(Clone)]
struct SharedState {
    app: Arc<RwLock<App>>,
}

async fn start_app(app: App, listen: &str) {
    let blobs_dir = app.blobs_path();
    let app = Arc::new(RwLock::new(app));

    let signal = shutdown_signal(app.clone());
    let shared_state = Arc::new(SharedState { app: app.clone() });

    async fn shutdown_signal(app: Arc<RwLock<App>>) {
        let ctrl_c = async {
            signal::ctrl_c()
                .await
                .expect("failed to install Ctrl+C handler");
        };

        let terminate = async {
            signal::unix::signal(signal::unix::SignalKind::terminate())
                .expect("failed to install signal handler")
                .recv()
                .await;
        };

        tokio::select! {
            _ = ctrl_c => {
                let mut app = app.write().await;
                app.shutdown();

                log::warn!("waiting for task queue to stop");
                app.wait_task_queue_finish();
            },
            _ = terminate => {},
        }
    }

    let app = router(shared_state)
        .nest_service("/api/blob", tower_http::services::ServeDir::new(blobs_dir))
        .layer(DefaultBodyLimit::max(100 * 1024 * 1024))
        .layer(
            tower_http::trace::TraceLayer::new_for_http()
                .make_span_with(
                    tower_http::trace::DefaultMakeSpan::new().level(tracing::Level::INFO),
                )
                .on_response(
                    tower_http::trace::DefaultOnResponse::new().level(tracing::Level::INFO),
                ),
        );

    let listener = tokio::net::TcpListener::bind(listen).await.unwrap();
    log::info!("listening on {listen}");
    axum::serve(listener, app)
        .with_graceful_shutdown(signal)
        .await
        .unwrap();
}

fn router(shared_state: Arc<SharedState>) -> Router {
    Router::new()
        .route("/api/files/upload", post(upload))
        .route("/api/files/search", post(search_files))
        .route("/api/files/delete", post(delete))
        .route("/api/files/restore", post(restore))
        .route("/api/files/total", post(total))
        .route("/api/search", post(search_semantic))
        .route("/api/usage", post(usage))
        .route("/api/maintenance/backfill", post(backfill))
        .route("/api/maintenance/retry", post(retry))
        .route("/api/maintenance/purge", post(purge))
        .route("/api/config", get(get_config))
        .with_state(shared_state)
}

pub fn start_daemon(app: App, listen: &str) {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(async { start_app(app, listen).await });
}

// Make our own error that wraps `AppError`.
#[derive(Debug)]
struct HttpError(AppError);

// Tell axum how to convert `AppError` into a response.
impl IntoResponse for HttpError {
    fn into_response(self) -> axum::response::Response {
        match self.0 {
            AppError::NotFound => (
                axum::http::StatusCode::NOT_FOUND,
                json!({"error": self.0.to_string()}).to_string(),
            ),
            AppError::UnknownCategory(_) => (
                axum::http::StatusCode::BAD_REQUEST,
                json!({"error": self.0.to_string()}).to_string(),
            ),
            AppError::Base64(_) => {
                log::error!("{self:?}");
                (
                    axum::http::StatusCode::BAD_REQUEST,
                    json!({"error": self.0.to_string()}).to_string(),
                )
            }
            AppError::Search(_) => {
                log::error!("{self:?}");
                (
                    axum::http::StatusCode::BAD_GATEWAY,
                    json!({"error": self.0.to_string()}).to_string(),
                )
            }
            AppError::IO(_) => {
                log::error!("{self:?}");
                (
                    axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                    json!({"error": self.0.to_string()}).to_string(),
                )
            }
            AppError::Other(_) => {
                log::error!("{self:?}");
                (
                    axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                    json!({"error": self.0.to_string()}).to_string(),
                )
            }
        }
        .into_response()
    }
}

impl<E> From<E> for HttpError
where
    E: Into<AppError>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

#[derive(Deserialize, Serialize)]
pub struct UploadFileRequest {
    pub name: String,
    pub org_id: String,
    #[serde(default)]
    pub user_id: String,
    /// Declared category; sniffed from name and bytes when omitted.
    pub category: Option<String>,
    pub data_b64: String,
}

impl Debug for UploadFileRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "UploadFileRequest {{ name: {:?}, org_id: {:?}, user_id: {:?}, category: {:?}, data_b64: [redacted] }}",
            self.name, self.org_id, self.user_id, self.category
        )
    }
}

async fn upload(
    State(state): State<Arc<SharedState>>,
    Json(payload): Json<UploadFileRequest>,
) -> Result<axum::Json<FileRecord>, HttpError> {
    log::debug!("payload: {payload:?}");

    let app = state.app.clone();

    tokio::task::block_in_place(move || {
        let app = app.blocking_read();

        let category = payload
            .category
            .as_deref()
            .map(|c| {
                c.parse::<FileCategory>()
                    .map_err(|_| AppError::UnknownCategory(c.to_string()))
            })
            .transpose()?;

        let data = STANDARD.decode(payload.data_b64).map_err(AppError::Base64)?;

        let record = app.upload(UploadRequest {
            name: payload.name,
            org_id: payload.org_id,
            user_id: payload.user_id,
            category,
            data,
        })?;

        Ok(record.into())
    })
}

async fn search_files(
    State(state): State<Arc<SharedState>>,
    Json(payload): Json<FileQuery>,
) -> Result<axum::Json<Vec<FileRecord>>, HttpError> {
    log::debug!("payload: {payload:?}");

    let app = state.app.clone();

    tokio::task::block_in_place(move || {
        let app = app.blocking_read();
        app.search_files(payload).map(Into::into).map_err(Into::into)
    })
}

#[derive(Debug, Deserialize, Serialize)]
pub struct SemanticSearchRequest {
    pub org_id: String,
    pub query: String,
}

async fn search_semantic(
    State(state): State<Arc<SharedState>>,
    Json(payload): Json<SemanticSearchRequest>,
) -> Result<axum::Json<Vec<SearchHit>>, HttpError> {
    log::debug!("payload: {payload:?}");

    let app = state.app.clone();

    tokio::task::block_in_place(move || {
        let app = app.blocking_read();
        app.search_semantic(&payload.org_id, &payload.query)
            .map(Into::into)
            .map_err(Into::into)
    })
}

#[derive(Debug, Deserialize, Serialize)]
pub struct FileIdRequest {
    pub id: u64,
}

async fn delete(
    State(state): State<Arc<SharedState>>,
    Json(payload): Json<FileIdRequest>,
) -> Result<axum::Json<FileRecord>, HttpError> {
    log::debug!("payload: {payload:?}");

    let app = state.app.clone();

    tokio::task::block_in_place(move || {
        let app = app.blocking_read();
        app.soft_delete(payload.id).map(Into::into).map_err(Into::into)
    })
}

async fn restore(
    State(state): State<Arc<SharedState>>,
    Json(payload): Json<FileIdRequest>,
) -> Result<axum::Json<FileRecord>, HttpError> {
    log::debug!("payload: {payload:?}");

    let app = state.app.clone();

    tokio::task::block_in_place(move || {
        let app = app.blocking_read();
        app.restore(payload.id).map(Into::into).map_err(Into::into)
    })
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct TotalResponse {
    pub total: usize,
}

async fn total(
    State(state): State<Arc<SharedState>>,
) -> Result<axum::Json<TotalResponse>, HttpError> {
    let app = state.app.clone();

    tokio::task::block_in_place(move || {
        let app = app.blocking_read();
        app.total()
            .map(|total| TotalResponse { total }.into())
            .map_err(Into::into)
    })
}

#[derive(Debug, Deserialize, Serialize)]
pub struct UsageRequest {
    pub org_id: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct UsageResponse {
    pub total_bytes: u64,
}

async fn usage(
    State(state): State<Arc<SharedState>>,
    Json(payload): Json<UsageRequest>,
) -> Result<axum::Json<UsageResponse>, HttpError> {
    let app = state.app.clone();

    tokio::task::block_in_place(move || {
        let app = app.blocking_read();
        app.storage_usage(&payload.org_id)
            .map(|total_bytes| UsageResponse { total_bytes }.into())
            .map_err(Into::into)
    })
}

#[derive(Debug, Deserialize, Serialize)]
pub struct SweepResponse {
    pub count: usize,
}

async fn backfill(
    State(state): State<Arc<SharedState>>,
) -> Result<axum::Json<SweepResponse>, HttpError> {
    let app = state.app.clone();

    tokio::task::block_in_place(move || {
        let app = app.blocking_read();
        app.backfill()
            .map(|count| SweepResponse { count }.into())
            .map_err(Into::into)
    })
}

async fn retry(
    State(state): State<Arc<SharedState>>,
    Json(payload): Json<FileIdRequest>,
) -> Result<axum::Json<()>, HttpError> {
    log::debug!("payload: {payload:?}");

    let app = state.app.clone();

    tokio::task::block_in_place(move || {
        let app = app.blocking_read();
        app.schedule_retry(payload.id);
        Ok(().into())
    })
}

async fn purge(
    State(state): State<Arc<SharedState>>,
) -> Result<axum::Json<SweepResponse>, HttpError> {
    let app = state.app.clone();

    tokio::task::block_in_place(move || {
        let app = app.blocking_read();
        app.purge_deleted()
            .map(|count| SweepResponse { count }.into())
            .map_err(Into::into)
    })
}

async fn get_config(
    State(state): State<Arc<SharedState>>,
) -> Result<axum::Json<Config>, HttpError> {
    let app = state.app.clone();

    tokio::task::block_in_place(move || {
        let app = app.blocking_read();
        Ok(app.config().read().unwrap().clone().into())
    })
}

#[cfg(test)]
pub(crate) fn test_router(app: App) -> Router {
    let shared_state = Arc::new(SharedState {
        app: Arc::new(RwLock::new(app)),
    });
    router(shared_state)
}
