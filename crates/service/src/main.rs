use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::{Path as AxumPath, State};
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::{routing::get, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::task;
use tracing::{error, info};

use manualqa_rag::{answer_question, EmbeddingClient, IndexStore, LlmClient, QueryError, RagConfig};

struct AppState {
    store: IndexStore,
    embeddings: EmbeddingClient,
    llm: LlmClient,
    manuals_dir: PathBuf,
    top_k: usize,
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    tracing_subscriber::fmt::init();
    let config = RagConfig::from_env()?;
    std::fs::create_dir_all(&config.index_dir)?;
    let store = IndexStore::open(config.index_db())?;
    let embeddings = config.embedding_client()?;
    let llm = config.llm_client()?;
    if let Some(model) = store.embedding_model()? {
        if model != embeddings.model_label() {
            info!(
                "index was built with embedding model {model}, configured model is {}",
                embeddings.model_label()
            );
        }
    }
    let state = Arc::new(AppState {
        store,
        embeddings,
        llm,
        manuals_dir: config.manuals_dir.clone(),
        top_k: config.top_k,
    });
    let app = Router::new()
        .route("/", get(serve_ui))
        .route("/static/index.html", get(serve_ui))
        .route("/api/sources", get(handle_sources))
        .route("/api/chat", post(handle_chat))
        .route("/manuals/:file", get(handle_manual))
        .with_state(state);
    let addr: SocketAddr = config.bind_addr.parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("listening" = %addr);
    axum::serve(listener, app).await?;
    Ok(())
}

#[derive(Debug, Deserialize)]
struct ChatRequest {
    question: String,
}

#[derive(Debug, Serialize)]
struct ChatResponse {
    answer: String,
    sources: Vec<SourceResponse>,
    adherence_score: f32,
}

#[derive(Debug, Serialize)]
struct SourceResponse {
    source: String,
    page: i64,
    content: String,
}

#[derive(Debug, Serialize)]
struct SourcesResponse {
    files: Vec<String>,
}

async fn handle_sources(State(state): State<Arc<AppState>>) -> Result<Json<SourcesResponse>, AppError> {
    let files = state.store.sources().map_err(AppError::internal)?;
    Ok(Json(SourcesResponse { files }))
}

async fn handle_chat(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    let state = state.clone();
    let response = task::spawn_blocking(move || {
        answer_question(
            &state.store,
            &state.embeddings,
            &state.llm,
            &body.question,
            state.top_k,
        )
    })
    .await
    .map_err(AppError::internal)??;
    let sources = response
        .sources
        .into_iter()
        .map(|citation| SourceResponse {
            source: citation.source_file,
            page: citation.page,
            content: citation.snippet,
        })
        .collect();
    Ok(Json(ChatResponse {
        answer: response.answer,
        sources,
        adherence_score: response.adherence_score,
    }))
}

async fn handle_manual(
    State(state): State<Arc<AppState>>,
    AxumPath(file): AxumPath<String>,
) -> Result<Response, AppError> {
    let name = sanitize_filename(&file)
        .ok_or_else(|| AppError::BadRequest("invalid manual filename".to_string()))?;
    let path = state.manuals_dir.join(name);
    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|_| AppError::NotFound(format!("no such manual: {file}")))?;
    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/pdf")],
        bytes,
    )
        .into_response())
}

// Reject anything that could escape the manuals directory.
fn sanitize_filename(raw: &str) -> Option<&str> {
    if raw.is_empty() || raw.contains("..") || raw.contains('/') || raw.contains('\\') {
        return None;
    }
    Some(raw)
}

async fn serve_ui() -> Html<&'static str> {
    Html(include_str!("../../../ui/index.html"))
}

#[derive(Debug, Error)]
enum AppError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error("answer generation failed: {0}")]
    Upstream(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    fn internal<E: Into<anyhow::Error>>(err: E) -> Self {
        Self::Internal(err.into())
    }
}

impl From<QueryError> for AppError {
    fn from(err: QueryError) -> Self {
        match err {
            QueryError::Validation => AppError::BadRequest(err.to_string()),
            QueryError::Generation(_) => AppError::Upstream(err.to_string()),
            other => AppError::Internal(other.into()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg).into_response(),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg).into_response(),
            AppError::Upstream(msg) => {
                error!("upstream_error" = %msg);
                (StatusCode::BAD_GATEWAY, msg).into_response()
            }
            AppError::Internal(err) => {
                error!("internal_error" = %err);
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error").into_response()
            }
        }
    }
}
