//! HTTP surface over the analysis pipeline.

use crate::error::{StoreError, ValidationError};
use crate::models::{AnalyzeRequest, AnalyzeResponse, ProviderId, Query};
use crate::pipeline::{
    aggregate_domains, score_competitors, summarize, Dispatcher, ProgressFn,
    ProgressPhase,
};
use crate::store::AnalysisStore;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, instrument};
use uuid::Uuid;

const DEFAULT_MAX_COMPETITORS: usize = 10;

#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub store: Arc<dyn AnalysisStore>,
    /// Cancelled on shutdown; every request dispatches under a child token.
    pub shutdown: CancellationToken,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("analysis not found")]
    NotFound,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/analyze", post(analyze))
        .route("/analyses/:id", get(get_analysis))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> &'static str {
    "OK"
}

#[instrument(skip_all)]
async fn analyze(
    State(state): State<AppState>,
    Json(req): Json<AnalyzeRequest>,
) -> Result<Json<AnalyzeResponse>, ApiError> {
    let start_time = Instant::now();
    let query = Query::new(req.query)?
        .with_target_domain(req.target_domain)
        .with_target_brand(req.target_brand);

    let cancel = state.shutdown.child_token();
    let on_progress: ProgressFn = Arc::new(|provider: ProviderId, phase: ProgressPhase| {
        debug!(provider = %provider, ?phase, "Provider progress");
    });
    let results = state
        .dispatcher
        .dispatch(&query, &cancel, Some(on_progress))
        .await;

    let summary = summarize(&results, query.target_domain(), query.target_brand());
    let competitors = score_competitors(
        &results,
        query.target_domain(),
        req.max_competitors.unwrap_or(DEFAULT_MAX_COMPETITORS),
    );
    let domains = aggregate_domains(&results);

    let id = Uuid::new_v4();
    let response = AnalyzeResponse {
        id: id.to_string(),
        query,
        analyzed_at: chrono::Utc::now(),
        results,
        summary,
        competitors,
        domains,
        total_time_ms: start_time.elapsed().as_millis() as u64,
    };

    let document = serde_json::to_value(&response).map_err(StoreError::from)?;
    state.store.save(id, document).await?;

    info!(
        analysis_id = %id,
        citations = response.summary.total_citations,
        elapsed_ms = response.total_time_ms,
        "Analysis stored"
    );
    Ok(Json(response))
}

async fn get_analysis(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let id = Uuid::parse_str(&id).map_err(|_| ApiError::NotFound)?;
    state
        .store
        .get(id)
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound)
}
