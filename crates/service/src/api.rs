//! REST API Endpoints
//!
//! Health, status, published roots and claim proof lookup.

use crate::state::{AppState, EpochRecord, LookupError, StatusCounts};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use merkle_gen::{Address, ClaimProof, ProofError};
use serde::Serialize;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Run the API server
pub async fn run_server(listen: String, state: AppState) -> anyhow::Result<()> {
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&listen).await?;
    tracing::info!(address = %listen, "API server listening");

    axum::serve(listener, app).await?;

    Ok(())
}

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/status", get(status))
        .route("/epochs", get(list_epochs))
        .route("/roots/{channel}/{epoch}", get(get_root))
        .route("/proof/{channel}/{epoch}/{claimer}", get(get_proof))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// Error mapped to an HTTP status with a JSON body
#[derive(Debug)]
struct ApiError(StatusCode, String);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0, Json(ErrorResponse { error: self.1 })).into_response()
    }
}

impl From<LookupError> for ApiError {
    fn from(err: LookupError) -> Self {
        let status = match &err {
            LookupError::UnknownEpoch(..) | LookupError::Proof(ProofError::ClaimerNotFound(_)) => {
                StatusCode::NOT_FOUND
            }
            LookupError::NotVerified(crate::state::EpochStatus::Failed) => StatusCode::CONFLICT,
            LookupError::NotVerified(_) => StatusCode::SERVICE_UNAVAILABLE,
            LookupError::Proof(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self(status, err.to_string())
    }
}

/// Health check response
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    failed_epochs: usize,
}

/// Health check endpoint
async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let healthy = state.is_healthy();
    let status_code = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = HealthResponse {
        status: if healthy { "healthy" } else { "degraded" },
        failed_epochs: state.status_counts().failed,
    };

    (status_code, Json(response))
}

/// Status response
#[derive(Serialize)]
struct StatusResponse {
    uptime_secs: u64,
    epochs: StatusCounts,
    last_error: Option<String>,
}

async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        uptime_secs: state.uptime_secs(),
        epochs: state.status_counts(),
        last_error: state.last_error(),
    })
}

async fn list_epochs(State(state): State<AppState>) -> Json<Vec<EpochRecord>> {
    Json(state.all_epochs())
}

/// Root and status of one epoch
async fn get_root(
    State(state): State<AppState>,
    Path((channel, epoch)): Path<(String, u64)>,
) -> Result<Json<EpochRecord>, ApiError> {
    state
        .get_epoch(&channel, epoch)
        .map(Json)
        .ok_or_else(|| LookupError::UnknownEpoch(channel, epoch).into())
}

/// Proof bundle for one claimer
async fn get_proof(
    State(state): State<AppState>,
    Path((channel, epoch, claimer)): Path<(String, u64, String)>,
) -> Result<Json<ClaimProof>, ApiError> {
    let claimer: Address = claimer
        .parse()
        .map_err(|e| ApiError(StatusCode::BAD_REQUEST, format!("Invalid claimer: {e}")))?;
    Ok(Json(state.proof(&channel, epoch, &claimer)?))
}
