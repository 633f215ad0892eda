use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use paydisk_core::{
    BuyPointsParam, GetSecretHashRes, LedgerError, SetPasswordHashParam, ShareDirParam,
    ViewHistoryParam, ViewHistoryRes,
};
use paydisk_ledger::LedgerEngine;

/// Wrapper mapping ledger errors onto HTTP statuses.
struct ApiError(LedgerError);

impl From<LedgerError> for ApiError {
    fn from(e: LedgerError) -> Self {
        Self(e)
    }
}

fn status_for(e: &LedgerError) -> StatusCode {
    match e {
        LedgerError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
        LedgerError::InconsistentDatabase(_) | LedgerError::Storage(_) | LedgerError::Io(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
        _ => StatusCode::BAD_REQUEST,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (status_for(&self.0), self.0.to_string()).into_response()
    }
}

/// Build the control-API router with permissive CORS headers.
pub fn router(engine: Arc<LedgerEngine>) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    Router::new()
        .route("/getsecrethash", get(get_secret_hash))
        .route("/buypoints", post(buy_points))
        .route("/viewhistory", post(view_history))
        .route("/setpassword", post(set_password))
        .route("/sharedir", post(share_dir))
        .layer(cors)
        .with_state(engine)
}

/// Bind and serve the control API on `addr`.
pub async fn serve(addr: SocketAddr, engine: Arc<LedgerEngine>) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "control API listening");
    axum::serve(listener, router(engine)).await
}

// ── Handlers ─────────────────────────────────────────────────────────────────

async fn get_secret_hash(
    State(engine): State<Arc<LedgerEngine>>,
) -> Json<GetSecretHashRes> {
    Json(engine.get_secret_hash())
}

async fn buy_points(
    State(engine): State<Arc<LedgerEngine>>,
    Json(param): Json<BuyPointsParam>,
) -> Result<&'static str, ApiError> {
    engine.buy_points(&param).await?;
    Ok("success")
}

async fn view_history(
    State(engine): State<Arc<LedgerEngine>>,
    Json(param): Json<ViewHistoryParam>,
) -> Result<Json<ViewHistoryRes>, ApiError> {
    Ok(Json(engine.view_history(&param)?))
}

async fn set_password(
    State(engine): State<Arc<LedgerEngine>>,
    Json(param): Json<SetPasswordHashParam>,
) -> Result<&'static str, ApiError> {
    engine.set_password(&param)?;
    Ok("success")
}

async fn share_dir(
    State(engine): State<Arc<LedgerEngine>>,
    Json(param): Json<ShareDirParam>,
) -> Result<&'static str, ApiError> {
    engine.share_dir(&param)?;
    Ok("success")
}
