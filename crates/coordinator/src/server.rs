//! HTTP surface of the coordinator.
//!
//! - `GET /init`        : `{"config": assignment}` or `{}`
//! - `GET /ready/{id}`  : JSON boolean, `true` once the fleet is ready
//! - `GET /work/{job}`  : JSON boolean, `true` when a work unit was claimed
//! - `GET /done/{id}`   : JSON boolean, `true` once the fleet is done
//! - `GET /healthcheck` : `OK`
//! - `GET /status`      : phase and counters

use crate::session::{CoordinatorSession, SessionError, SessionStatus};
use axum::extract::{ConnectInfo, FromRequestParts, Path, State};
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use fleetload_types::{ErrorBody, InitResponse, WORKER_ID_HEADER};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Who is calling: the worker id header, else the peer address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerId(pub String);

impl<S: Send + Sync> FromRequestParts<S> for CallerId {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(WORKER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty());
        if let Some(id) = header {
            return Ok(CallerId(id.to_string()));
        }
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string());
        Ok(CallerId(peer.unwrap_or_else(|| "anonymous".to_string())))
    }
}

/// Error response carrying an [`ErrorBody`].
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(message) => (StatusCode::NOT_FOUND, message),
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::Internal(message) => (StatusCode::INTERNAL_SERVER_ERROR, message),
        };
        (status, Json(ErrorBody::new(message))).into_response()
    }
}

impl From<SessionError> for ApiError {
    fn from(error: SessionError) -> Self {
        match error {
            SessionError::UnknownJob(_) => ApiError::NotFound(error.to_string()),
            SessionError::DuplicateJob(_) => ApiError::Internal(error.to_string()),
        }
    }
}

/// Routes of the coordinator service.
pub fn router(session: Arc<CoordinatorSession>) -> Router {
    Router::new()
        .route("/init", get(init))
        .route("/ready/{id}", get(ready))
        .route("/work/{job}", get(work))
        .route("/done/{id}", get(done))
        .route("/status", get(status))
        .route("/healthcheck", get(healthcheck))
        .with_state(session)
}

/// Serve `router` on `listener` until `cancel` fires.
///
/// Peer addresses are exposed to handlers so that callers without a
/// worker id header are told apart by IP.
pub async fn serve(
    listener: TcpListener,
    router: Router,
    cancel: CancellationToken,
) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "listening");
    }
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move { cancel.cancelled().await })
    .await
}

async fn init(
    State(session): State<Arc<CoordinatorSession>>,
    CallerId(caller): CallerId,
) -> Json<InitResponse> {
    Json(InitResponse {
        config: session.assign(&caller),
    })
}

async fn ready(State(session): State<Arc<CoordinatorSession>>, Path(id): Path<String>) -> Json<bool> {
    Json(session.ready(&id))
}

async fn work(
    State(session): State<Arc<CoordinatorSession>>,
    Path(job): Path<String>,
) -> Result<Json<bool>, ApiError> {
    Ok(Json(session.work(&job)?))
}

async fn done(State(session): State<Arc<CoordinatorSession>>, Path(id): Path<String>) -> Json<bool> {
    Json(session.done(&id))
}

async fn status(State(session): State<Arc<CoordinatorSession>>) -> Json<SessionStatus> {
    Json(session.status())
}

pub(crate) async fn healthcheck() -> &'static str {
    "OK"
}
