//! HTTP request handlers

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::error;

use crate::errors::DeployError;
use crate::models::Deployment;
use crate::server::state::ServerState;
use crate::utils::version_info;
use crate::workers::queue::CancelResult;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

/// Health check handler
pub async fn health_handler() -> impl IntoResponse {
    let version = version_info();
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "madahost".to_string(),
        version: version.version,
    })
}

/// Version response
#[derive(Debug, Serialize)]
pub struct VersionResponse {
    pub version: String,
    pub git_hash: String,
    pub build_time: String,
}

/// Version handler
pub async fn version_handler() -> impl IntoResponse {
    let version = version_info();
    Json(VersionResponse {
        version: version.version,
        git_hash: version.git_hash,
        build_time: version.build_time,
    })
}

/// Error body
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deployment_id: Option<String>,
}

/// A pipeline error rendered as an HTTP response
pub struct ApiError(DeployError);

impl From<DeployError> for ApiError {
    fn from(e: DeployError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, deployment_id) = match &self.0 {
            DeployError::NotFound(_) => (StatusCode::NOT_FOUND, None),
            DeployError::AlreadyDeploying { deployment_id, .. } => {
                (StatusCode::CONFLICT, deployment_id.clone())
            }
            DeployError::ValidationError(_) => (StatusCode::BAD_REQUEST, None),
            DeployError::ShutdownError(_) => (StatusCode::SERVICE_UNAVAILABLE, None),
            e => {
                error!("Request failed: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, None)
            }
        };
        let body = ErrorBody {
            error: self.0.to_string(),
            deployment_id,
        };
        (status, Json(body)).into_response()
    }
}

/// Accepted deployment
#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub deployment_id: String,
    pub project_id: String,
}

/// Queue a deployment of a project
pub async fn submit_handler(
    State(state): State<Arc<ServerState>>,
    Path(project_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let handle = state.queue.submit(&project_id).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitResponse {
            deployment_id: handle.deployment_id.clone(),
            project_id: handle.project_id.clone(),
        }),
    ))
}

/// Deployment row with its logs
pub async fn deployment_handler(
    State(state): State<Arc<ServerState>>,
    Path(deployment_id): Path<String>,
) -> Result<Json<Deployment>, ApiError> {
    let deployment = state
        .store
        .get_deployment(&deployment_id)
        .await?
        .ok_or_else(|| DeployError::NotFound(format!("deployment {}", deployment_id)))?;
    Ok(Json(deployment))
}

/// Cancel response
#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub deployment_id: String,
    #[serde(flatten)]
    pub result: CancelResult,
}

/// Request cancellation of a deployment
pub async fn cancel_handler(
    State(state): State<Arc<ServerState>>,
    Path(deployment_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let result = state.queue.cancel(&deployment_id).await?;
    let status = match result {
        CancelResult::Signalled | CancelResult::Recorded => StatusCode::ACCEPTED,
        CancelResult::AlreadyFinished(_) => StatusCode::CONFLICT,
    };
    Ok((
        status,
        Json(CancelResponse {
            deployment_id,
            result,
        }),
    ))
}
