//! Task suggestions from the language model.

use axum::{Router, extract::State, response::Json as ResponseJson, routing::post};
use deployment::Deployment;
use services::services::task_generator::{
    GenerateAdvancedRequest, GenerateTasksRequest, GeneratedTasks,
};
use utils::response::ApiResponse;

use crate::{DeploymentImpl, error::ApiError, middleware::ProfileId};

pub async fn generate_tasks(
    State(deployment): State<DeploymentImpl>,
    ProfileId(profile_id): ProfileId,
    axum::Json(payload): axum::Json<GenerateTasksRequest>,
) -> Result<ResponseJson<ApiResponse<GeneratedTasks>>, ApiError> {
    let generated = deployment.task_generator().generate(profile_id, payload).await?;
    Ok(ResponseJson(ApiResponse::success(generated)))
}

pub async fn generate_tasks_advanced(
    State(deployment): State<DeploymentImpl>,
    ProfileId(profile_id): ProfileId,
    axum::Json(payload): axum::Json<GenerateAdvancedRequest>,
) -> Result<ResponseJson<ApiResponse<GeneratedTasks>>, ApiError> {
    let generated = deployment
        .task_generator()
        .generate_advanced(profile_id, payload)
        .await?;
    Ok(ResponseJson(ApiResponse::success(generated)))
}

pub fn router(_deployment: &DeploymentImpl) -> Router<DeploymentImpl> {
    Router::new().nest(
        "/ai",
        Router::new()
            .route("/generate", post(generate_tasks))
            .route("/generate-advanced", post(generate_tasks_advanced)),
    )
}
