use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use deployment::DeploymentError;
use services::services::{
    completion::CompletionError, profile::ProfileServiceError, task_generator::TaskGeneratorError,
};
use thiserror::Error;
use utils::response::ApiResponse;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Completion(#[from] CompletionError),
    #[error(transparent)]
    Profile(#[from] ProfileServiceError),
    #[error(transparent)]
    TaskGenerator(#[from] TaskGeneratorError),
    #[error(transparent)]
    Deployment(#[from] DeploymentError),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Completion(err) => match err {
                CompletionError::TaskNotFound | CompletionError::GoalNotFound => {
                    StatusCode::NOT_FOUND
                }
                CompletionError::TaskAlreadyCompleted
                | CompletionError::TaskInactive
                | CompletionError::GoalAlreadyCompleted => StatusCode::CONFLICT,
                CompletionError::InvalidProgress(_) => StatusCode::BAD_REQUEST,
                CompletionError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Profile(err) => match err {
                ProfileServiceError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
                _ => StatusCode::BAD_REQUEST,
            },
            ApiError::TaskGenerator(err) => match err {
                TaskGeneratorError::CooldownActive { .. } => StatusCode::TOO_MANY_REQUESTS,
                TaskGeneratorError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Deployment(_) | ApiError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status_code = self.status_code();
        let message = if status_code.is_server_error() {
            tracing::error!(error = %self, "Request failed");
            "Internal server error".to_string()
        } else {
            self.to_string()
        };

        let mut response =
            (status_code, Json(ApiResponse::<()>::error(&message))).into_response();
        if let ApiError::TaskGenerator(TaskGeneratorError::CooldownActive { retry_after_secs }) =
            &self
            && let Ok(value) = HeaderValue::from_str(&retry_after_secs.to_string())
        {
            response.headers_mut().insert(header::RETRY_AFTER, value);
        }
        response
    }
}
