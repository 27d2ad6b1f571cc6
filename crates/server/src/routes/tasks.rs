use axum::{
    Router,
    extract::{Path, State},
    response::Json as ResponseJson,
    routing::{get, patch, post},
};
use db::models::{
    category::{CategoryInfo, TASK_CATEGORIES},
    goal::Goal,
    profile::Profile,
    task::{CreateTask, Task, TaskSource, UpdateTask},
};
use deployment::Deployment;
use services::services::{completion::TaskCompletion, progression::MAX_TASK_XP};
use sqlx::SqlitePool;
use tracing::info;
use utils::response::ApiResponse;
use uuid::Uuid;

use crate::{DeploymentImpl, error::ApiError, middleware::ProfileId};

fn validate_fields(title: Option<&str>, xp: Option<i64>) -> Result<(), ApiError> {
    if title.is_some_and(|t| t.trim().is_empty()) {
        return Err(ApiError::BadRequest("title must not be empty".to_string()));
    }
    if xp.is_some_and(|xp| xp < 0) {
        return Err(ApiError::BadRequest("xp must not be negative".to_string()));
    }
    if xp.is_some_and(|xp| xp > MAX_TASK_XP) {
        return Err(ApiError::BadRequest(format!("xp must be at most {MAX_TASK_XP}")));
    }
    Ok(())
}

/// A task may only link to a goal of the same profile
async fn ensure_goal_exists(
    pool: &SqlitePool,
    profile_id: Uuid,
    goal_id: Option<Uuid>,
) -> Result<(), ApiError> {
    if let Some(goal_id) = goal_id
        && Goal::find_by_id(pool, profile_id, goal_id).await?.is_none()
    {
        return Err(ApiError::BadRequest(format!("goal {goal_id} does not exist")));
    }
    Ok(())
}

pub async fn get_tasks(
    State(deployment): State<DeploymentImpl>,
    ProfileId(profile_id): ProfileId,
) -> Result<ResponseJson<ApiResponse<Vec<Task>>>, ApiError> {
    let tasks = Task::find_by_profile_id(&deployment.db().pool, profile_id).await?;
    Ok(ResponseJson(ApiResponse::success(tasks)))
}

pub async fn create_task(
    State(deployment): State<DeploymentImpl>,
    ProfileId(profile_id): ProfileId,
    axum::Json(payload): axum::Json<CreateTask>,
) -> Result<ResponseJson<ApiResponse<Task>>, ApiError> {
    validate_fields(Some(&payload.title), payload.xp)?;
    let pool = &deployment.db().pool;
    ensure_goal_exists(pool, profile_id, payload.goal_id).await?;

    let mut conn = pool.acquire().await?;
    Profile::find_or_create(&mut conn, profile_id).await?;
    let data = CreateTask {
        title: payload.title.trim().to_string(),
        source: Some(TaskSource::Manual),
        ..payload
    };
    let task = Task::create(&mut *conn, profile_id, &data, Uuid::new_v4()).await?;

    info!(profile_id = %profile_id, task_id = %task.id, "Task created");
    Ok(ResponseJson(ApiResponse::success(task)))
}

pub async fn update_task(
    State(deployment): State<DeploymentImpl>,
    ProfileId(profile_id): ProfileId,
    Path(task_id): Path<Uuid>,
    axum::Json(payload): axum::Json<UpdateTask>,
) -> Result<ResponseJson<ApiResponse<Task>>, ApiError> {
    validate_fields(payload.title.as_deref(), payload.xp)?;
    let pool = &deployment.db().pool;
    if let Some(goal_id) = payload.goal_id {
        ensure_goal_exists(pool, profile_id, goal_id).await?;
    }

    let existing = Task::find_by_id(pool, profile_id, task_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("task not found".to_string()))?;
    let task = Task::update(pool, &existing.merged(payload)).await?;
    Ok(ResponseJson(ApiResponse::success(task)))
}

pub async fn delete_task(
    State(deployment): State<DeploymentImpl>,
    ProfileId(profile_id): ProfileId,
    Path(task_id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<()>>, ApiError> {
    let rows_affected = Task::delete(&deployment.db().pool, profile_id, task_id).await?;
    if rows_affected == 0 {
        return Err(ApiError::NotFound("task not found".to_string()));
    }
    info!(profile_id = %profile_id, task_id = %task_id, "Task deleted");
    Ok(ResponseJson(ApiResponse::success(())))
}

pub async fn complete_task(
    State(deployment): State<DeploymentImpl>,
    ProfileId(profile_id): ProfileId,
    Path(task_id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<TaskCompletion>>, ApiError> {
    let completion = deployment.completion().complete_task(profile_id, task_id).await?;
    Ok(ResponseJson(ApiResponse::success(completion)))
}

pub async fn toggle_task_active(
    State(deployment): State<DeploymentImpl>,
    ProfileId(profile_id): ProfileId,
    Path(task_id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<Task>>, ApiError> {
    let task = Task::toggle_active(&deployment.db().pool, profile_id, task_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("task not found".to_string()))?;
    Ok(ResponseJson(ApiResponse::success(task)))
}

pub async fn get_task_categories() -> ResponseJson<ApiResponse<Vec<CategoryInfo>>> {
    ResponseJson(ApiResponse::success(TASK_CATEGORIES.to_vec()))
}

pub fn router(_deployment: &DeploymentImpl) -> Router<DeploymentImpl> {
    let task_id_router = Router::new()
        .route("/", patch(update_task).delete(delete_task))
        .route("/complete", post(complete_task))
        .route("/toggle-active", post(toggle_task_active));

    let inner = Router::new()
        .route("/", get(get_tasks).post(create_task))
        .route("/categories", get(get_task_categories))
        .nest("/{task_id}", task_id_router);

    Router::new().nest("/tasks", inner)
}
