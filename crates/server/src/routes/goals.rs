use axum::{
    Router,
    extract::{Path, State},
    response::Json as ResponseJson,
    routing::{get, patch, post},
};
use db::models::{
    category::{CategoryInfo, GOAL_CATEGORIES},
    goal::{CreateGoal, Goal, GoalProgress, GoalResponse, UpdateGoal},
    profile::Profile,
};
use deployment::Deployment;
use services::services::{
    completion::{CompletionError, GoalCompletion, GoalUpdate},
    progression,
};
use tracing::info;
use utils::response::ApiResponse;
use uuid::Uuid;

use crate::{DeploymentImpl, error::ApiError, middleware::ProfileId};

fn validate_title(title: Option<&str>) -> Result<(), ApiError> {
    if title.is_some_and(|t| t.trim().is_empty()) {
        return Err(ApiError::BadRequest("title must not be empty".to_string()));
    }
    Ok(())
}

pub async fn get_goals(
    State(deployment): State<DeploymentImpl>,
    ProfileId(profile_id): ProfileId,
) -> Result<ResponseJson<ApiResponse<Vec<GoalResponse>>>, ApiError> {
    let goals = Goal::find_by_profile_id(&deployment.db().pool, profile_id).await?;
    Ok(ResponseJson(ApiResponse::success(
        goals.into_iter().map(GoalResponse::from).collect(),
    )))
}

pub async fn create_goal(
    State(deployment): State<DeploymentImpl>,
    ProfileId(profile_id): ProfileId,
    axum::Json(payload): axum::Json<CreateGoal>,
) -> Result<ResponseJson<ApiResponse<GoalResponse>>, ApiError> {
    validate_title(Some(&payload.title))?;
    let progress_percent = match payload.progress {
        Some(fraction) => progression::progress_percent(fraction)
            .ok_or(CompletionError::InvalidProgress(fraction))?,
        None => 0,
    };

    let pool = &deployment.db().pool;
    let mut conn = pool.acquire().await?;
    Profile::find_or_create(&mut conn, profile_id).await?;
    drop(conn);

    let data = CreateGoal {
        title: payload.title.trim().to_string(),
        ..payload
    };
    let goal = Goal::create(pool, profile_id, &data, progress_percent, Uuid::new_v4()).await?;

    info!(profile_id = %profile_id, goal_id = %goal.id, "Goal created");
    Ok(ResponseJson(ApiResponse::success(goal.into())))
}

pub async fn update_goal(
    State(deployment): State<DeploymentImpl>,
    ProfileId(profile_id): ProfileId,
    Path(goal_id): Path<Uuid>,
    axum::Json(payload): axum::Json<UpdateGoal>,
) -> Result<ResponseJson<ApiResponse<GoalUpdate>>, ApiError> {
    validate_title(payload.title.as_deref())?;
    let updated = deployment
        .completion()
        .update_goal(profile_id, goal_id, payload)
        .await?;
    Ok(ResponseJson(ApiResponse::success(updated)))
}

/// Progress-only update. Shares the auto-completion path with `PATCH`.
pub async fn update_goal_progress(
    State(deployment): State<DeploymentImpl>,
    ProfileId(profile_id): ProfileId,
    Path(goal_id): Path<Uuid>,
    axum::Json(payload): axum::Json<GoalProgress>,
) -> Result<ResponseJson<ApiResponse<GoalUpdate>>, ApiError> {
    let updated = deployment
        .completion()
        .update_goal(profile_id, goal_id, payload.into())
        .await?;
    Ok(ResponseJson(ApiResponse::success(updated)))
}

pub async fn delete_goal(
    State(deployment): State<DeploymentImpl>,
    ProfileId(profile_id): ProfileId,
    Path(goal_id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<()>>, ApiError> {
    let rows_affected = Goal::delete(&deployment.db().pool, profile_id, goal_id).await?;
    if rows_affected == 0 {
        return Err(ApiError::NotFound("goal not found".to_string()));
    }
    info!(profile_id = %profile_id, goal_id = %goal_id, "Goal deleted");
    Ok(ResponseJson(ApiResponse::success(())))
}

pub async fn complete_goal(
    State(deployment): State<DeploymentImpl>,
    ProfileId(profile_id): ProfileId,
    Path(goal_id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<GoalCompletion>>, ApiError> {
    let completion = deployment.completion().complete_goal(profile_id, goal_id).await?;
    Ok(ResponseJson(ApiResponse::success(completion)))
}

pub async fn get_goal_categories() -> ResponseJson<ApiResponse<Vec<CategoryInfo>>> {
    ResponseJson(ApiResponse::success(GOAL_CATEGORIES.to_vec()))
}

pub fn router(_deployment: &DeploymentImpl) -> Router<DeploymentImpl> {
    let goal_id_router = Router::new()
        .route("/", patch(update_goal).delete(delete_goal))
        .route("/progress", post(update_goal_progress))
        .route("/complete", post(complete_goal));

    let inner = Router::new()
        .route("/", get(get_goals).post(create_goal))
        .route("/categories", get(get_goal_categories))
        .nest("/{goal_id}", goal_id_router);

    Router::new().nest("/goals", inner)
}
