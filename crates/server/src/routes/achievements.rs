use axum::{
    Router,
    extract::State,
    response::Json as ResponseJson,
    routing::{get, post},
};
use db::models::achievement::{Achievement, AchievementStats, AchievementWithStatus};
use deployment::Deployment;
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use utils::response::ApiResponse;

use crate::{DeploymentImpl, error::ApiError, middleware::ProfileId};

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct CatalogInitialized {
    pub added: u64,
    pub total: usize,
}

pub async fn get_achievements(
    State(deployment): State<DeploymentImpl>,
    ProfileId(profile_id): ProfileId,
) -> Result<ResponseJson<ApiResponse<Vec<AchievementWithStatus>>>, ApiError> {
    let achievements = Achievement::find_with_status(&deployment.db().pool, profile_id).await?;
    Ok(ResponseJson(ApiResponse::success(achievements)))
}

/// Seed the built-in catalog. Safe to call repeatedly.
pub async fn initialize_achievements(
    State(deployment): State<DeploymentImpl>,
) -> Result<ResponseJson<ApiResponse<CatalogInitialized>>, ApiError> {
    let added = deployment.seed_achievements().await?;
    let total = Achievement::find_all(&deployment.db().pool).await?.len();
    Ok(ResponseJson(ApiResponse::success(CatalogInitialized {
        added,
        total,
    })))
}

pub async fn get_unlocked_achievements(
    State(deployment): State<DeploymentImpl>,
    ProfileId(profile_id): ProfileId,
) -> Result<ResponseJson<ApiResponse<Vec<AchievementWithStatus>>>, ApiError> {
    let unlocked = Achievement::find_unlocked(&deployment.db().pool, profile_id).await?;
    Ok(ResponseJson(ApiResponse::success(unlocked)))
}

pub async fn get_achievement_stats(
    State(deployment): State<DeploymentImpl>,
    ProfileId(profile_id): ProfileId,
) -> Result<ResponseJson<ApiResponse<AchievementStats>>, ApiError> {
    let statuses = Achievement::find_with_status(&deployment.db().pool, profile_id).await?;
    Ok(ResponseJson(ApiResponse::success(
        AchievementStats::from_statuses(&statuses),
    )))
}

pub fn router(_deployment: &DeploymentImpl) -> Router<DeploymentImpl> {
    let inner = Router::new()
        .route("/", get(get_achievements))
        .route("/initialize", post(initialize_achievements))
        .route("/unlocked", get(get_unlocked_achievements))
        .route("/stats", get(get_achievement_stats));

    Router::new().nest("/achievements", inner)
}
