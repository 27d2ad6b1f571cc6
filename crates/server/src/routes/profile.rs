use axum::{Router, extract::State, response::Json as ResponseJson, routing::get};
use db::models::profile::UpdateProfile;
use deployment::Deployment;
use services::services::profile::{ProfileUpdate, ProfileView};
use utils::response::ApiResponse;

use crate::{DeploymentImpl, error::ApiError, middleware::ProfileId};

pub async fn get_profile(
    State(deployment): State<DeploymentImpl>,
    ProfileId(profile_id): ProfileId,
) -> Result<ResponseJson<ApiResponse<ProfileView>>, ApiError> {
    let profile = deployment.profiles().get(profile_id).await?;
    Ok(ResponseJson(ApiResponse::success(profile)))
}

pub async fn update_profile(
    State(deployment): State<DeploymentImpl>,
    ProfileId(profile_id): ProfileId,
    axum::Json(payload): axum::Json<UpdateProfile>,
) -> Result<ResponseJson<ApiResponse<ProfileUpdate>>, ApiError> {
    let updated = deployment.profiles().update(profile_id, payload).await?;
    Ok(ResponseJson(ApiResponse::success(updated)))
}

pub fn router(_deployment: &DeploymentImpl) -> Router<DeploymentImpl> {
    Router::new().route("/profile", get(get_profile).patch(update_profile))
}
