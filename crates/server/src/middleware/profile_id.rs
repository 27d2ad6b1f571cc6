use axum::{extract::FromRequestParts, http::request::Parts};
use deployment::Deployment;
use uuid::Uuid;

use crate::{DeploymentImpl, error::ApiError};

pub const PROFILE_ID_HEADER: &str = "x-profile-id";

/// Profile a request acts on: the `X-Profile-Id` header, or the configured
/// default profile when the header is absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProfileId(pub Uuid);

impl FromRequestParts<DeploymentImpl> for ProfileId {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        deployment: &DeploymentImpl,
    ) -> Result<Self, Self::Rejection> {
        let Some(raw) = parts.headers.get(PROFILE_ID_HEADER) else {
            return Ok(ProfileId(deployment.config().default_profile_id));
        };
        raw.to_str()
            .ok()
            .and_then(|value| Uuid::parse_str(value.trim()).ok())
            .map(ProfileId)
            .ok_or_else(|| ApiError::BadRequest(format!("invalid {PROFILE_ID_HEADER} header")))
    }
}
