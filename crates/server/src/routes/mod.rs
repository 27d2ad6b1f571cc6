use axum::{
    Router,
    http::{HeaderValue, Method},
    routing::get,
};
use deployment::Deployment;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::warn;

use crate::DeploymentImpl;

pub mod achievements;
pub mod ai;
pub mod goals;
pub mod health;
pub mod profile;
pub mod tasks;

fn cors_layer(deployment: &DeploymentImpl) -> CorsLayer {
    let origins: Vec<HeaderValue> = deployment
        .config()
        .cors_allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
        .allow_headers(Any)
}

pub fn router(deployment: DeploymentImpl) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .merge(profile::router(&deployment))
        .merge(tasks::router(&deployment))
        .merge(goals::router(&deployment))
        .merge(achievements::router(&deployment))
        .merge(ai::router(&deployment))
        .layer(cors_layer(&deployment))
        .layer(TraceLayer::new_for_http())
        .with_state(deployment)
}
