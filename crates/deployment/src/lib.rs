use async_trait::async_trait;
use db::{DBService, DBServiceError, models::achievement::Achievement};
use services::services::{
    achievements::default_catalog,
    completion::CompletionService,
    config::{Config, ConfigError},
    ollama::OllamaError,
    profile::ProfileService,
    task_generator::TaskGenerator,
};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum DeploymentError {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    DbService(#[from] DBServiceError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("ai client: {0}")]
    Ollama(#[from] OllamaError),
}

/// Everything a route handler may reach for. Routes are written against this
/// trait so tests can swap in a deployment with stubbed collaborators.
#[async_trait]
pub trait Deployment: Clone + Send + Sync + 'static {
    async fn new(config: Config) -> Result<Self, DeploymentError>;

    fn config(&self) -> &Config;

    fn db(&self) -> &DBService;

    fn completion(&self) -> &CompletionService;

    fn profiles(&self) -> &ProfileService;

    fn task_generator(&self) -> &TaskGenerator;

    /// Insert any built-in achievements missing from the catalog table.
    async fn seed_achievements(&self) -> Result<u64, DeploymentError> {
        let inserted = Achievement::seed(&self.db().pool, &default_catalog()).await?;
        if inserted > 0 {
            info!(inserted, "Seeded achievement catalog");
        }
        Ok(inserted)
    }
}
