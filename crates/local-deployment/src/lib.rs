use std::sync::Arc;

use async_trait::async_trait;
use db::DBService;
use deployment::{Deployment, DeploymentError};
use services::services::{
    completion::CompletionService,
    config::Config,
    ollama::{OllamaClient, TextGenerator},
    profile::ProfileService,
    profile_locks::ProfileLocks,
    task_generator::TaskGenerator,
};
use tracing::info;

#[derive(Clone)]
pub struct LocalDeployment {
    config: Arc<Config>,
    db: DBService,
    completion: CompletionService,
    profiles: ProfileService,
    task_generator: TaskGenerator,
}

impl LocalDeployment {
    /// Wire the services around an existing database and text generator, then
    /// seed the achievement catalog.
    pub async fn with_parts(
        config: Config,
        db: DBService,
        generator: Arc<dyn TextGenerator>,
    ) -> Result<Self, DeploymentError> {
        // One lock table shared by every service that mutates a profile
        let locks = ProfileLocks::new();
        let completion = CompletionService::new(
            db.pool.clone(),
            locks.clone(),
            config.goal_completion_threshold,
        );
        let profiles = ProfileService::new(db.pool.clone(), locks);
        let task_generator = TaskGenerator::new(db.pool.clone(), generator, config.ai.clone());

        let deployment = Self {
            config: Arc::new(config),
            db,
            completion,
            profiles,
            task_generator,
        };
        deployment.seed_achievements().await?;
        Ok(deployment)
    }
}

#[async_trait]
impl Deployment for LocalDeployment {
    async fn new(config: Config) -> Result<Self, DeploymentError> {
        let db = DBService::new(&config.database_url).await?;
        let generator = Arc::new(OllamaClient::new(&config.ai.base_url, config.ai.timeout)?);
        info!(
            ollama_url = %config.ai.base_url,
            model = %config.ai.default_model,
            "Using Ollama for task generation"
        );
        Self::with_parts(config, db, generator).await
    }

    fn config(&self) -> &Config {
        &self.config
    }

    fn db(&self) -> &DBService {
        &self.db
    }

    fn completion(&self) -> &CompletionService {
        &self.completion
    }

    fn profiles(&self) -> &ProfileService {
        &self.profiles
    }

    fn task_generator(&self) -> &TaskGenerator {
        &self.task_generator
    }
}

#[cfg(test)]
mod tests {
    use db::models::achievement::Achievement;

    use super::*;

    #[tokio::test]
    async fn startup_seeds_catalog_once() {
        let db = DBService::new_in_memory().await.unwrap();
        let generator = Arc::new(OllamaClient::new(&Config::default().ai.base_url, Config::default().ai.timeout).unwrap());
        let deployment = LocalDeployment::with_parts(Config::default(), db, generator)
            .await
            .unwrap();

        let catalog = Achievement::find_all(&deployment.db().pool).await.unwrap();
        assert!(!catalog.is_empty());
        assert_eq!(deployment.seed_achievements().await.unwrap(), 0);
    }
}
