use std::sync::Arc;

use async_trait::async_trait;
use config::{Config, load_config_from_file, save_config_to_file};
use db::DBService;
use deployment::{Deployment, DeploymentError};
use tokio::sync::RwLock;
use utils_core::assets::config_path;

#[derive(Clone)]
pub struct LocalDeployment {
    config: Arc<RwLock<Config>>,
    db: DBService,
}

#[async_trait]
impl Deployment for LocalDeployment {
    async fn new() -> Result<Self, DeploymentError> {
        let config = Self::load_runtime_config()?;
        let db = DBService::new(config.database_url.as_deref()).await?;

        Ok(Self {
            config: Arc::new(RwLock::new(config)),
            db,
        })
    }

    fn config(&self) -> &Arc<RwLock<Config>> {
        &self.config
    }

    fn db(&self) -> &DBService {
        &self.db
    }
}

impl LocalDeployment {
    /// Reads `config.json`, writing the defaults on first run, then applies
    /// environment overrides. Overrides are never persisted.
    fn load_runtime_config() -> Result<Config, DeploymentError> {
        let path = config_path();
        let file_config = load_config_from_file(&path);
        if !path.exists() {
            save_config_to_file(&file_config, &path)?;
            tracing::info!("Wrote default config to {}", path.display());
        }

        let config = file_config.with_env_overrides();
        config.validate()?;
        Ok(config)
    }

    #[cfg(test)]
    fn with_db(config: Config, db: DBService) -> Self {
        Self {
            config: Arc::new(RwLock::new(config)),
            db,
        }
    }
}

#[cfg(test)]
mod tests {
    use db::models::board::{Board, CreateBoard};

    use super::*;

    #[tokio::test]
    async fn with_db_shares_the_store() {
        let db = DBService::connect("sqlite::memory:").await.unwrap();
        let deployment = LocalDeployment::with_db(Config::default(), db);
        let clone = deployment.clone();

        Board::create(
            &deployment.db().pool,
            &CreateBoard {
                name: "Shared".to_string(),
                description: None,
            },
        )
        .await
        .unwrap();

        assert_eq!(Board::find_all(&clone.db().pool).await.unwrap().len(), 1);
        assert_eq!(clone.config().read().await.host, "127.0.0.1");
    }
}
