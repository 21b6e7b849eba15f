use db_infra::{run_migrations, DbConfig, RuntimeEnv};
use migration::MigrationCommand;
use tracing::info;

use crate::db::AsyncSessionProvider;
use crate::error::AppError;
use crate::health::{HealthReporter, ServiceInfo};
use crate::state::app_state::AppState;

/// Builder for creating AppState instances (used in both tests and main)
pub struct StateBuilder {
    db_config: Option<DbConfig>,
    env: RuntimeEnv,
    migrate: bool,
    entities: Option<Vec<String>>,
}

impl StateBuilder {
    pub fn new() -> Self {
        Self {
            db_config: None,
            env: RuntimeEnv::Development,
            migrate: false,
            entities: None,
        }
    }

    /// Connect to storage with `config`. Its environment becomes the
    /// service environment.
    pub fn with_db(mut self, config: DbConfig) -> Self {
        self.env = config.env;
        self.db_config = Some(config);
        self
    }

    pub fn with_env(mut self, env: RuntimeEnv) -> Self {
        self.env = env;
        self
    }

    /// Apply pending migrations before the state is handed out.
    pub fn migrate_on_start(mut self, migrate: bool) -> Self {
        self.migrate = migrate;
        self
    }

    pub fn with_entities(mut self, entities: Vec<String>) -> Self {
        self.entities = Some(entities);
        self
    }

    pub async fn build(self) -> Result<AppState, AppError> {
        let service = ServiceInfo::new(self.env);
        let Some(config) = self.db_config else {
            info!(env = %self.env, "state=built storage=false");
            return Ok(AppState::without_storage(service));
        };

        let sessions = AsyncSessionProvider::connect(config).await?;
        if self.migrate {
            run_migrations(sessions.pool(), MigrationCommand::Up).await?;
        }

        let mut health = HealthReporter::new(Some(sessions.clone()), service);
        if let Some(entities) = self.entities {
            health = health.with_entities(entities);
        }
        info!(env = %self.env, "state=built storage=true");
        Ok(AppState::with_reporter(Some(sessions), health))
    }
}

impl Default for StateBuilder {
    fn default() -> Self {
        Self::new()
    }
}

pub fn build_state() -> StateBuilder {
    StateBuilder::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn builds_without_storage() {
        let state = build_state().with_env(RuntimeEnv::Test).build().await.unwrap();
        assert!(state.sessions().is_none());
        assert_eq!(state.health.service().environment, RuntimeEnv::Test);
    }

    #[tokio::test]
    async fn builds_and_migrates_memory_database() {
        let config = DbConfig::new("sqlite::memory:").unwrap().with_env(RuntimeEnv::Test);
        let state = build_state()
            .with_db(config)
            .migrate_on_start(true)
            .build()
            .await
            .unwrap();
        let report = state.health.migrations().await;
        assert_eq!(report.migrations.unwrap().pending_count, Some(0));
        state.shutdown().await;
    }
}
