use crate::db::AsyncSessionProvider;
use crate::health::{HealthReporter, ServiceInfo};

/// Shared state handed to every request handler.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Session provider; absent when the process runs without storage.
    sessions: Option<AsyncSessionProvider>,
    pub health: HealthReporter,
}

impl AppState {
    pub fn new(sessions: AsyncSessionProvider, service: ServiceInfo) -> Self {
        Self::with_reporter(
            Some(sessions.clone()),
            HealthReporter::new(Some(sessions), service),
        )
    }

    pub fn without_storage(service: ServiceInfo) -> Self {
        Self::with_reporter(None, HealthReporter::new(None, service))
    }

    /// Use a custom reporter, e.g. one tracking a different entity list.
    pub fn with_reporter(sessions: Option<AsyncSessionProvider>, health: HealthReporter) -> Self {
        Self { sessions, health }
    }

    pub fn sessions(&self) -> Option<&AsyncSessionProvider> {
        self.sessions.as_ref()
    }

    /// Close the pool, if any. Safe to call more than once.
    pub async fn shutdown(&self) {
        if let Some(sessions) = &self.sessions {
            sessions.close().await;
        }
    }
}
