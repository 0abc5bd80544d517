//! Singleton lookup keyed by provider id.

use std::collections::BTreeMap;
use std::sync::Arc;

use catalogd_model::{ProviderConfig, TestStatus};
use tokio::sync::RwLock;
use tracing::info;

use super::ProviderAdapter;
use crate::db::repositories::providers::ProviderRepository;
use crate::error::CoreError;

/// Holds every self-registered adapter plus its persisted
/// `{enabled, apiKey, enabledAssetTypes}` configuration and last test
/// outcome. One instance per process.
pub struct ProviderRegistry {
    adapters: RwLock<BTreeMap<String, Arc<dyn ProviderAdapter>>>,
    repo: Arc<dyn ProviderRepository>,
}

impl ProviderRegistry {
    pub fn new(repo: Arc<dyn ProviderRepository>) -> Self {
        Self {
            adapters: RwLock::new(BTreeMap::new()),
            repo,
        }
    }

    /// Called once per adapter at startup.
    pub async fn register(&self, adapter: Arc<dyn ProviderAdapter>) {
        let id = adapter.capabilities().id;
        info!(provider = %id, "provider self-registered with registry");
        self.adapters.write().await.insert(id, adapter);
    }

    pub async fn get(&self, id: &str) -> Option<Arc<dyn ProviderAdapter>> {
        self.adapters.read().await.get(id).cloned()
    }

    pub async fn all(&self) -> Vec<Arc<dyn ProviderAdapter>> {
        self.adapters.read().await.values().cloned().collect()
    }

    /// Adapters whose persisted config marks them enabled (providers
    /// with no row yet default to enabled).
    pub async fn enabled(&self) -> Result<Vec<Arc<dyn ProviderAdapter>>, CoreError> {
        let mut out = Vec::new();
        for adapter in self.all().await {
            let id = adapter.capabilities().id;
            let enabled = self
                .repo
                .get(&id)
                .await?
                .map(|c| c.enabled)
                .unwrap_or(true);
            if enabled {
                out.push(adapter);
            }
        }
        Ok(out)
    }

    pub async fn upsert_config(&self, config: ProviderConfig) -> Result<(), CoreError> {
        self.repo.upsert(&config).await
    }

    pub async fn config(&self, id: &str) -> Result<Option<ProviderConfig>, CoreError> {
        self.repo.get(id).await
    }

    /// Runs `testConnection()` against the named adapter and persists
    /// the outcome.
    pub async fn test_connection(&self, id: &str) -> Result<TestStatus, CoreError> {
        let Some(adapter) = self.get(id).await else {
            return Err(CoreError::NotFound(format!("unknown provider {id}")));
        };
        let status = match adapter.test_connection().await {
            Ok(result) if result.ok => TestStatus::Success,
            Ok(result) => TestStatus::Error {
                message: result.message.unwrap_or_default(),
            },
            Err(e) => TestStatus::Error {
                message: e.to_string(),
            },
        };
        self.repo.record_test_result(id, status.clone()).await?;
        Ok(status)
    }
}
