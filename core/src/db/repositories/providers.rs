use async_trait::async_trait;
use catalogd_model::{ProviderConfig, TestStatus};
use chrono::Utc;
use sqlx::PgPool;

use crate::error::CoreError;

#[async_trait]
pub trait ProviderRepository: Send + Sync {
    async fn get(&self, name: &str) -> Result<Option<ProviderConfig>, CoreError>;
    async fn list(&self) -> Result<Vec<ProviderConfig>, CoreError>;
    async fn upsert(&self, config: &ProviderConfig) -> Result<(), CoreError>;
    async fn record_test_result(&self, name: &str, status: TestStatus) -> Result<(), CoreError>;
}

#[derive(Clone)]
pub struct PostgresProviderRepository {
    pool: PgPool,
}

impl PostgresProviderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProviderRepository for PostgresProviderRepository {
    async fn get(&self, name: &str) -> Result<Option<ProviderConfig>, CoreError> {
        let row = sqlx::query_as::<_, ProviderConfig>(
            "SELECT name, enabled, api_key, enabled_asset_types, last_test_status, \
             last_test_at FROM provider_config WHERE name = $1",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn list(&self) -> Result<Vec<ProviderConfig>, CoreError> {
        let rows = sqlx::query_as::<_, ProviderConfig>(
            "SELECT name, enabled, api_key, enabled_asset_types, last_test_status, \
             last_test_at FROM provider_config ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn upsert(&self, config: &ProviderConfig) -> Result<(), CoreError> {
        let asset_types = serde_json::to_value(&config.enabled_asset_types)?;
        let test_status = serde_json::to_value(&config.last_test_status)?;
        sqlx::query(
            r#"
            INSERT INTO provider_config (name, enabled, api_key, enabled_asset_types,
                last_test_status, last_test_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (name) DO UPDATE SET
                enabled = EXCLUDED.enabled,
                api_key = EXCLUDED.api_key,
                enabled_asset_types = EXCLUDED.enabled_asset_types
            "#,
        )
        .bind(&config.name)
        .bind(config.enabled)
        .bind(&config.api_key)
        .bind(asset_types)
        .bind(test_status)
        .bind(config.last_test_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn record_test_result(&self, name: &str, status: TestStatus) -> Result<(), CoreError> {
        let status_json = serde_json::to_value(&status)?;
        sqlx::query(
            "UPDATE provider_config SET last_test_status = $2, last_test_at = $3 WHERE name = $1",
        )
        .bind(name)
        .bind(status_json)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
