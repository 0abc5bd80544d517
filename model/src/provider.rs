use crate::cache_asset::AssetType;
use crate::chrono::{DateTime, Utc};

/// Category a provider adapter serves, per its declared capabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ProviderCategory {
    Metadata,
    Images,
    Both,
}

/// Authentication scheme a provider's upstream requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ProviderAuth {
    None,
    ApiKey,
    Bearer,
    Jwt,
}

/// Sustained/burst rate limit a provider declares it will honor, fed
/// straight into that provider's [`crate::provider::ProviderConfig`]-scoped
/// `RateLimiter`.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DeclaredRateLimit {
    pub requests_per_second: f64,
    pub burst_capacity: u32,
}

/// Coarse signal used to break merge ties when two providers agree on
/// priority rank for a field.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DataQuality {
    pub metadata_completeness: f32,
}

/// Static capability descriptor a [`crate::provider::ProviderAdapter`]
/// self-registers with the [`ProviderRegistry`] on startup.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ProviderCapabilities {
    pub id: String,
    pub name: String,
    pub version: String,
    pub category: ProviderCategory,
    pub supported_entity_types: Vec<String>,
    pub supported_metadata_fields: Vec<String>,
    pub supported_asset_types: Vec<AssetType>,
    pub auth: ProviderAuth,
    pub rate_limit: DeclaredRateLimit,
    pub search: bool,
    pub asset_provision: bool,
    pub data_quality: DataQuality,
}

/// Outcome of the last `testConnection()` call against a provider.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "status", rename_all = "snake_case"))]
pub enum TestStatus {
    NeverTested,
    Success,
    Error { message: String },
}

/// Operator-configured, per-provider settings persisted across restarts.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct ProviderConfig {
    pub name: String,
    pub enabled: bool,
    pub api_key: Option<String>,
    #[cfg_attr(feature = "sqlx", sqlx(json))]
    pub enabled_asset_types: Vec<AssetType>,
    #[cfg_attr(feature = "sqlx", sqlx(json))]
    pub last_test_status: TestStatus,
    pub last_test_at: Option<DateTime<Utc>>,
}

impl Default for TestStatus {
    fn default() -> Self {
        TestStatus::NeverTested
    }
}

/// Maps each asset type and metadata field name to an ordered list of
/// provider ids used to resolve merge conflicts.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PriorityProfile {
    pub name: String,
    pub field_priority: std::collections::BTreeMap<String, Vec<String>>,
    pub asset_type_priority: std::collections::BTreeMap<AssetType, Vec<String>>,
}

impl PriorityProfile {
    pub fn providers_for_field(&self, field: &str) -> &[String] {
        self.field_priority
            .get(field)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn providers_for_asset_type(&self, asset_type: AssetType) -> &[String] {
        self.asset_type_priority
            .get(&asset_type)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}
