//! Degenerate `ProviderAdapter` reading NFO sidecars and discovered
//! files rather than issuing network calls; unbounded rate limit.

use std::path::PathBuf;

use async_trait::async_trait;
use catalogd_model::{
    AssetCandidate, DataQuality, DeclaredRateLimit, ProviderAuth, ProviderCapabilities,
    ProviderCategory,
};

use super::{
    AssetRequest, ConnectionTestResult, MetadataRequest, MetadataResponse, ProviderAdapter,
    SearchRequest, SearchResult,
};
use crate::error::CoreError;

pub struct LocalProvider {
    library_root: PathBuf,
}

impl LocalProvider {
    pub fn new(library_root: PathBuf) -> Self {
        Self { library_root }
    }

    /// Reads a `<basename>.nfo` sidecar next to `external_id` (here,
    /// `external_id` is the entity's library-relative path) and
    /// extracts whatever plain key=value lines it contains. Real NFO
    /// parsing (XML) is out of scope for this degenerate adapter.
    async fn read_nfo(&self, relative_path: &str) -> Option<String> {
        let nfo_path = self.library_root.join(relative_path).with_extension("nfo");
        tokio::fs::read_to_string(nfo_path).await.ok()
    }
}

#[async_trait]
impl ProviderAdapter for LocalProvider {
    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            id: "local".into(),
            name: "Local NFO/Sidecar".into(),
            version: "1".into(),
            category: ProviderCategory::Metadata,
            supported_entity_types: vec!["movie".into(), "series".into()],
            supported_metadata_fields: vec!["title".into(), "plot".into()],
            supported_asset_types: vec![],
            auth: ProviderAuth::None,
            rate_limit: DeclaredRateLimit {
                requests_per_second: f64::MAX,
                burst_capacity: u32::MAX,
            },
            search: false,
            asset_provision: false,
            data_quality: DataQuality {
                metadata_completeness: 0.3,
            },
        }
    }

    async fn search(&self, _req: SearchRequest) -> Result<Vec<SearchResult>, CoreError> {
        Ok(Vec::new())
    }

    async fn get_metadata(&self, req: MetadataRequest) -> Result<MetadataResponse, CoreError> {
        let mut response = MetadataResponse::default();
        if let Some(contents) = self.read_nfo(&req.external_id).await {
            for line in contents.lines() {
                if let Some((key, value)) = line.split_once('=') {
                    response.fields.insert(
                        key.trim().to_string(),
                        serde_json::Value::String(value.trim().to_string()),
                    );
                }
            }
            response.completeness = 0.3;
            response.confidence = 1.0;
        }
        Ok(response)
    }

    async fn get_assets(&self, _req: AssetRequest) -> Result<Vec<AssetCandidate>, CoreError> {
        Ok(Vec::new())
    }

    async fn test_connection(&self) -> Result<ConnectionTestResult, CoreError> {
        Ok(ConnectionTestResult {
            ok: self.library_root.exists(),
            message: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn get_metadata_reads_key_value_lines_from_the_nfo_sidecar() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("movie.nfo"), "title = Example\nplot=A plot\n").unwrap();

        let provider = LocalProvider::new(dir.path().to_path_buf());
        let response = provider
            .get_metadata(MetadataRequest {
                entity_type: super::super::EntityKind::Movie,
                external_id: "movie".to_string(),
                requested_fields: vec!["title".to_string(), "plot".to_string()],
            })
            .await
            .unwrap();

        assert_eq!(response.fields.get("title"), Some(&serde_json::json!("Example")));
        assert_eq!(response.fields.get("plot"), Some(&serde_json::json!("A plot")));
        assert_eq!(response.completeness, 0.3);
    }

    #[tokio::test]
    async fn get_metadata_with_no_sidecar_returns_an_empty_response() {
        let dir = tempfile::tempdir().unwrap();
        let provider = LocalProvider::new(dir.path().to_path_buf());
        let response = provider
            .get_metadata(MetadataRequest {
                entity_type: super::super::EntityKind::Movie,
                external_id: "missing".to_string(),
                requested_fields: vec!["title".to_string()],
            })
            .await
            .unwrap();
        assert!(response.fields.is_empty());
        assert_eq!(response.completeness, 0.0);
    }

    #[tokio::test]
    async fn test_connection_reports_whether_the_library_root_exists() {
        let dir = tempfile::tempdir().unwrap();
        let present = LocalProvider::new(dir.path().to_path_buf());
        assert!(present.test_connection().await.unwrap().ok);

        let missing = LocalProvider::new(dir.path().join("does-not-exist"));
        assert!(!missing.test_connection().await.unwrap().ok);
    }
}
