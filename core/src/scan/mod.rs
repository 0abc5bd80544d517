//! Library scanning and on-disk asset classification.

pub mod discovery;
pub mod service;

pub use discovery::{AssetDiscovery, ClassifiedAsset, DiscoveredMedia};
pub use service::ScanService;
