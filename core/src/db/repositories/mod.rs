pub mod asset_links;
pub mod cache;
pub mod entities;
pub mod jobs;
pub mod libraries;
pub mod locks;
pub mod providers;
pub mod scan_jobs;

pub use asset_links::{AssetLinkRepository, NewAssetLink, PostgresAssetLinkRepository};
pub use cache::{CacheRepository, PostgresCacheRepository};
pub use entities::{EntityRepository, PostgresEntityRepository};
pub use jobs::{JobRepository, PostgresJobRepository};
pub use libraries::{LibraryRepository, PostgresLibraryRepository};
pub use locks::{LockRepository, PostgresLockRepository};
pub use providers::{PostgresProviderRepository, ProviderRepository};
pub use scan_jobs::{PostgresScanJobRepository, ScanJobRepository};
