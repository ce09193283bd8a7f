//! Azure AI Search integration: index deployment, runtime lookups and
//! blob uploads of generated dictionary files.

pub mod blob;
pub mod client;
pub mod definitions;
pub mod deploy;
pub mod error;
pub mod index;
pub mod local;
pub mod service;

pub use blob::BlobUploader;
pub use client::{
    AiSearchConnector, CachedQuery, Document, SearchClient, SearchQuery, SqlQueryDecomposition,
    DEFAULT_CACHE_THRESHOLD,
};
pub use definitions::DefinitionSettings;
pub use deploy::{DeployOptions, DeployReport, IndexDeployer};
pub use error::SearchError;
pub use index::IndexType;
pub use local::LocalSearchClient;
pub use service::SearchService;
