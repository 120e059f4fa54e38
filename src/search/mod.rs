//! Search index managers.
//!
//! Backends speak JSON documents addressed by `(index, id)`. The typed
//! [`IndexManager`] layer sits on top, so every entity class gets an
//! `Index<T>` bound to its own search-subset type and index name.
//!
//! Backends:
//! - `algolia`: hosted search over the Algolia REST API
//! - `elasticsearch`: self-hosted cluster over its REST API
//! - `memory`: in-process documents with substring search
//! - `noop`: accepts everything, finds nothing

use std::fmt;
use std::marker::PhantomData;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::indexing::IndexType;

pub mod algolia;
pub mod elasticsearch;
pub mod memory;
pub mod noop;

pub use algolia::AlgoliaBackend;
pub use elasticsearch::ElasticsearchBackend;
pub use memory::MemorySearch;
pub use noop::NoopSearch;

/// Result type for search operations.
pub type Result<T> = std::result::Result<T, SearchError>;

/// Errors from search backends.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("Search request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Search backend returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Failed to encode search document: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("Failed to decode search document: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("Invalid search provider: {0}")]
    InvalidProvider(String),

    #[error("Search configuration error: {0}")]
    Config(String),
}

impl SearchError {
    /// Whether retrying the same call may succeed.
    ///
    /// Network failures, 5xx responses and rate limiting are transient.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Request(e) => !e.is_builder() && !e.is_decode(),
            Self::Status { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }

    pub(crate) fn status(status: reqwest::StatusCode, body: String) -> Self {
        Self::Status {
            status: status.as_u16(),
            body: body.chars().take(200).collect(),
        }
    }
}

/// A document type an index can hold.
pub trait SearchDocument: Serialize + DeserializeOwned + Send + Sync + 'static {}

impl<T> SearchDocument for T where T: Serialize + DeserializeOwned + Send + Sync + 'static {}

/// JSON-level search backend.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Insert or replace the document stored under `id`.
    async fn upsert(&self, index: &str, id: &str, document: Value) -> Result<()>;

    /// Remove `id`. Removing an absent document succeeds.
    async fn delete(&self, index: &str, id: &str) -> Result<()>;

    /// Documents matching `query`, in backend-defined order.
    async fn search(&self, index: &str, query: &str) -> Result<Vec<Value>>;

    /// Remove every document from `index`.
    async fn wipe(&self, index: &str) -> Result<()>;
}

/// Typed access to one search index.
#[async_trait]
pub trait IndexManager<T: SearchDocument>: Send + Sync {
    async fn upsert(&self, id: &str, document: &T) -> Result<()>;
    async fn delete(&self, id: &str) -> Result<()>;
    async fn search(&self, query: &str) -> Result<Vec<T>>;
    async fn wipe(&self) -> Result<()>;
}

/// An index name bound to a backend and a document type.
pub struct Index<T> {
    name: String,
    backend: Arc<dyn SearchBackend>,
    _document: PhantomData<fn() -> T>,
}

impl<T> Index<T> {
    pub fn new(name: impl Into<String>, backend: Arc<dyn SearchBackend>) -> Self {
        Self {
            name: name.into(),
            backend,
            _document: PhantomData,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<T> Clone for Index<T> {
    fn clone(&self) -> Self {
        Self::new(self.name.clone(), self.backend.clone())
    }
}

impl<T> fmt::Debug for Index<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Index")
            .field("name", &self.name)
            .field("backend", &self.backend.name())
            .finish()
    }
}

#[async_trait]
impl<T: SearchDocument> IndexManager<T> for Index<T> {
    async fn upsert(&self, id: &str, document: &T) -> Result<()> {
        let value = serde_json::to_value(document).map_err(SearchError::Encode)?;
        self.backend.upsert(&self.name, id, value).await
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.backend.delete(&self.name, id).await
    }

    async fn search(&self, query: &str) -> Result<Vec<T>> {
        self.backend
            .search(&self.name, query)
            .await?
            .into_iter()
            .map(|hit| serde_json::from_value(hit).map_err(SearchError::Decode))
            .collect()
    }

    async fn wipe(&self) -> Result<()> {
        self.backend.wipe(&self.name).await
    }
}

/// Hands out typed indexes over one shared backend.
#[derive(Clone)]
pub struct IndexProvider {
    backend: Arc<dyn SearchBackend>,
}

impl IndexProvider {
    pub fn new(backend: Arc<dyn SearchBackend>) -> Self {
        Self { backend }
    }

    /// Build the backend named by `config.provider`.
    pub fn from_config(config: &SearchConfig) -> Result<Self> {
        let provider: SearchProvider = config.provider.parse()?;
        let timeout = Duration::from_secs(config.timeout_secs);

        let backend: Arc<dyn SearchBackend> = match provider {
            SearchProvider::Noop => Arc::new(NoopSearch),
            SearchProvider::Memory => Arc::new(MemorySearch::new()),
            SearchProvider::Algolia => Arc::new(AlgoliaBackend::new(&config.algolia, timeout)?),
            SearchProvider::Elasticsearch => Arc::new(ElasticsearchBackend::new(
                &config.elasticsearch,
                timeout,
            )?),
        };

        info!(provider = backend.name(), "Search index provider initialized");
        Ok(Self::new(backend))
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// The index for `index_type`, holding documents of type `T`.
    pub fn provide<T: SearchDocument>(&self, index_type: IndexType) -> Index<T> {
        Index::new(index_type.as_str(), self.backend.clone())
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// Search backend discriminator. An empty provider string selects `Noop`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchProvider {
    Noop,
    Memory,
    Algolia,
    Elasticsearch,
}

impl FromStr for SearchProvider {
    type Err = SearchError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "" | "noop" => Ok(Self::Noop),
            "memory" => Ok(Self::Memory),
            "algolia" => Ok(Self::Algolia),
            "elasticsearch" => Ok(Self::Elasticsearch),
            _ => Err(SearchError::InvalidProvider(s.to_string())),
        }
    }
}

/// Search configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Provider name, see [`SearchProvider`].
    pub provider: String,
    pub algolia: AlgoliaConfig,
    pub elasticsearch: ElasticsearchConfig,
    /// Per-request timeout for HTTP backends.
    pub timeout_secs: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            provider: String::new(),
            algolia: AlgoliaConfig::default(),
            elasticsearch: ElasticsearchConfig::default(),
            timeout_secs: 10,
        }
    }
}

/// Algolia configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AlgoliaConfig {
    pub app_id: String,
    pub api_key: String,
    /// Overrides `https://{app_id}.algolia.net`.
    pub base_url: Option<String>,
}

/// Elasticsearch configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ElasticsearchConfig {
    pub url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Prepended to every index name.
    pub index_prefix: String,
    /// Ask the cluster to refresh after each write so searches see it.
    pub refresh: bool,
}

impl Default for ElasticsearchConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:9200".to_string(),
            username: None,
            password: None,
            index_prefix: String::new(),
            refresh: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexing::RecipeSearchSubset;

    #[test]
    fn test_provider_parse() {
        assert_eq!("".parse::<SearchProvider>().unwrap(), SearchProvider::Noop);
        assert_eq!(
            " Algolia ".parse::<SearchProvider>().unwrap(),
            SearchProvider::Algolia
        );
        assert_eq!(
            "ELASTICSEARCH".parse::<SearchProvider>().unwrap(),
            SearchProvider::Elasticsearch
        );
        assert!(matches!(
            "solr".parse::<SearchProvider>(),
            Err(SearchError::InvalidProvider(p)) if p == "solr"
        ));
    }

    #[test]
    fn test_default_config_selects_noop() {
        let provider = IndexProvider::from_config(&SearchConfig::default()).unwrap();
        assert_eq!(provider.backend_name(), "noop");
    }

    #[test]
    fn test_algolia_requires_credentials() {
        let config = SearchConfig {
            provider: "algolia".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            IndexProvider::from_config(&config),
            Err(SearchError::Config(_))
        ));
    }

    #[test]
    fn test_transient_classification() {
        let unavailable = SearchError::Status {
            status: 503,
            body: String::new(),
        };
        let throttled = SearchError::Status {
            status: 429,
            body: String::new(),
        };
        let rejected = SearchError::Status {
            status: 400,
            body: String::new(),
        };
        assert!(unavailable.is_transient());
        assert!(throttled.is_transient());
        assert!(!rejected.is_transient());
        assert!(!SearchError::Config("x".to_string()).is_transient());
    }

    #[tokio::test]
    async fn test_index_names_follow_index_type() {
        let provider = IndexProvider::new(Arc::new(MemorySearch::new()));
        let index = provider.provide::<RecipeSearchSubset>(IndexType::ValidIngredientStates);
        assert_eq!(index.name(), "valid_ingredient_states");
    }

    #[tokio::test]
    async fn test_typed_index_roundtrips_documents() {
        let search = MemorySearch::new();
        let provider = IndexProvider::new(Arc::new(search.clone()));
        let index = provider.provide::<RecipeSearchSubset>(IndexType::Recipes);

        let soup = RecipeSearchSubset {
            id: "r1".to_string(),
            name: "Soup".to_string(),
            description: "warm".to_string(),
            steps: vec![],
        };
        index.upsert("r1", &soup).await.unwrap();

        assert_eq!(index.search("sou").await.unwrap(), vec![soup]);
        assert!(search.document("recipes", "r1").await.is_some());

        index.delete("r1").await.unwrap();
        assert!(index.search("sou").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_decode_failure_surfaces() {
        let search = MemorySearch::new();
        search
            .upsert("recipes", "bad", serde_json::json!({"name": 7}))
            .await
            .unwrap();

        let index: Index<RecipeSearchSubset> = Index::new("recipes", Arc::new(search));
        assert!(matches!(index.search("").await, Err(SearchError::Decode(_))));
    }
}
