use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::time::Instant;

/// Number of results returned by [`VectorStoreClient::query`] when the caller
/// does not set [`QueryOptions::count`].
pub const DEFAULT_QUERY_COUNT: usize = 5;

/// Upper bound on the number of entries returned by a single
/// [`VectorStoreClient::load_entries`] call.
pub const DEFAULT_MAX_PAGE_SIZE: usize = 10_000;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Unified error type for the Synaptic vector-store clients.
#[derive(Debug, Error)]
pub enum SynapticError {
    #[error("remote service error (HTTP {status}): {message}")]
    RemoteService { status: u16, message: String },
    #[error("index creation error: {0}")]
    IndexCreation(String),
    #[error("index not found: {0}")]
    IndexNotFound(String),
    #[error("not implemented: {0}")]
    NotImplemented(String),
    #[error("vector store error: {0}")]
    VectorStore(String),
    #[error("embedding error: {0}")]
    Embedding(String),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("parsing error: {0}")]
    Parsing(String),
    #[error("timeout: {0}")]
    Timeout(String),
    #[error("config error: {0}")]
    Config(String),
}

impl SynapticError {
    /// HTTP status of a [`SynapticError::RemoteService`] error.
    pub fn status(&self) -> Option<u16> {
        match self {
            SynapticError::RemoteService { status, .. } => Some(*status),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// TextArtifact
// ---------------------------------------------------------------------------

/// A piece of text with a stable identifier, stored verbatim alongside the
/// document it produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextArtifact {
    pub id: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl TextArtifact {
    /// Create an artifact with a freshly generated id.
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().simple().to_string(),
            value: value.into(),
            name: None,
        }
    }

    pub fn with_id(id: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            value: value.into(),
            name: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn to_json(&self) -> Result<String, SynapticError> {
        serde_json::to_string(self)
            .map_err(|e| SynapticError::Parsing(format!("serialize artifact {}: {e}", self.id)))
    }

    pub fn from_json(json: &str) -> Result<Self, SynapticError> {
        serde_json::from_str(json)
            .map_err(|e| SynapticError::Parsing(format!("deserialize artifact: {e}")))
    }
}

// ---------------------------------------------------------------------------
// Entry / QueryResult
// ---------------------------------------------------------------------------

/// A stored document as returned by a point lookup or bulk listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub id: String,
    pub vector: Vec<f32>,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

/// A single hit of a similarity search. Higher scores are more relevant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub id: String,
    pub score: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector: Option<Vec<f32>>,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

/// Acknowledgment of a `create_index` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexAck {
    pub index: String,
    pub acknowledged: bool,
    /// `false` when `if_not_exists` found the index already present.
    pub created: bool,
}

// ---------------------------------------------------------------------------
// Per-operation options
// ---------------------------------------------------------------------------

/// Options shared by the upsert operations.
#[derive(Debug, Clone, Default)]
pub struct UpsertOptions {
    /// Document id. A random id is assigned when `None`. Ignored by
    /// artifact upserts, which always use the artifact's own id.
    pub id: Option<String>,
    pub namespace: Option<String>,
    /// Auxiliary scalar fields stored next to the document.
    pub metadata: HashMap<String, Value>,
}

impl UpsertOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Reject metadata keys that are `_`-prefixed or listed in `reserved`,
    /// and values that are arrays or objects.
    pub fn check_metadata(&self, reserved: &[&str]) -> Result<(), SynapticError> {
        for (key, value) in &self.metadata {
            if key.starts_with('_') || reserved.contains(&key.as_str()) {
                return Err(SynapticError::Validation(format!(
                    "metadata key '{key}' is reserved"
                )));
            }
            if value.is_array() || value.is_object() {
                return Err(SynapticError::Validation(format!(
                    "metadata value for '{key}' must be a scalar"
                )));
            }
        }
        Ok(())
    }
}

/// Options for [`VectorStoreClient::query`].
#[derive(Debug, Clone)]
pub struct QueryOptions {
    /// Maximum number of results; the client default applies when `None`.
    pub count: Option<usize>,
    pub namespace: Option<String>,
    /// Fetch and attach each hit's embedding.
    pub include_vectors: bool,
    /// When `false`, only ids and scores are retrieved.
    pub include_metadata: bool,
    /// Backend-specific request parameters. Named options take precedence.
    pub extra: Map<String, Value>,
    pub deadline: Option<Instant>,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            count: None,
            namespace: None,
            include_vectors: false,
            include_metadata: true,
            extra: Map::new(),
            deadline: None,
        }
    }
}

impl QueryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_count(mut self, count: usize) -> Self {
        self.count = Some(count);
        self
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn with_vectors(mut self, include: bool) -> Self {
        self.include_vectors = include;
        self
    }

    pub fn with_metadata(mut self, include: bool) -> Self {
        self.include_metadata = include;
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

/// Options for [`VectorStoreClient::load_entries`].
#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    pub namespace: Option<String>,
    /// Capped by the client's maximum page size.
    pub limit: Option<usize>,
    pub deadline: Option<Instant>,
}

impl ListOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

/// Options for [`VectorStoreClient::create_index`].
#[derive(Debug, Clone, Default)]
pub struct IndexOptions {
    /// Backend index settings, sent as-is.
    pub settings: Map<String, Value>,
    /// Succeed without creating anything when the index already exists.
    pub if_not_exists: bool,
}

impl IndexOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_setting(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.settings.insert(key.into(), value.into());
        self
    }

    pub fn if_not_exists(mut self) -> Self {
        self.if_not_exists = true;
        self
    }
}

/// Run `fut` under an optional deadline, mapping expiry to
/// [`SynapticError::Timeout`].
pub async fn with_deadline<T, F>(
    deadline: Option<Instant>,
    operation: &str,
    fut: F,
) -> Result<T, SynapticError>
where
    F: std::future::Future<Output = Result<T, SynapticError>>,
{
    match deadline {
        Some(at) => tokio::time::timeout_at(at, fut)
            .await
            .map_err(|_| SynapticError::Timeout(format!("{operation}: deadline exceeded")))?,
        None => fut.await,
    }
}

// ---------------------------------------------------------------------------
// Embeddings trait
// ---------------------------------------------------------------------------

/// Trait for embedding text into vectors.
#[async_trait]
pub trait Embeddings: Send + Sync {
    /// Embed multiple texts (for batch document embedding).
    async fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, SynapticError>;

    /// Embed a single query text.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, SynapticError>;
}

// ---------------------------------------------------------------------------
// VectorStoreClient trait
// ---------------------------------------------------------------------------

/// A client for a document-and-vector index.
///
/// Every document operation names its target index explicitly, so a single
/// client can be shared between tasks working on different indexes.
#[async_trait]
pub trait VectorStoreClient: Send + Sync {
    /// Create an index with backend-specific settings.
    async fn create_index(
        &self,
        name: &str,
        options: IndexOptions,
    ) -> Result<IndexAck, SynapticError>;

    /// Delete an index. Fails with [`SynapticError::IndexNotFound`] if absent.
    async fn delete_index(&self, name: &str) -> Result<(), SynapticError>;

    /// Names of all indexes, sorted.
    async fn list_indexes(&self) -> Result<Vec<String>, SynapticError>;

    /// Insert or replace a document from a precomputed embedding.
    ///
    /// Backends that only accept text keep the default, which fails with
    /// [`SynapticError::NotImplemented`].
    async fn upsert_vector(
        &self,
        index: &str,
        _vector: Vec<f32>,
        _options: UpsertOptions,
    ) -> Result<String, SynapticError> {
        Err(SynapticError::NotImplemented(format!(
            "upsert_vector is not supported for index '{index}'"
        )))
    }

    /// Insert or replace a document whose text is embedded by the backend.
    async fn upsert_text(
        &self,
        index: &str,
        text: &str,
        options: UpsertOptions,
    ) -> Result<String, SynapticError>;

    /// Insert or replace a document built from an artifact. The artifact's
    /// id and value are used; its JSON form is stored alongside.
    async fn upsert_text_artifact(
        &self,
        index: &str,
        artifact: &TextArtifact,
        options: UpsertOptions,
    ) -> Result<String, SynapticError>;

    /// Upsert several artifacts, returning their ids in order.
    async fn upsert_text_artifacts(
        &self,
        index: &str,
        artifacts: &[TextArtifact],
        options: UpsertOptions,
    ) -> Result<Vec<String>, SynapticError> {
        let mut ids = Vec::with_capacity(artifacts.len());
        for artifact in artifacts {
            ids.push(
                self.upsert_text_artifact(index, artifact, options.clone())
                    .await?,
            );
        }
        Ok(ids)
    }

    /// Point lookup. A missing document is `Ok(None)`.
    async fn load_entry(
        &self,
        index: &str,
        id: &str,
        namespace: Option<&str>,
    ) -> Result<Option<Entry>, SynapticError>;

    /// List stored documents, at most the client's page size.
    async fn load_entries(
        &self,
        index: &str,
        options: ListOptions,
    ) -> Result<Vec<Entry>, SynapticError>;

    /// Similarity search ordered by descending score.
    async fn query(
        &self,
        index: &str,
        query: &str,
        options: QueryOptions,
    ) -> Result<Vec<QueryResult>, SynapticError>;

    /// Field under which artifact JSON is stored.
    fn artifact_field(&self) -> &str {
        "artifact"
    }

    /// Load every entry in `namespace` that was stored from an artifact.
    async fn load_artifacts(
        &self,
        index: &str,
        namespace: Option<&str>,
    ) -> Result<Vec<TextArtifact>, SynapticError> {
        let mut options = ListOptions::new();
        options.namespace = namespace.map(str::to_string);
        let entries = self.load_entries(index, options).await?;
        let field = self.artifact_field();

        entries
            .iter()
            .filter_map(|entry| entry.metadata.get(field).and_then(Value::as_str))
            .map(TextArtifact::from_json)
            .collect()
    }
}
