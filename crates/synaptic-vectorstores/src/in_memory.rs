use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use synaptic_core::{
    with_deadline, Embeddings, Entry, IndexAck, IndexOptions, ListOptions, QueryOptions,
    QueryResult, SynapticError, TextArtifact, UpsertOptions, VectorStoreClient,
    DEFAULT_MAX_PAGE_SIZE, DEFAULT_QUERY_COUNT,
};
use tokio::sync::RwLock;

const CONTENT_FIELD: &str = "content";
const NAMESPACE_FIELD: &str = "namespace";
const ARTIFACT_FIELD: &str = "artifact";

/// Stored document with its embedding vector.
#[derive(Clone)]
struct StoredEntry {
    vector: Vec<f32>,
    metadata: HashMap<String, Value>,
    namespace: Option<String>,
}

impl StoredEntry {
    fn to_entry(&self, id: &str) -> Entry {
        Entry {
            id: id.to_string(),
            vector: self.vector.clone(),
            metadata: self.metadata.clone(),
            namespace: self.namespace.clone(),
        }
    }
}

type Index = BTreeMap<String, StoredEntry>;

/// In-memory [`VectorStoreClient`] using cosine similarity.
///
/// Text is embedded locally with the supplied [`Embeddings`]. Documents keep
/// their text under `content`, the namespace under `namespace` and artifact
/// JSON under `artifact`; caller metadata sits next to them.
pub struct InMemoryVectorStore {
    embeddings: Arc<dyn Embeddings>,
    indexes: RwLock<HashMap<String, Index>>,
    default_query_count: usize,
    max_page_size: usize,
}

impl InMemoryVectorStore {
    pub fn new(embeddings: Arc<dyn Embeddings>) -> Self {
        Self {
            embeddings,
            indexes: RwLock::new(HashMap::new()),
            default_query_count: DEFAULT_QUERY_COUNT,
            max_page_size: DEFAULT_MAX_PAGE_SIZE,
        }
    }

    pub fn with_default_query_count(mut self, count: usize) -> Self {
        self.default_query_count = count;
        self
    }

    pub fn with_max_page_size(mut self, size: usize) -> Self {
        self.max_page_size = size;
        self
    }

    /// Create a new store with one index pre-populated with `(id, text)` pairs.
    pub async fn from_texts(
        index: &str,
        texts: Vec<(&str, &str)>,
        embeddings: Arc<dyn Embeddings>,
    ) -> Result<Self, SynapticError> {
        let store = Self::new(embeddings);
        store.create_index(index, IndexOptions::new()).await?;
        for (id, text) in texts {
            store
                .upsert_text(index, text, UpsertOptions::new().with_id(id))
                .await?;
        }
        Ok(store)
    }

    /// Number of documents in `index`.
    pub async fn document_count(&self, index: &str) -> Result<usize, SynapticError> {
        let indexes = self.indexes.read().await;
        indexes
            .get(index)
            .map(BTreeMap::len)
            .ok_or_else(|| SynapticError::IndexNotFound(index.to_string()))
    }

    async fn insert(
        &self,
        index: &str,
        vector: Vec<f32>,
        mut fields: HashMap<String, Value>,
        options: UpsertOptions,
    ) -> Result<String, SynapticError> {
        options.check_metadata(&[CONTENT_FIELD, NAMESPACE_FIELD, ARTIFACT_FIELD])?;
        let id = options
            .id
            .unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string());

        fields.extend(options.metadata);
        if let Some(ref ns) = options.namespace {
            fields.insert(NAMESPACE_FIELD.to_string(), Value::String(ns.clone()));
        }

        let mut indexes = self.indexes.write().await;
        let docs = indexes
            .get_mut(index)
            .ok_or_else(|| SynapticError::IndexNotFound(index.to_string()))?;
        docs.insert(
            id.clone(),
            StoredEntry {
                vector,
                metadata: fields,
                namespace: options.namespace,
            },
        );
        Ok(id)
    }

    async fn embed_one(&self, text: &str) -> Result<Vec<f32>, SynapticError> {
        self.embeddings
            .embed_documents(&[text])
            .await?
            .pop()
            .ok_or_else(|| SynapticError::Embedding("no embedding returned".to_string()))
    }

    async fn search(
        &self,
        index: &str,
        query: &str,
        options: &QueryOptions,
        count: usize,
    ) -> Result<Vec<QueryResult>, SynapticError> {
        let query_vec = self.embeddings.embed_query(query).await?;
        let indexes = self.indexes.read().await;
        let docs = indexes
            .get(index)
            .ok_or_else(|| SynapticError::IndexNotFound(index.to_string()))?;

        let namespace = options.namespace.as_deref();
        let mut scored: Vec<QueryResult> = docs
            .iter()
            .filter(|(_, entry)| namespace.is_none() || entry.namespace.as_deref() == namespace)
            .map(|(id, entry)| QueryResult {
                id: id.clone(),
                score: cosine_similarity(&query_vec, &entry.vector),
                vector: options.include_vectors.then(|| entry.vector.clone()),
                metadata: if options.include_metadata {
                    entry.metadata.clone()
                } else {
                    HashMap::new()
                },
                namespace: entry.namespace.clone(),
            })
            .collect();

        // Sort by score descending
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(count);

        Ok(scored)
    }
}

#[async_trait]
impl VectorStoreClient for InMemoryVectorStore {
    async fn create_index(
        &self,
        name: &str,
        options: IndexOptions,
    ) -> Result<IndexAck, SynapticError> {
        let mut indexes = self.indexes.write().await;
        if indexes.contains_key(name) {
            if options.if_not_exists {
                return Ok(IndexAck {
                    index: name.to_string(),
                    acknowledged: true,
                    created: false,
                });
            }
            return Err(SynapticError::IndexCreation(format!(
                "index '{name}' already exists"
            )));
        }
        indexes.insert(name.to_string(), Index::new());
        Ok(IndexAck {
            index: name.to_string(),
            acknowledged: true,
            created: true,
        })
    }

    async fn delete_index(&self, name: &str) -> Result<(), SynapticError> {
        let mut indexes = self.indexes.write().await;
        indexes
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| SynapticError::IndexNotFound(name.to_string()))
    }

    async fn list_indexes(&self) -> Result<Vec<String>, SynapticError> {
        let indexes = self.indexes.read().await;
        let mut names: Vec<String> = indexes.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn upsert_vector(
        &self,
        index: &str,
        vector: Vec<f32>,
        options: UpsertOptions,
    ) -> Result<String, SynapticError> {
        if vector.is_empty() {
            return Err(SynapticError::Validation(
                "cannot upsert an empty vector".to_string(),
            ));
        }
        self.insert(index, vector, HashMap::new(), options).await
    }

    async fn upsert_text(
        &self,
        index: &str,
        text: &str,
        options: UpsertOptions,
    ) -> Result<String, SynapticError> {
        let vector = self.embed_one(text).await?;
        let mut fields = HashMap::new();
        fields.insert(CONTENT_FIELD.to_string(), Value::String(text.to_string()));
        self.insert(index, vector, fields, options).await
    }

    async fn upsert_text_artifact(
        &self,
        index: &str,
        artifact: &TextArtifact,
        mut options: UpsertOptions,
    ) -> Result<String, SynapticError> {
        let vector = self.embed_one(&artifact.value).await?;
        let mut fields = HashMap::new();
        fields.insert(
            CONTENT_FIELD.to_string(),
            Value::String(artifact.value.clone()),
        );
        fields.insert(
            ARTIFACT_FIELD.to_string(),
            Value::String(artifact.to_json()?),
        );
        options.id = Some(artifact.id.clone());
        self.insert(index, vector, fields, options).await
    }

    async fn load_entry(
        &self,
        index: &str,
        id: &str,
        namespace: Option<&str>,
    ) -> Result<Option<Entry>, SynapticError> {
        let indexes = self.indexes.read().await;
        let docs = indexes
            .get(index)
            .ok_or_else(|| SynapticError::IndexNotFound(index.to_string()))?;
        Ok(docs
            .get(id)
            .filter(|entry| namespace.is_none() || entry.namespace.as_deref() == namespace)
            .map(|entry| entry.to_entry(id)))
    }

    async fn load_entries(
        &self,
        index: &str,
        options: ListOptions,
    ) -> Result<Vec<Entry>, SynapticError> {
        let limit = options
            .limit
            .unwrap_or(self.max_page_size)
            .min(self.max_page_size);
        let indexes = self.indexes.read().await;
        let docs = indexes
            .get(index)
            .ok_or_else(|| SynapticError::IndexNotFound(index.to_string()))?;

        let namespace = options.namespace.as_deref();
        Ok(docs
            .iter()
            .filter(|(_, entry)| namespace.is_none() || entry.namespace.as_deref() == namespace)
            .take(limit)
            .map(|(id, entry)| entry.to_entry(id))
            .collect())
    }

    async fn query(
        &self,
        index: &str,
        query: &str,
        options: QueryOptions,
    ) -> Result<Vec<QueryResult>, SynapticError> {
        let count = options.count.unwrap_or(self.default_query_count);
        if count == 0 {
            return Ok(Vec::new());
        }
        with_deadline(
            options.deadline,
            &format!("query '{index}'"),
            self.search(index, query, &options, count),
        )
        .await
    }

    fn artifact_field(&self) -> &str {
        ARTIFACT_FIELD
    }
}

/// Compute cosine similarity between two vectors.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }

    dot / (mag_a * mag_b)
}
