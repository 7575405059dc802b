use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use synaptic_core::{
    with_deadline, Entry, IndexAck, IndexOptions, ListOptions, QueryOptions, QueryResult,
    SynapticError, TextArtifact, UpsertOptions, VectorStoreClient, DEFAULT_MAX_PAGE_SIZE,
    DEFAULT_QUERY_COUNT,
};
use tokio::time::Instant;

use crate::backend::{HttpBackend, MarqoBackend, MarqoRequest, MarqoResponse, Method};

// ---------------------------------------------------------------------------
// MarqoConfig
// ---------------------------------------------------------------------------

/// Configuration for connecting to a Marqo instance.
#[derive(Debug, Clone)]
pub struct MarqoConfig {
    /// Marqo URL, e.g. `http://localhost:8882`.
    pub url: String,
    /// Optional API key, sent as `x-api-key`.
    pub api_key: Option<String>,
    /// Index returned by [`MarqoVectorStore::index`].
    pub index: String,
    /// Result count used by `query` when none is requested.
    pub default_query_count: usize,
    /// Ceiling on the number of entries a single `load_entries` returns.
    pub max_page_size: usize,
    /// Tensor field holding the document text (default: `Description`).
    pub text_field: String,
    /// Non-tensor field holding the namespace tag (default: `namespace`).
    pub namespace_field: String,
    /// Non-tensor field holding serialized artifacts (default: `artifact`).
    pub artifact_field: String,
}

impl MarqoConfig {
    pub fn new(url: impl Into<String>, index: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            api_key: None,
            index: index.into(),
            default_query_count: DEFAULT_QUERY_COUNT,
            max_page_size: DEFAULT_MAX_PAGE_SIZE,
            text_field: "Description".to_string(),
            namespace_field: "namespace".to_string(),
            artifact_field: "artifact".to_string(),
        }
    }

    /// Read `MARQO_URL` (required), `MARQO_API_KEY` and `MARQO_INDEX`.
    pub fn from_env() -> Result<Self, SynapticError> {
        let url = std::env::var("MARQO_URL")
            .map_err(|_| SynapticError::Config("MARQO_URL is not set".to_string()))?;
        let index = std::env::var("MARQO_INDEX").unwrap_or_else(|_| "default".to_string());
        let mut config = Self::new(url, index);
        if let Ok(key) = std::env::var("MARQO_API_KEY") {
            config.api_key = Some(key);
        }
        Ok(config)
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_default_query_count(mut self, count: usize) -> Self {
        self.default_query_count = count;
        self
    }

    pub fn with_max_page_size(mut self, size: usize) -> Self {
        self.max_page_size = size;
        self
    }

    pub fn with_text_field(mut self, field: impl Into<String>) -> Self {
        self.text_field = field.into();
        self
    }

    pub fn with_namespace_field(mut self, field: impl Into<String>) -> Self {
        self.namespace_field = field.into();
        self
    }

    pub fn with_artifact_field(mut self, field: impl Into<String>) -> Self {
        self.artifact_field = field.into();
        self
    }
}

// ---------------------------------------------------------------------------
// MarqoVectorStore
// ---------------------------------------------------------------------------

/// A [`VectorStoreClient`] backed by [Marqo](https://www.marqo.ai/).
///
/// Marqo embeds the configured text field itself, so no [`Embeddings`]
/// implementation is involved. Documents are stored as:
/// - `_id`: the document id
/// - `Description`: the text (or a custom vector for `upsert_vector`)
/// - `namespace`: the namespace tag, used as an equality filter
/// - `artifact`: serialized [`TextArtifact`] JSON
/// - any caller metadata as flat scalar fields
///
/// Everything except the text field is sent as a non-tensor field.
///
/// [`Embeddings`]: synaptic_core::Embeddings
pub struct MarqoVectorStore {
    config: MarqoConfig,
    backend: Arc<dyn MarqoBackend>,
}

impl MarqoVectorStore {
    /// Create a store talking to `config.url` over HTTP.
    pub fn new(config: MarqoConfig) -> Self {
        let mut backend = HttpBackend::new(config.url.clone());
        if let Some(ref key) = config.api_key {
            backend = backend.with_api_key(key.clone());
        }
        Self {
            config,
            backend: Arc::new(backend),
        }
    }

    /// Create with a custom transport.
    pub fn with_backend(config: MarqoConfig, backend: Arc<dyn MarqoBackend>) -> Self {
        Self { config, backend }
    }

    pub fn config(&self) -> &MarqoConfig {
        &self.config
    }

    /// The currently selected index.
    pub fn index(&self) -> &str {
        &self.config.index
    }

    /// Select another index. The index is not checked for existence; use
    /// [`use_index`](Self::use_index) to create it when missing.
    pub fn set_index(&mut self, name: impl Into<String>) {
        self.config.index = name.into();
    }

    /// Create `name` if it does not exist yet, then select it.
    pub async fn use_index(
        &mut self,
        name: &str,
        options: IndexOptions,
    ) -> Result<IndexAck, SynapticError> {
        let ack = self.create_index(name, options.if_not_exists()).await?;
        self.config.index = name.to_string();
        Ok(ack)
    }

    async fn send(&self, request: MarqoRequest) -> Result<MarqoResponse, SynapticError> {
        tracing::debug!("MarqoVectorStore: {:?} {}", request.method, request.path);
        self.backend.send(request).await
    }

    /// Start a document with id, namespace and metadata fields filled in.
    fn base_document(
        &self,
        id: &str,
        options: &UpsertOptions,
    ) -> Result<Map<String, Value>, SynapticError> {
        options.check_metadata(&[
            self.config.text_field.as_str(),
            self.config.namespace_field.as_str(),
            self.config.artifact_field.as_str(),
        ])?;
        let mut doc = Map::new();
        doc.insert("_id".to_string(), Value::String(id.to_string()));
        for (key, value) in &options.metadata {
            doc.insert(key.clone(), value.clone());
        }
        if let Some(ref namespace) = options.namespace {
            doc.insert(
                self.config.namespace_field.clone(),
                Value::String(namespace.clone()),
            );
        }
        Ok(doc)
    }

    async fn add_document(
        &self,
        index: &str,
        doc: Map<String, Value>,
        mappings: Option<Value>,
    ) -> Result<(), SynapticError> {
        let non_tensor_fields: Vec<&String> = doc
            .keys()
            .filter(|k| *k != "_id" && **k != self.config.text_field)
            .collect();

        let mut body = json!({
            "documents": [&doc],
            "nonTensorFields": non_tensor_fields,
        });
        if let Some(mappings) = mappings {
            body["mappings"] = mappings;
        }

        let request = MarqoRequest::new(Method::Post, index_path(index, &["documents"]))
            .with_body(body);
        let response = self.send(request).await?;
        if !response.is_success() {
            return Err(remote_error(&format!("add documents to '{index}'"), &response));
        }

        if response.body["errors"].as_bool().unwrap_or(false) {
            let failed = response.body["items"]
                .as_array()
                .and_then(|items| items.iter().find(|item| item.get("error").is_some()));
            let (status, message) = match failed {
                Some(item) => (
                    item["status"]
                        .as_u64()
                        .and_then(|s| u16::try_from(s).ok())
                        .unwrap_or(400),
                    message_of(&item["error"]),
                ),
                None => (400, response.body.to_string()),
            };
            return Err(SynapticError::RemoteService {
                status,
                message: format!("add documents to '{index}': {message}"),
            });
        }

        Ok(())
    }

    /// Batch fetch documents with their tensor facets. Order follows the
    /// service's response.
    async fn get_documents(
        &self,
        index: &str,
        ids: &[String],
    ) -> Result<Vec<Value>, SynapticError> {
        let request = MarqoRequest::new(Method::Get, index_path(index, &["documents"]))
            .with_query("expose_facets", "true")
            .with_body(json!(ids));
        let response = self.send(request).await?;
        if !response.is_success() {
            return Err(remote_error(&format!("get documents from '{index}'"), &response));
        }
        Ok(response.body["results"]
            .as_array()
            .cloned()
            .unwrap_or_default())
    }

    async fn search(
        &self,
        index: &str,
        body: Map<String, Value>,
    ) -> Result<Vec<Value>, SynapticError> {
        let request = MarqoRequest::new(Method::Post, index_path(index, &["search"]))
            .with_body(Value::Object(body));
        let response = self.send(request).await?;
        if !response.is_success() {
            return Err(remote_error(&format!("search '{index}'"), &response));
        }
        Ok(response.body["hits"].as_array().cloned().unwrap_or_default())
    }

    async fn list_ids(
        &self,
        index: &str,
        namespace: Option<&str>,
        limit: usize,
    ) -> Result<Vec<String>, SynapticError> {
        let mut body = Map::new();
        body.insert("q".to_string(), json!(""));
        body.insert("limit".to_string(), json!(limit));
        body.insert("attributesToRetrieve".to_string(), json!(["_id"]));
        if let Some(ns) = namespace {
            body.insert(
                "filter".to_string(),
                json!(equality_filter(&self.config.namespace_field, ns)),
            );
        }

        let hits = self.search(index, body).await?;
        let mut seen = HashSet::new();
        Ok(hits
            .iter()
            .filter_map(|hit| hit["_id"].as_str())
            .filter(|id| seen.insert(id.to_string()))
            .map(str::to_string)
            .collect())
    }

    fn namespace_of(&self, doc: &Value) -> Option<String> {
        doc.get(&self.config.namespace_field)
            .and_then(Value::as_str)
            .map(str::to_string)
    }

    /// Project a fetched document into an [`Entry`]. Documents without an
    /// exposed embedding yield `None`.
    fn to_entry(&self, doc: &Value) -> Option<Entry> {
        let id = doc["_id"].as_str()?.to_string();
        let vector = extract_embedding(doc, &self.config.text_field)?;
        Some(Entry {
            id,
            vector,
            metadata: public_fields(doc),
            namespace: self.namespace_of(doc),
        })
    }

    fn to_query_result(&self, hit: &Value) -> QueryResult {
        QueryResult {
            id: hit["_id"].as_str().unwrap_or_default().to_string(),
            score: hit["_score"].as_f64().unwrap_or(0.0) as f32,
            vector: None,
            metadata: public_fields(hit),
            namespace: self.namespace_of(hit),
        }
    }

    async fn attach_vectors(
        &self,
        index: &str,
        results: &mut [QueryResult],
    ) -> Result<(), SynapticError> {
        let ids: Vec<String> = results.iter().map(|r| r.id.clone()).collect();
        let docs = self.get_documents(index, &ids).await?;

        let vectors: HashMap<&str, Vec<f32>> = docs
            .iter()
            .filter(|doc| doc["_found"].as_bool().unwrap_or(true))
            .filter_map(|doc| {
                let id = doc["_id"].as_str()?;
                Some((id, extract_embedding(doc, &self.config.text_field)?))
            })
            .collect();

        for result in results.iter_mut() {
            result.vector = vectors.get(result.id.as_str()).cloned();
            if result.vector.is_none() {
                tracing::warn!(
                    "MarqoVectorStore: no embedding returned for id={} index={index}",
                    result.id
                );
            }
        }
        Ok(())
    }

    async fn run_query(
        &self,
        index: &str,
        query: &str,
        options: QueryOptions,
        count: usize,
    ) -> Result<Vec<QueryResult>, SynapticError> {
        let mut body = options.extra;
        body.insert("q".to_string(), json!(query));
        body.insert("limit".to_string(), json!(count));
        let attributes = if options.include_metadata {
            json!(["*"])
        } else {
            json!(["_id"])
        };
        body.insert("attributesToRetrieve".to_string(), attributes);
        if let Some(ref ns) = options.namespace {
            body.insert(
                "filter".to_string(),
                json!(equality_filter(&self.config.namespace_field, ns)),
            );
        }

        let hits = self.search(index, body).await?;
        let mut results: Vec<QueryResult> =
            hits.iter().map(|hit| self.to_query_result(hit)).collect();

        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        results.truncate(count);

        if options.include_vectors && !results.is_empty() {
            self.attach_vectors(index, &mut results).await?;
        }

        tracing::debug!(
            "MarqoVectorStore: query index={index} returned {} results",
            results.len()
        );
        Ok(results)
    }

    async fn fetch_entries(
        &self,
        index: &str,
        ids: &[String],
        namespace: Option<&str>,
        deadline: Option<Instant>,
    ) -> Result<Vec<Entry>, SynapticError> {
        let docs = with_deadline(
            deadline,
            &format!("load entries from '{index}'"),
            self.get_documents(index, ids),
        )
        .await?;

        let mut entries = Vec::with_capacity(docs.len());
        for doc in docs {
            if !doc["_found"].as_bool().unwrap_or(false) {
                continue;
            }
            // A document may be re-tagged between the two round trips.
            if namespace.is_some() && self.namespace_of(&doc).as_deref() != namespace {
                continue;
            }
            match self.to_entry(&doc) {
                Some(entry) => entries.push(entry),
                None => tracing::warn!(
                    "MarqoVectorStore: skipping id={} in index={index}: no tensor facets",
                    doc["_id"]
                ),
            }
        }
        Ok(entries)
    }
}

#[async_trait]
impl VectorStoreClient for MarqoVectorStore {
    async fn create_index(
        &self,
        name: &str,
        options: IndexOptions,
    ) -> Result<IndexAck, SynapticError> {
        if options.if_not_exists && self.list_indexes().await?.iter().any(|i| i == name) {
            tracing::debug!("MarqoVectorStore: index '{name}' exists, reusing");
            return Ok(IndexAck {
                index: name.to_string(),
                acknowledged: true,
                created: false,
            });
        }

        let request = MarqoRequest::new(Method::Post, index_path(name, &[]))
            .with_body(Value::Object(options.settings));
        let response = self.send(request).await?;

        if !response.is_success() {
            let code = response.body["code"].as_str().unwrap_or_default();
            let message = message_of(&response.body);
            let exists = response.status == 409 || code == "index_already_exists";
            if exists && options.if_not_exists {
                tracing::debug!("MarqoVectorStore: index '{name}' created concurrently, reusing");
                return Ok(IndexAck {
                    index: name.to_string(),
                    acknowledged: true,
                    created: false,
                });
            }
            return Err(match (response.status, code) {
                (409, _) | (_, "index_already_exists") => {
                    SynapticError::IndexCreation(format!("index '{name}' already exists"))
                }
                (400 | 422, _) => {
                    SynapticError::IndexCreation(format!("index '{name}' rejected: {message}"))
                }
                _ => remote_error(&format!("create index '{name}'"), &response),
            });
        }

        Ok(IndexAck {
            index: response.body["index"]
                .as_str()
                .unwrap_or(name)
                .to_string(),
            acknowledged: response.body["acknowledged"].as_bool().unwrap_or(true),
            created: true,
        })
    }

    async fn delete_index(&self, name: &str) -> Result<(), SynapticError> {
        let request = MarqoRequest::new(Method::Delete, index_path(name, &[]));
        let response = self.send(request).await?;
        if response.is_success() {
            return Ok(());
        }
        let code = response.body["code"].as_str().unwrap_or_default();
        if response.status == 404 || code == "index_not_found" {
            return Err(SynapticError::IndexNotFound(name.to_string()));
        }
        Err(remote_error(&format!("delete index '{name}'"), &response))
    }

    async fn list_indexes(&self) -> Result<Vec<String>, SynapticError> {
        let response = self.send(MarqoRequest::new(Method::Get, "/indexes")).await?;
        if !response.is_success() {
            return Err(remote_error("list indexes", &response));
        }

        let mut names: Vec<String> = response.body["results"]
            .as_array()
            .map(|items| items.iter().filter_map(index_name).collect())
            .unwrap_or_default();
        names.sort();
        names.dedup();
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
        if vector.iter().any(|v| !v.is_finite()) {
            return Err(SynapticError::Validation(
                "vector contains non-finite values".to_string(),
            ));
        }

        let id = options.id.clone().unwrap_or_else(generate_id);
        let mut doc = self.base_document(&id, &options)?;
        doc.insert(self.config.text_field.clone(), json!({ "vector": vector }));

        let mappings = json!({ &self.config.text_field: { "type": "custom_vector" } });
        self.add_document(index, doc, Some(mappings)).await?;
        tracing::debug!("MarqoVectorStore: upserted vector id={id} index={index}");
        Ok(id)
    }

    async fn upsert_text(
        &self,
        index: &str,
        text: &str,
        options: UpsertOptions,
    ) -> Result<String, SynapticError> {
        let id = options.id.clone().unwrap_or_else(generate_id);
        let mut doc = self.base_document(&id, &options)?;
        doc.insert(self.config.text_field.clone(), Value::String(text.to_string()));

        self.add_document(index, doc, None).await?;
        tracing::debug!("MarqoVectorStore: upserted text id={id} index={index}");
        Ok(id)
    }

    async fn upsert_text_artifact(
        &self,
        index: &str,
        artifact: &TextArtifact,
        options: UpsertOptions,
    ) -> Result<String, SynapticError> {
        let mut doc = self.base_document(&artifact.id, &options)?;
        doc.insert(
            self.config.text_field.clone(),
            Value::String(artifact.value.clone()),
        );
        doc.insert(
            self.config.artifact_field.clone(),
            Value::String(artifact.to_json()?),
        );

        self.add_document(index, doc, None).await?;
        tracing::debug!(
            "MarqoVectorStore: upserted artifact id={} index={index}",
            artifact.id
        );
        Ok(artifact.id.clone())
    }

    async fn load_entry(
        &self,
        index: &str,
        id: &str,
        namespace: Option<&str>,
    ) -> Result<Option<Entry>, SynapticError> {
        let request = MarqoRequest::new(Method::Get, index_path(index, &["documents", id]))
            .with_query("expose_facets", "true");
        let response = self.send(request).await?;

        if response.status == 404 {
            if response.body["code"].as_str() == Some("index_not_found") {
                return Err(SynapticError::IndexNotFound(index.to_string()));
            }
            return Ok(None);
        }
        if !response.is_success() {
            return Err(remote_error(
                &format!("get document '{id}' from '{index}'"),
                &response,
            ));
        }

        let entry = self.to_entry(&response.body);
        Ok(entry.filter(|e| namespace.is_none() || e.namespace.as_deref() == namespace))
    }

    async fn load_entries(
        &self,
        index: &str,
        options: ListOptions,
    ) -> Result<Vec<Entry>, SynapticError> {
        let limit = options
            .limit
            .unwrap_or(self.config.max_page_size)
            .min(self.config.max_page_size);
        if limit == 0 {
            return Ok(Vec::new());
        }
        let namespace = options.namespace.as_deref();

        let ids = with_deadline(
            options.deadline,
            &format!("list ids in '{index}'"),
            self.list_ids(index, namespace, limit),
        )
        .await?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let entries = self
            .fetch_entries(index, &ids, namespace, options.deadline)
            .await?;
        tracing::debug!(
            "MarqoVectorStore: loaded {} of {} entries from index={index}",
            entries.len(),
            ids.len()
        );
        Ok(entries)
    }

    async fn query(
        &self,
        index: &str,
        query: &str,
        options: QueryOptions,
    ) -> Result<Vec<QueryResult>, SynapticError> {
        let count = options.count.unwrap_or(self.config.default_query_count);
        if count == 0 {
            return Ok(Vec::new());
        }
        let deadline = options.deadline;
        with_deadline(
            deadline,
            &format!("query '{index}'"),
            self.run_query(index, query, options, count),
        )
        .await
    }

    fn artifact_field(&self) -> &str {
        &self.config.artifact_field
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// `/indexes/{index}/...` with every segment percent-encoded.
fn index_path(index: &str, rest: &[&str]) -> String {
    let mut path = format!("/indexes/{}", urlencoding::encode(index));
    for segment in rest {
        path.push('/');
        path.push_str(&urlencoding::encode(segment));
    }
    path
}

fn generate_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

fn message_of(body: &Value) -> String {
    match body {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other["message"]
            .as_str()
            .map(str::to_string)
            .unwrap_or_else(|| other.to_string()),
    }
}

fn remote_error(operation: &str, response: &MarqoResponse) -> SynapticError {
    SynapticError::RemoteService {
        status: response.status,
        message: format!("{operation}: {}", message_of(&response.body)),
    }
}

/// Accepts both plain names and `{"indexName": ..}` / `{"index_name": ..}`
/// objects, which differ between Marqo releases.
fn index_name(item: &Value) -> Option<String> {
    match item {
        Value::String(s) => Some(s.clone()),
        Value::Object(obj) => obj
            .get("indexName")
            .or_else(|| obj.get("index_name"))
            .and_then(Value::as_str)
            .map(str::to_string),
        _ => None,
    }
}

/// Fields visible to callers: everything not prefixed with `_`.
fn public_fields(doc: &Value) -> HashMap<String, Value> {
    doc.as_object()
        .map(|obj| {
            obj.iter()
                .filter(|(k, _)| !k.starts_with('_'))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect()
        })
        .unwrap_or_default()
}

/// Embedding of the facet for `text_field`, falling back to the first facet.
fn extract_embedding(doc: &Value, text_field: &str) -> Option<Vec<f32>> {
    let facets = doc["_tensor_facets"].as_array()?;
    let facet = facets
        .iter()
        .find(|f| f.get(text_field).is_some())
        .or_else(|| facets.first())?;
    let vector: Vec<f32> = facet["_embedding"]
        .as_array()?
        .iter()
        .filter_map(|v| v.as_f64().map(|x| x as f32))
        .collect();
    if vector.is_empty() {
        None
    } else {
        Some(vector)
    }
}

/// `field:value` filter with Lucene special characters escaped.
fn equality_filter(field: &str, value: &str) -> String {
    const SPECIAL: &[char] = &[
        '\\', '+', '-', '&', '|', '!', '(', ')', '{', '}', '[', ']', '^', '"', '~', '*', '?',
        ':', '/', ' ',
    ];
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if SPECIAL.contains(&c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    format!("{field}:{escaped}")
}
