use std::{collections::VecDeque, sync::Arc};

use async_trait::async_trait;
use serde_json::Value;
use synaptic_core::SynapticError;
use tokio::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Delete,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MarqoRequest {
    pub method: Method,
    /// Path relative to the service root, e.g. `/indexes/docs/search`.
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl MarqoRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

#[derive(Debug, Clone)]
pub struct MarqoResponse {
    pub status: u16,
    pub body: Value,
}

impl MarqoResponse {
    pub fn ok(body: Value) -> Self {
        Self { status: 200, body }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Transport used by [`MarqoVectorStore`](crate::MarqoVectorStore).
#[async_trait]
pub trait MarqoBackend: Send + Sync {
    async fn send(&self, request: MarqoRequest) -> Result<MarqoResponse, SynapticError>;
}

/// Production backend using reqwest.
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key: None,
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Use a preconfigured reqwest client (timeouts, proxies, TLS).
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    fn url(&self, path: &str) -> String {
        let base = self.base_url.trim_end_matches('/');
        format!("{base}{path}")
    }
}

#[async_trait]
impl MarqoBackend for HttpBackend {
    async fn send(&self, request: MarqoRequest) -> Result<MarqoResponse, SynapticError> {
        let url = self.url(&request.path);
        let mut builder = match request.method {
            Method::Get => self.client.get(&url),
            Method::Post => self.client.post(&url),
            Method::Delete => self.client.delete(&url),
        };
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(ref key) = self.api_key {
            builder = builder.header("x-api-key", key);
        }
        if let Some(ref body) = request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| {
            SynapticError::VectorStore(format!("Marqo request {} failed: {e}", request.path))
        })?;

        let status = response.status().as_u16();
        let text = response.text().await.map_err(|e| {
            SynapticError::VectorStore(format!("failed to read Marqo response: {e}"))
        })?;

        let body = if text.trim().is_empty() {
            Value::Null
        } else {
            match serde_json::from_str(&text) {
                Ok(value) => value,
                // Proxies and gateways answer errors in plain text.
                Err(_) if !(200..300).contains(&status) => Value::String(text),
                Err(e) => {
                    return Err(SynapticError::Parsing(format!(
                        "failed to parse Marqo response JSON: {e}"
                    )))
                }
            }
        };

        Ok(MarqoResponse { status, body })
    }
}

/// Test backend with queued responses. Every request it receives is recorded.
pub struct FakeBackend {
    responses: Arc<Mutex<VecDeque<Result<MarqoResponse, SynapticError>>>>,
    requests: Arc<Mutex<Vec<MarqoRequest>>>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self {
            responses: Arc::new(Mutex::new(VecDeque::new())),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn push_response(&self, response: MarqoResponse) -> &Self {
        self.responses
            .try_lock()
            .expect("not concurrent during setup")
            .push_back(Ok(response));
        self
    }

    pub fn push_error(&self, error: SynapticError) -> &Self {
        self.responses
            .try_lock()
            .expect("not concurrent during setup")
            .push_back(Err(error));
        self
    }

    /// Requests received so far, oldest first.
    pub async fn requests(&self) -> Vec<MarqoRequest> {
        self.requests.lock().await.clone()
    }
}

impl Default for FakeBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MarqoBackend for FakeBackend {
    async fn send(&self, request: MarqoRequest) -> Result<MarqoResponse, SynapticError> {
        self.requests.lock().await.push(request);
        let mut responses = self.responses.lock().await;
        responses
            .pop_front()
            .unwrap_or_else(|| Err(SynapticError::VectorStore("FakeBackend exhausted".to_string())))
    }
}
