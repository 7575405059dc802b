//! Marqo integration for the Synaptic framework.
//!
//! [`MarqoVectorStore`] implements the
//! [`VectorStoreClient`](synaptic_core::VectorStoreClient) trait using the
//! [Marqo](https://www.marqo.ai/) REST API. Marqo computes embeddings for the
//! configured text field itself, so documents are upserted as plain text and
//! searched with free-text queries.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use synaptic_marqo::{MarqoConfig, MarqoVectorStore, QueryOptions, UpsertOptions, VectorStoreClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = MarqoConfig::new("http://localhost:8882", "my-first-index");
//! let store = MarqoVectorStore::new(config);
//!
//! store
//!     .upsert_text(store.index(), "cats are nice", UpsertOptions::new().with_id("doc1"))
//!     .await?;
//! let _hits = store
//!     .query(store.index(), "nice", QueryOptions::new().with_count(3))
//!     .await?;
//! # Ok(())
//! # }
//! ```
//!
//! The transport is pluggable: pass any [`MarqoBackend`] to
//! [`MarqoVectorStore::with_backend`]. [`FakeBackend`] replays canned
//! responses for tests.

mod backend;
mod vector_store;

pub use backend::{FakeBackend, HttpBackend, MarqoBackend, MarqoRequest, MarqoResponse, Method};
pub use vector_store::{MarqoConfig, MarqoVectorStore};

// Re-export core traits for convenience.
pub use synaptic_core::{
    Entry, IndexAck, IndexOptions, ListOptions, QueryOptions, QueryResult, SynapticError,
    TextArtifact, UpsertOptions, VectorStoreClient,
};
