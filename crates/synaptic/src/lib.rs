//! Synaptic — vector-store clients with a shared, backend-agnostic API.
//!
//! This crate re-exports the Synaptic sub-crates for convenient single-import usage.
//! Enable features to control which backends are available.
//!
//! # Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `default` | `vectorstores` |
//! | `vectorstores` | `InMemoryVectorStore` (local cosine similarity) |
//! | `marqo` | `MarqoVectorStore` (Marqo REST API) |
//! | `full` | All features enabled |
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use synaptic::core::{QueryOptions, UpsertOptions, VectorStoreClient};
//! use synaptic::marqo::{MarqoConfig, MarqoVectorStore};
//! ```

/// Core traits and types: VectorStoreClient, Entry, QueryResult, TextArtifact, SynapticError.
/// Always available.
pub use synaptic_core as core;

/// In-memory VectorStoreClient.
#[cfg(feature = "vectorstores")]
pub use synaptic_vectorstores as vectorstores;

/// Marqo VectorStoreClient and its pluggable HTTP transport.
#[cfg(feature = "marqo")]
pub use synaptic_marqo as marqo;
