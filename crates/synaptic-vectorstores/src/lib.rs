mod in_memory;

pub use in_memory::InMemoryVectorStore;

// Re-export core traits/types for convenience
pub use synaptic_core::{
    Embeddings, Entry, IndexAck, IndexOptions, ListOptions, QueryOptions, QueryResult,
    SynapticError, TextArtifact, UpsertOptions, VectorStoreClient,
};
