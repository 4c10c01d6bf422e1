/// Match snapshot storage and retrieval operations.
pub mod match_store;
/// Persistence model definitions.
pub mod models;
/// Storage abstraction layer shared by the cache and remote backends.
pub mod storage;
