//! Metadata backend adapters for the role directory.

#![forbid(unsafe_code)]

mod in_memory_metadata_backend;
mod postgres_metadata_backend;
mod record_attrs;
mod redis_metadata_backend;

pub use in_memory_metadata_backend::InMemoryMetadataBackend;
pub use postgres_metadata_backend::PostgresMetadataBackend;
pub use redis_metadata_backend::RedisMetadataBackend;
