//! External system integrations for dashclone.
//!
//! - [`instance`] - The `InstanceClient` trait the copy engine talks to
//! - [`metabase`] - Metabase HTTP implementation
//! - [`memory`] - In-memory implementation for tests and rehearsals
//! - [`cache`] - Durable storage for the ID mapping cache
//!
//! # Design Pattern
//!
//! Adapters isolate external dependencies behind traits so the copy engine
//! can be exercised against in-memory implementations.

pub mod cache;
pub mod instance;
pub mod memory;
pub mod metabase;

pub use cache::{FileMappingStorage, MappingSnapshot, MappingStorage, MemoryMappingStorage};
pub use instance::{
    Created, DatabaseMetadata, FieldMetadata, InstanceClient, InstanceResult, ListedEntity,
    RootFilter, TableMetadata,
};
pub use memory::MemoryInstance;
pub use metabase::MetabaseClient;
