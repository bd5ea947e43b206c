//! ID mapping store
//!
//! Source-ID to destination-ID correspondences, scoped per entity kind and
//! per instance pair.

pub mod store;

pub use store::{MappingStore, PutOutcome};
