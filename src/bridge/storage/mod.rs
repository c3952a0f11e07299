//! Storage abstractions for the fleet relay.
//!
//! - [`Store`]: the interface handlers depend on
//! - [`MemoryStore`]: lock-free in-process implementation via DashMap
//! - [`CachedStore`]: API-key and relay caches around any store

mod cache;
mod memory;
mod traits;

pub use cache::CachedStore;
pub use memory::{MemoryStore, Seed};
pub use traits::{Store, StoreError};
