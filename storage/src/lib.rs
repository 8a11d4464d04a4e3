//! # Storage Layer
//!
//! Client-side persistence for the terminal (the `localStorage` of a tab):
//! - [`StorageBackend`] with in-memory, file and disabled implementations
//! - [`CacheStore`], a namespaced cache with per-entry TTL that degrades to a
//!   no-op when the backend fails
//! - [`purge_storage`] for logout

pub mod backend;
pub mod cache;
pub mod file;
pub mod memory;

pub use backend::{DisabledStorage, StorageBackend, StorageEvent, StorageEvents};
pub use cache::{CacheEntry, CacheStore, DEFAULT_NAMESPACE, purge_storage};
pub use file::FileStorage;
pub use memory::MemoryStorage;
