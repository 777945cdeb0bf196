//! stashkit: TTL-aware caching primitives with pluggable eviction,
//! lifecycle events, and tiered storage.
//!
//! The core engine is [`cache::Cache`]: string keys, one value type per
//! cache, write-time TTLs, and a selectable eviction policy. Around it:
//!
//! - [`loading::LoadingCache`] deduplicates concurrent misses through an
//!   asynchronous loader;
//! - [`namespace::NamespacedCache`] scopes key prefixes into views;
//! - [`tiered::TieredCache`] layers the in-memory cache over a
//!   persistent [`store::Store`];
//! - [`events::EventBus`] broadcasts lifecycle events to subscribers;
//! - [`metrics::Metrics`] records counters and latency percentiles.
//!
//! ## Example
//!
//! ```
//! use std::time::Duration;
//! use stashkit::prelude::*;
//!
//! let cache: Cache<String> = CacheBuilder::new()
//!     .max_entries(1000)
//!     .expire_after_write(Duration::from_secs(60))
//!     .build();
//!
//! cache.set("session::42", "alice".to_string());
//! assert_eq!(cache.get("session::42"), Some("alice".to_string()));
//! ```

pub mod builder;
pub mod cache;
pub mod config;
pub mod entry;
pub mod error;
pub mod events;
mod flight;
pub mod loading;
pub mod metrics;
pub mod namespace;
pub mod policy;
pub mod prelude;
pub mod store;
pub mod tiered;
