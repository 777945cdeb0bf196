//! Convenience re-exports for common usage.

pub use crate::builder::{CacheBuilder, SyncLoadingCache};
pub use crate::cache::{Cache, CacheStats, PATH_SEPARATOR};
pub use crate::config::{CacheConfig, EvictionPolicyKind, RemovalCause};
pub use crate::entry::Entry;
pub use crate::error::{CacheError, CacheResult};
pub use crate::events::{CacheEvent, CacheEventKind, EventSubscription};
pub use crate::loading::{Loader, LoaderFuture, LoadingCache};
pub use crate::metrics::{LatencySummary, MetricsSnapshot};
pub use crate::namespace::{NamespaceView, NamespacedCache};
pub use crate::store::{FileStore, MemoryStore, Store};
pub use crate::tiered::{TieredCache, TieredCacheConfig};
