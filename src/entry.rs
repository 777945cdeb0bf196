//! The cached entry record and its persisted wire form.
//!
//! An [`Entry`] is an immutable (value, created-at, expires-at) triple. TTL
//! math runs on monotonic [`Instant`]s so that wall-clock adjustments never
//! expire or resurrect entries. Persistence converts to wall-clock
//! timestamps at the boundary: the JSON form carries `createdAt` /
//! `expiresAt` as RFC 3339 strings, which is what the file store writes to
//! disk.
//!
//! | Concept | Meaning |
//! |---------|---------|
//! | valid | `expires_at` absent, or now is before it |
//! | permanent | `expires_at` absent |
//! | age | `now - created_at` |
//! | remaining TTL | `max(0, expires_at - now)`, absent when permanent |

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{CacheError, CacheResult};

/// An immutable cached record: a value plus its TTL metadata.
///
/// Entries are replaced wholesale on `set`; the only in-place mutations are
/// the TTL manipulations the cache itself performs (`extend_ttl`,
/// `refresh`).
#[derive(Debug, Clone)]
pub struct Entry<V> {
    value: V,
    created_at: Instant,
    expires_at: Option<Instant>,
}

impl<V> Entry<V> {
    /// Creates an entry that expires `ttl` from now, or never when `ttl` is
    /// absent.
    pub fn new(value: V, ttl: Option<Duration>) -> Self {
        let created_at = Instant::now();
        Entry {
            value,
            created_at,
            expires_at: ttl.map(|ttl| created_at + ttl),
        }
    }

    /// Creates an entry with no expiration.
    pub fn permanent(value: V) -> Self {
        Entry::new(value, None)
    }

    /// Returns the cached value.
    pub fn value(&self) -> &V {
        &self.value
    }

    /// Consumes the entry, returning the cached value.
    pub fn into_value(self) -> V {
        self.value
    }

    /// Monotonic creation time.
    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// Monotonic expiration time, absent for permanent entries.
    pub fn expires_at(&self) -> Option<Instant> {
        self.expires_at
    }

    /// `true` when the entry has no expiration.
    pub fn is_permanent(&self) -> bool {
        self.expires_at.is_none()
    }

    /// `true` while the entry is permanent or its expiration lies in the
    /// future.
    pub fn is_valid(&self) -> bool {
        match self.expires_at {
            Some(expires_at) => Instant::now() < expires_at,
            None => true,
        }
    }

    /// Inverse of [`is_valid`](Self::is_valid).
    pub fn is_expired(&self) -> bool {
        !self.is_valid()
    }

    /// Time elapsed since creation.
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Time left before expiration, saturating at zero. Absent for
    /// permanent entries.
    pub fn ttl_remaining(&self) -> Option<Duration> {
        self.expires_at
            .map(|expires_at| expires_at.saturating_duration_since(Instant::now()))
    }

    /// Extends the TTL by `additional`. A permanent entry becomes timed,
    /// expiring `additional` from now.
    pub(crate) fn extend_ttl(&mut self, additional: Duration) {
        self.expires_at = Some(match self.expires_at {
            Some(expires_at) => expires_at + additional,
            None => Instant::now() + additional,
        });
    }
}

impl<V: Serialize + Clone> Entry<V> {
    /// Serializes the entry to its persisted JSON form.
    pub fn to_json(&self) -> CacheResult<String> {
        let persisted = PersistedEntry::from_entry(self);
        serde_json::to_string(&persisted).map_err(CacheError::corrupt)
    }
}

impl<V: DeserializeOwned> Entry<V> {
    /// Rebuilds an entry from its persisted JSON form.
    pub fn from_json(json: &str) -> CacheResult<Self> {
        let persisted: PersistedEntry<V> =
            serde_json::from_str(json).map_err(CacheError::corrupt)?;
        Ok(persisted.into_entry())
    }
}

/// Wall-clock form of an [`Entry`], as written to disk by the file store.
#[derive(Debug, Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PersistedEntry<V> {
    pub(crate) value: V,
    pub(crate) created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) expires_at: Option<DateTime<Utc>>,
}

impl<V> PersistedEntry<V> {
    pub(crate) fn from_entry(entry: &Entry<V>) -> Self
    where
        V: Clone,
    {
        let now_mono = Instant::now();
        let now_wall = Utc::now();
        PersistedEntry {
            value: entry.value.clone(),
            created_at: wall_clock_of(entry.created_at, now_mono, now_wall),
            expires_at: entry
                .expires_at
                .map(|at| wall_clock_of(at, now_mono, now_wall)),
        }
    }

    pub(crate) fn into_entry(self) -> Entry<V> {
        let now_mono = Instant::now();
        let now_wall = Utc::now();
        Entry {
            value: self.value,
            created_at: monotonic_of(self.created_at, now_mono, now_wall),
            expires_at: self
                .expires_at
                .map(|at| monotonic_of(at, now_mono, now_wall)),
        }
    }
}

/// Far-future stand-in when a horizon overflows the clock types. A
/// century out is indistinguishable from "never" for cache purposes.
const DISTANT_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

fn wall_clock_of(at: Instant, now_mono: Instant, now_wall: DateTime<Utc>) -> DateTime<Utc> {
    if at >= now_mono {
        now_wall
            .checked_add_signed(to_chrono(at - now_mono))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    } else {
        now_wall
            .checked_sub_signed(to_chrono(now_mono - at))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

fn monotonic_of(at: DateTime<Utc>, now_mono: Instant, now_wall: DateTime<Utc>) -> Instant {
    if at >= now_wall {
        let ahead = (at - now_wall).to_std().unwrap_or(DISTANT_FUTURE);
        now_mono
            .checked_add(ahead)
            .unwrap_or(now_mono + DISTANT_FUTURE)
    } else {
        let behind = (now_wall - at).to_std().unwrap_or(Duration::ZERO);
        now_mono.checked_sub(behind).unwrap_or(now_mono)
    }
}

fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::MAX)
}
