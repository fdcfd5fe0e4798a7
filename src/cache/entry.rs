//! Cache entry bookkeeping.

use bytes::Bytes;
use std::time::Duration;
use tokio::time::Instant;

/// A stored value with its TTL and access metadata.
///
/// `access_seq` and `insert_seq` come from a per-store logical clock and
/// break ties between entries stamped with the same `Instant`.
#[derive(Debug, Clone)]
pub(crate) struct CacheEntry {
    pub(crate) value: Bytes,
    pub(crate) created_at: Instant,
    /// `None` when `created_at + ttl` does not fit in an `Instant`.
    pub(crate) expires_at: Option<Instant>,
    pub(crate) access_count: u64,
    pub(crate) last_accessed_at: Instant,
    pub(crate) insert_seq: u64,
    pub(crate) access_seq: u64,
}

impl CacheEntry {
    pub(crate) fn new(value: Bytes, now: Instant, ttl: Duration, seq: u64) -> Self {
        Self {
            value,
            created_at: now,
            expires_at: now.checked_add(ttl),
            access_count: 0,
            last_accessed_at: now,
            insert_seq: seq,
            access_seq: seq,
        }
    }

    /// Logically absent once `now` is past `expires_at`.
    #[inline]
    pub(crate) fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|expires| now > expires)
    }

    #[inline]
    pub(crate) fn touch(&mut self, now: Instant, seq: u64) {
        self.access_count += 1;
        self.last_accessed_at = now;
        self.access_seq = seq;
    }

    #[inline]
    pub(crate) fn size_bytes(&self) -> usize {
        self.value.len()
    }

    pub(crate) fn metadata(&self, now: Instant) -> EntryMetadata {
        EntryMetadata {
            access_count: self.access_count,
            size_bytes: self.size_bytes(),
            age: now.saturating_duration_since(self.created_at),
            idle: now.saturating_duration_since(self.last_accessed_at),
            ttl_remaining: self
                .expires_at
                .map(|expires| expires.saturating_duration_since(now)),
        }
    }
}

/// Read-only view of an entry's bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryMetadata {
    pub access_count: u64,
    pub size_bytes: usize,
    pub age: Duration,
    pub idle: Duration,
    /// `None` for entries whose expiry overflowed the clock.
    pub ttl_remaining: Option<Duration>,
}
