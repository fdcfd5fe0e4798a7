//! Eviction policies.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::entry::CacheEntry;

/// Which entry to remove when the cache is full.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvictionPolicy {
    /// Least recently used: smallest `lastAccessedAt`.
    #[default]
    Lru,
    /// Least frequently used: smallest `accessCount`.
    Lfu,
    /// First in, first out: smallest `createdAt`.
    Fifo,
}

impl EvictionPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Lru => "lru",
            Self::Lfu => "lfu",
            Self::Fifo => "fifo",
        }
    }

    /// Pick the entry to evict.
    ///
    /// Ties on the policy metric are broken by the store's logical clock:
    /// access order for LRU, insertion order for LFU and FIFO. The result is
    /// independent of `HashMap` iteration order.
    pub(crate) fn select_victim<'a, I>(&self, entries: I) -> Option<&'a str>
    where
        I: Iterator<Item = (&'a String, &'a CacheEntry)>,
    {
        let victim = match self {
            Self::Lru => entries.min_by_key(|(_, e)| (e.last_accessed_at, e.access_seq)),
            Self::Lfu => entries.min_by_key(|(_, e)| (e.access_count, e.insert_seq)),
            Self::Fifo => entries.min_by_key(|(_, e)| (e.created_at, e.insert_seq)),
        };
        victim.map(|(key, _)| key.as_str())
    }
}

impl fmt::Display for EvictionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use std::collections::HashMap;
    use std::time::Duration;
    use tokio::time::Instant;

    fn entries() -> HashMap<String, CacheEntry> {
        let now = Instant::now();
        let ttl = Duration::from_secs(60);
        let mut a = CacheEntry::new(Bytes::from_static(b"a"), now, ttl, 1);
        let b = CacheEntry::new(Bytes::from_static(b"b"), now, ttl, 2);
        let mut c = CacheEntry::new(Bytes::from_static(b"c"), now, ttl, 3);
        // a: touched twice, most recent access; c: touched once
        a.touch(now, 4);
        c.touch(now, 5);
        a.touch(now, 6);
        HashMap::from([("a".to_string(), a), ("b".to_string(), b), ("c".to_string(), c)])
    }

    #[test]
    fn test_policies_pick_expected_victim() {
        let map = entries();
        assert_eq!(EvictionPolicy::Lru.select_victim(map.iter()), Some("b"));
        assert_eq!(EvictionPolicy::Lfu.select_victim(map.iter()), Some("b"));
        assert_eq!(EvictionPolicy::Fifo.select_victim(map.iter()), Some("a"));
    }

    #[test]
    fn test_lfu_ties_break_by_insertion() {
        let mut map = entries();
        map.remove("b");
        // a has 2 accesses, c has 1
        assert_eq!(EvictionPolicy::Lfu.select_victim(map.iter()), Some("c"));
        if let Some(c) = map.get_mut("c") {
            c.access_count = 2;
        }
        assert_eq!(EvictionPolicy::Lfu.select_victim(map.iter()), Some("a"));
    }

    #[test]
    fn test_empty_store_has_no_victim() {
        let map: HashMap<String, CacheEntry> = HashMap::new();
        assert_eq!(EvictionPolicy::Fifo.select_victim(map.iter()), None);
    }
}
