//! Response Cache - Local buffer for polled mount answers
//!
//! The ResponseCache holds the last answer to each cacheable query, enabling:
//! - Fewer round-trips for values clients poll many times a second
//! - Per-query staleness tolerance (TTL)
//! - Forced staleness when a write is known to change the answer
//!
//! Freshness is evaluated lazily on read; entries are never evicted.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};

use super::formatter::CommandFormatter;

/// One cached answer
#[derive(Debug, Clone)]
struct CacheEntry {
    /// Maximum age still considered valid
    ttl: Duration,
    /// Last stored response (terminator stripped)
    value: Option<String>,
    /// When the value was stored; `None` once invalidated or never written
    written_at: Option<Instant>,
}

impl CacheEntry {
    fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            value: None,
            written_at: None,
        }
    }

    fn is_fresh(&self, now: Instant) -> bool {
        match self.written_at {
            Some(at) => now.saturating_duration_since(at) <= self.ttl,
            None => false,
        }
    }
}

/// Time-bounded store of responses keyed by framed command
pub struct ResponseCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl ResponseCache {
    /// Create a cache with one empty entry per cacheable query
    pub fn from_formatter(formatter: &CommandFormatter) -> Self {
        let entries = formatter
            .cache_table()
            .map(|(key, ttl)| (key.to_string(), CacheEntry::new(ttl)))
            .collect();
        Self {
            entries: Mutex::new(entries),
        }
    }

    /// Check if answers to this framed command are cached at all
    pub fn is_cacheable(&self, key: &str) -> bool {
        self.entries.lock().contains_key(key)
    }

    /// Get the configured lifetime for a key
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        self.entries.lock().get(key).map(|e| e.ttl)
    }

    /// Get the cached value if it is still fresh
    pub fn lookup(&self, key: &str) -> Option<String> {
        self.lookup_at(key, Instant::now())
    }

    /// Get the cached value if it is fresh at `now`
    pub fn lookup_at(&self, key: &str, now: Instant) -> Option<String> {
        let entries = self.entries.lock();
        let entry = entries.get(key)?;
        if entry.is_fresh(now) {
            entry.value.clone()
        } else {
            None
        }
    }

    /// Store a response, returns false (and does nothing) for uncached keys
    pub fn store(&self, key: &str, value: &str) -> bool {
        self.store_at(key, value, Instant::now())
    }

    /// Store a response as written at `now`
    pub fn store_at(&self, key: &str, value: &str, now: Instant) -> bool {
        let mut entries = self.entries.lock();
        match entries.get_mut(key) {
            Some(entry) => {
                entry.value = Some(value.to_string());
                entry.written_at = Some(now);
                true
            }
            None => false,
        }
    }

    /// Force an entry stale while keeping its value and lifetime
    pub fn invalidate(&self, key: &str) {
        if let Some(entry) = self.entries.lock().get_mut(key) {
            entry.written_at = None;
        }
    }

    /// Number of cacheable keys
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Check if the cache has no cacheable keys
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl std::fmt::Debug for ResponseCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseCache")
            .field("keys", &self.len())
            .finish()
    }
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::from_formatter(&CommandFormatter::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: Duration = Duration::from_millis(1);

    #[test]
    fn test_fresh_until_ttl() {
        let cache = ResponseCache::default();
        let t0 = Instant::now();
        let ttl = cache.ttl("#:GR#").unwrap();

        assert!(cache.store_at("#:GR#", "12:30:00", t0));
        assert_eq!(
            cache.lookup_at("#:GR#", t0 + ttl - EPSILON).as_deref(),
            Some("12:30:00")
        );
        assert_eq!(cache.lookup_at("#:GR#", t0 + ttl), Some("12:30:00".into()));
        assert_eq!(cache.lookup_at("#:GR#", t0 + ttl + EPSILON), None);
    }

    #[test]
    fn test_never_written_is_absent() {
        let cache = ResponseCache::default();
        assert!(cache.is_cacheable("#:GD#"));
        assert_eq!(cache.lookup("#:GD#"), None);
    }

    #[test]
    fn test_store_unknown_key_is_noop() {
        let cache = ResponseCache::default();
        let before = cache.len();
        assert!(!cache.store("#:YV#", "PULSAR V5.70"));
        assert_eq!(cache.lookup("#:YV#"), None);
        assert_eq!(cache.len(), before);
    }

    #[test]
    fn test_invalidate_keeps_metadata() {
        let cache = ResponseCache::default();
        let t0 = Instant::now();
        cache.store_at("#:Gt#", "+46*12", t0);
        cache.invalidate("#:Gt#");

        assert_eq!(cache.lookup_at("#:Gt#", t0), None);
        assert!(cache.is_cacheable("#:Gt#"));
        assert_eq!(cache.ttl("#:Gt#"), Some(Duration::from_secs(60)));

        // A new store makes it fresh again
        cache.store_at("#:Gt#", "+45*00", t0);
        assert_eq!(cache.lookup_at("#:Gt#", t0).as_deref(), Some("+45*00"));
    }

    #[test]
    fn test_invalidate_unknown_key_is_noop() {
        let cache = ResponseCache::default();
        cache.invalidate("#:XX#");
        assert_eq!(cache.len(), ResponseCache::default().len());
    }

    #[test]
    fn test_lookup_before_store_time_is_fresh() {
        // Clock skew between threads must not make an entry look stale
        let cache = ResponseCache::default();
        let t0 = Instant::now() + Duration::from_secs(1);
        cache.store_at("#:GS#", "05:00:00", t0);
        assert!(cache.lookup_at("#:GS#", t0 - EPSILON).is_some());
    }
}
