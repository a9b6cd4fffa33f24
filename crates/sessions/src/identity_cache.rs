//! Identity Resolver's bearer-token → `Caller` cache.
//!
//! Tokens are never stored in plaintext; the cache is keyed by the SHA-256
//! hex digest of the token and refreshed on a short TTL from the persistence
//! layer so an admin flag flip takes effect without a restart.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use ck_domain::model::Caller;

pub struct IdentityCache {
    entries: HashMap<String, Caller>,
    refreshed_at: Instant,
    ttl: Duration,
}

impl IdentityCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            refreshed_at: Instant::now() - ttl,
            ttl,
        }
    }

    pub fn lookup(&self, token_digest: &str) -> Option<Caller> {
        self.entries.get(token_digest).cloned()
    }

    pub fn is_stale(&self) -> bool {
        self.refreshed_at.elapsed() >= self.ttl
    }

    pub fn replace(&mut self, entries: HashMap<String, Caller>) {
        self.entries = entries;
        self.refreshed_at = Instant::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stale_immediately_when_never_refreshed() {
        let cache = IdentityCache::new(Duration::from_secs(30));
        assert!(cache.is_stale());
    }

    #[test]
    fn lookup_after_refresh() {
        let mut cache = IdentityCache::new(Duration::from_secs(30));
        let mut entries = HashMap::new();
        entries.insert("deadbeef".to_string(), Caller::anonymous("u1"));
        cache.replace(entries);
        assert!(!cache.is_stale());
        assert_eq!(cache.lookup("deadbeef").unwrap().id, "u1");
        assert!(cache.lookup("missing").is_none());
    }
}
