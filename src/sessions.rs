//! Session-Affinity Cache
//!
//! Maps a destination id to its accumulating [`Session`] so successive
//! turns in the same place share history instead of starting cold. Bounded
//! by an LRU policy so long-running deployments cannot grow without limit;
//! sessions die only by displacement, never by age.

use moka::future::Cache;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

use crate::generate::Session;

/// Cache statistics
#[derive(Debug, Clone)]
pub struct SessionStats {
    pub entries: u64,
    pub hits: u64,
    pub misses: u64,
}

/// Bounded session store keyed by destination id
#[derive(Clone)]
pub struct SessionCache {
    cache: Cache<u64, Session>,
    system_prompt: String,
    hits: Arc<AtomicU64>,
    misses: Arc<AtomicU64>,
}

impl SessionCache {
    /// Create a cache holding at most `max_sessions` destinations
    pub fn new(max_sessions: u64, system_prompt: &str) -> Self {
        let cache = Cache::builder().max_capacity(max_sessions).build();

        Self {
            cache,
            system_prompt: system_prompt.to_string(),
            hits: Arc::new(AtomicU64::new(0)),
            misses: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Fetch the session for a destination, creating a cold one on miss.
    ///
    /// The returned value is a clone: extend it, then [`put`] it back once
    /// the exchange completed. Failed generations therefore never leave a
    /// half-written session behind.
    ///
    /// [`put`]: SessionCache::put
    pub async fn get_or_create(&self, key: u64) -> Session {
        if let Some(session) = self.cache.get(&key).await {
            self.hits.fetch_add(1, Ordering::Relaxed);
            debug!("Session hit for destination {}", key);
            return session;
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        debug!("Session miss for destination {}, starting cold", key);
        Session::new(&self.system_prompt)
    }

    /// Store a session wholesale, replacing any prior entry for the key
    pub async fn put(&self, key: u64, session: Session) {
        self.cache.insert(key, session).await;
    }

    /// Drop a destination's session
    pub async fn forget(&self, key: u64) {
        self.cache.invalidate(&key).await;
    }

    /// A fresh, never-cached session carrying the configured system prompt.
    /// Used for direct-message openers, which start a new framing each time.
    pub fn fresh(&self) -> Session {
        Session::new(&self.system_prompt)
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats {
            entries: self.cache.entry_count(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    /// Flush pending cache housekeeping so `entry_count` is exact.
    /// Only meaningful in tests; production code never needs it.
    pub async fn sync(&self) {
        self.cache.run_pending_tasks().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_miss_then_hit() {
        let sessions = SessionCache::new(16, "you are terse");

        let mut session = sessions.get_or_create(7).await;
        assert!(session.is_empty());
        assert_eq!(session.system_prompt(), "you are terse");

        session.push_user("hi");
        session.push_assistant("hello");
        sessions.put(7, session).await;

        let again = sessions.get_or_create(7).await;
        assert_eq!(again.len(), 2);

        let stats = sessions.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[tokio::test]
    async fn test_put_replaces_wholesale() {
        let sessions = SessionCache::new(16, "sys");

        let mut first = sessions.fresh();
        first.push_user("one");
        sessions.put(1, first).await;

        let mut second = sessions.fresh();
        second.push_user("a");
        second.push_assistant("b");
        sessions.put(1, second).await;

        assert_eq!(sessions.get_or_create(1).await.len(), 2);
    }

    #[tokio::test]
    async fn test_lru_bound_evicts() {
        let sessions = SessionCache::new(2, "sys");

        for key in 0..5u64 {
            let mut s = sessions.fresh();
            s.push_user("x");
            sessions.put(key, s).await;
        }
        sessions.sync().await;

        assert!(sessions.stats().entries <= 2);
    }

    #[tokio::test]
    async fn test_forget() {
        let sessions = SessionCache::new(16, "sys");

        let mut s = sessions.fresh();
        s.push_user("x");
        sessions.put(3, s).await;
        sessions.forget(3).await;

        assert!(sessions.get_or_create(3).await.is_empty());
    }

    #[test]
    fn test_fresh_is_uncached() {
        let sessions = SessionCache::new(16, "direct opener");
        let s = sessions.fresh();
        assert!(s.is_empty());
        assert_eq!(s.system_prompt(), "direct opener");
    }
}
