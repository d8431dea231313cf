use std::time::{Duration, Instant};

use dashmap::DashMap;

/// In-process replacement for the memcached instance the site used for
/// anonymous-vote markers and IP posting cooldowns. Values expire lazily
/// on read.
#[derive(Debug, Default)]
pub struct TtlCache {
    entries: DashMap<String, (Instant, String)>,
}

impl TtlCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<String>, ttl: Duration) {
        self.entries
            .insert(key.into(), (Instant::now() + ttl, value.into()));
    }

    pub fn get(&self, key: &str) -> Option<String> {
        // The read guard must be dropped before the expired entry can be
        // removed, so the removal happens outside the match.
        let expired = match self.entries.get(key) {
            Some(entry) if entry.0 > Instant::now() => return Some(entry.1.clone()),
            Some(_) => true,
            None => false,
        };
        if expired {
            self.entries.remove(key);
        }
        None
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Drops every expired entry. Called opportunistically; correctness
    /// only relies on the lazy check in `get`.
    pub fn sweep(&self) {
        let now = Instant::now();
        self.entries.retain(|_, (deadline, _)| *deadline > now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_live_until_the_deadline() {
        let cache = TtlCache::new();
        cache.set("vote:1:1.2.3.4", "up", Duration::from_secs(60));
        assert_eq!(cache.get("vote:1:1.2.3.4").as_deref(), Some("up"));
        assert!(cache.contains("vote:1:1.2.3.4"));
        assert!(!cache.contains("vote:2:1.2.3.4"));
    }

    #[test]
    fn expired_values_disappear() {
        let cache = TtlCache::new();
        cache.set("k", "v", Duration::from_secs(0));
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(cache.get("k"), None);
        cache.set("a", "v", Duration::from_secs(0));
        std::thread::sleep(Duration::from_millis(5));
        cache.sweep();
        assert!(!cache.contains("a"));
    }
}
