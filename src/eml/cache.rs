// In-process result cache keyed by election id. Entries expire lazily: an
// entry older than the TTL is evicted by the next lookup that touches it.

use log::debug;

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::eml::model::Election;

pub const DEFAULT_TTL_HOURS: u64 = 1;

struct CacheEntry {
    election: Election,
    loaded_at: Instant,
}

/// A mutex-guarded map of parsed elections. Lookups hand out clones, so a
/// cached aggregate is only refreshed by an explicit `put`. Concurrent
/// writers for the same id are last-writer-wins.
pub struct ResultCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    ttl: Duration,
}

impl ResultCache {
    pub fn new() -> ResultCache {
        ResultCache::with_ttl(Duration::from_secs(DEFAULT_TTL_HOURS * 3600))
    }

    pub fn with_ttl(ttl: Duration) -> ResultCache {
        ResultCache {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// The cached election, if present and not expired. An expired entry is
    /// removed on the spot.
    pub fn get(&self, election_id: &str) -> Option<Election> {
        let key = election_id.trim();
        let mut entries = self.entries.lock().ok()?;
        let expired = match entries.get(key) {
            Some(entry) if entry.loaded_at.elapsed() > self.ttl => true,
            Some(entry) => return Some(entry.election.clone()),
            None => return None,
        };
        if expired {
            debug!("cache entry for {} expired, evicting", key);
            entries.remove(key);
        }
        None
    }

    pub fn put(&self, election_id: &str, election: Election) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(
                election_id.trim().to_string(),
                CacheEntry {
                    election,
                    loaded_at: Instant::now(),
                },
            );
        }
    }

    pub fn evict(&self, election_id: &str) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.remove(election_id.trim());
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ResultCache {
    fn default() -> Self {
        ResultCache::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_returns_fresh_entries() {
        let cache = ResultCache::new();
        cache.put("TK2023", Election::new("TK2023"));

        let hit = cache.get("TK2023");
        assert!(hit.is_some());
        assert_eq!(hit.unwrap().id(), "TK2023");
        assert!(cache.get("TK2021").is_none());
    }

    #[test]
    fn keys_are_trimmed() {
        let cache = ResultCache::new();
        cache.put(" TK2023 ", Election::new("TK2023"));
        assert!(cache.get("TK2023").is_some());
        assert!(cache.get("  TK2023").is_some());
    }

    #[test]
    fn expired_entries_are_evicted_on_lookup() {
        // A zero TTL expires an entry as soon as any time has elapsed, so
        // no clock manipulation is needed.
        let cache = ResultCache::with_ttl(Duration::ZERO);
        cache.put("TK2023", Election::new("TK2023"));
        std::thread::sleep(Duration::from_millis(5));

        assert!(cache.get("TK2023").is_none());
        // The miss removed the entry, not just hid it.
        assert!(cache.is_empty());
    }

    #[test]
    fn entries_within_ttl_survive() {
        let cache = ResultCache::with_ttl(Duration::from_secs(3600));
        cache.put("TK2023", Election::new("TK2023"));
        assert!(cache.get("TK2023").is_some());
    }

    #[test]
    fn put_replaces_previous_entry() {
        let cache = ResultCache::new();
        cache.put("TK2023", Election::new("TK2023"));

        let mut richer = Election::new("TK2023");
        richer.add_party(crate::eml::model::Party::new("P1", "Party One"));
        cache.put("TK2023", richer);

        let hit = cache.get("TK2023").unwrap();
        assert_eq!(hit.parties().len(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn evict_removes_entry() {
        let cache = ResultCache::new();
        cache.put("TK2023", Election::new("TK2023"));
        cache.evict("TK2023");
        assert!(cache.get("TK2023").is_none());
    }
}
