use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Mutex;

use lru::LruCache;
use tokio::sync::watch;

use super::{ContextResult, Fingerprint};

#[derive(Clone)]
struct CacheEntry {
    result: ContextResult,
    created_at: i64,
}

/// Which role a caller plays for a fingerprint that isn't cached yet:
/// the first caller builds (`Leader`), everyone else waits on a `watch`
/// receiver (`Follower`) rather than racing a duplicate build (§5:
/// "at-most-one concurrent build per fingerprint").
///
/// `watch` is used instead of `Notify::notify_waiters` because the latter
/// only wakes callers already parked inside `.notified()` at the moment it
/// fires; a follower that claims its slot but hasn't yet started waiting
/// would miss the wakeup and hang forever. `watch` records the completion
/// in the channel itself, so a receiver cloned before the leader finishes
/// always observes it on its first `.changed().await`, no matter when that
/// await actually starts.
pub(crate) enum BuildSlot {
    Leader(watch::Sender<bool>),
    Follower(watch::Receiver<bool>),
}

pub struct ContextCache {
    entries: Mutex<LruCache<Fingerprint, CacheEntry>>,
    in_flight: Mutex<HashMap<Fingerprint, watch::Receiver<bool>>>,
    ttl_secs: i64,
}

impl ContextCache {
    pub fn new(max_entries: usize, ttl_secs: i64) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(NonZeroUsize::new(max_entries.max(1)).unwrap())),
            in_flight: Mutex::new(HashMap::new()),
            ttl_secs,
        }
    }

    pub(crate) fn get(&self, fingerprint: &Fingerprint, now: i64) -> Option<ContextResult> {
        let mut entries = self.entries.lock().unwrap();
        if let Some(entry) = entries.get(fingerprint) {
            if now - entry.created_at <= self.ttl_secs {
                return Some(entry.result.clone());
            }
        }
        entries.pop(fingerprint);
        None
    }

    pub(crate) fn insert(&self, fingerprint: Fingerprint, result: ContextResult, now: i64) {
        self.entries.lock().unwrap().put(fingerprint, CacheEntry { result, created_at: now });
    }

    /// Clears every cached entry; `resetCache` in §6's tool surface.
    pub fn reset(&self) {
        self.entries.lock().unwrap().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub(crate) fn claim_build(&self, fingerprint: &Fingerprint) -> BuildSlot {
        let mut in_flight = self.in_flight.lock().unwrap();
        if let Some(rx) = in_flight.get(fingerprint) {
            BuildSlot::Follower(rx.clone())
        } else {
            let (tx, rx) = watch::channel(false);
            in_flight.insert(fingerprint.clone(), rx);
            BuildSlot::Leader(tx)
        }
    }

    pub(crate) fn finish_build(&self, fingerprint: &Fingerprint, tx: watch::Sender<bool>) {
        self.in_flight.lock().unwrap().remove(fingerprint);
        let _ = tx.send(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(tag: &str) -> ContextResult {
        ContextResult { context: tag.to_string(), ..ContextResult::default() }
    }

    #[test]
    fn expired_entry_is_evicted_on_get() {
        let cache = ContextCache::new(8, 60);
        cache.insert("fp".to_string(), result("a"), 0);
        assert!(cache.get(&"fp".to_string(), 30).is_some());
        assert!(cache.get(&"fp".to_string(), 1000).is_none());
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn reset_clears_all_entries() {
        let cache = ContextCache::new(8, 60);
        cache.insert("a".to_string(), result("a"), 0);
        cache.insert("b".to_string(), result("b"), 0);
        cache.reset();
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn second_claim_for_same_fingerprint_becomes_follower() {
        let cache = ContextCache::new(8, 60);
        let first = cache.claim_build(&"fp".to_string());
        assert!(matches!(first, BuildSlot::Leader(_)));
        let second = cache.claim_build(&"fp".to_string());
        assert!(matches!(second, BuildSlot::Follower(_)));
        if let BuildSlot::Leader(tx) = first {
            cache.finish_build(&"fp".to_string(), tx);
        }
        let third = cache.claim_build(&"fp".to_string());
        assert!(matches!(third, BuildSlot::Leader(_)));
    }

    /// Regression test for the lost-wakeup window: the leader finishes and
    /// sends completion before the follower ever polls `.changed()`. With
    /// `Notify::notify_waiters` this hangs; `watch` must still observe it.
    #[tokio::test]
    async fn follower_sees_completion_even_if_leader_finishes_first() {
        let cache = ContextCache::new(8, 60);
        let fp = "fp".to_string();

        let leader = cache.claim_build(&fp);
        let follower = cache.claim_build(&fp);
        let tx = match leader {
            BuildSlot::Leader(tx) => tx,
            BuildSlot::Follower(_) => panic!("expected leader"),
        };
        let mut rx = match follower {
            BuildSlot::Follower(rx) => rx,
            BuildSlot::Leader(_) => panic!("expected follower"),
        };

        cache.insert(fp.clone(), result("done"), 0);
        cache.finish_build(&fp, tx);

        tokio::time::timeout(std::time::Duration::from_secs(1), rx.changed())
            .await
            .expect("follower must not hang once the leader has already finished")
            .ok();

        assert_eq!(cache.get(&fp, 0).map(|r| r.context), Some("done".to_string()));
    }
}
