use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::debug;

use vanet_core::cluster::ClusterKey;
use vanet_settings::{ContextSettings, EvictionKind};

/// How the store forgets entries. Retained entries always suppress exact repeats.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum EvictionPolicy {
    #[default]
    Unbounded,
    /// Keep at most this many entries, dropping the least recently emitted.
    MaxEntries(usize),
    /// Drop entries last emitted longer ago than this.
    MaxAge(Duration),
}

impl From<&ContextSettings> for EvictionPolicy {
    fn from(s: &ContextSettings) -> Self {
        match s.eviction {
            EvictionKind::Unbounded => Self::Unbounded,
            EvictionKind::MaxEntries => Self::MaxEntries(s.max_entries.max(1)),
            EvictionKind::MaxAge => Self::MaxAge(Duration::from_secs(s.max_age_secs)),
        }
    }
}

/// What was last said about one event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextEntry {
    pub last_instruction: String,
    pub last_emitted_at: DateTime<Utc>,
    #[serde(skip)]
    seq: u64,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<ClusterKey, ContextEntry>,
    next_seq: u64,
}

/// Short-term memory of emitted instructions, keyed by event identity.
///
/// Share it with `Arc`; every operation takes the internal lock, so a write
/// is visible to the next read from any thread.
#[derive(Default)]
pub struct ContextStore {
    inner: Mutex<Inner>,
    policy: EvictionPolicy,
}

impl ContextStore {
    pub fn new(policy: EvictionPolicy) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            policy,
        }
    }

    pub fn policy(&self) -> EvictionPolicy {
        self.policy
    }

    /// True only when the last instruction for `key` is exactly `candidate`.
    pub fn should_suppress(&self, key: &ClusterKey, candidate: &str) -> bool {
        let mut inner = self.inner.lock();
        self.purge_expired(&mut inner, Utc::now());
        inner
            .entries
            .get(key)
            .is_some_and(|e| e.last_instruction == candidate)
    }

    pub fn update(&self, key: ClusterKey, instruction: impl Into<String>) {
        self.update_at(key, instruction, Utc::now());
    }

    pub fn update_at(&self, key: ClusterKey, instruction: impl Into<String>, at: DateTime<Utc>) {
        let mut inner = self.inner.lock();
        self.insert(&mut inner, key, instruction.into(), at);
    }

    /// Suppression check and update under one lock. Returns true when
    /// `instruction` repeats the last one for `key`; otherwise records it.
    pub fn check_and_update(&self, key: &ClusterKey, instruction: &str) -> bool {
        let now = Utc::now();
        let mut inner = self.inner.lock();
        self.purge_expired(&mut inner, now);
        if inner
            .entries
            .get(key)
            .is_some_and(|e| e.last_instruction == instruction)
        {
            return true;
        }
        self.insert(&mut inner, key.clone(), instruction.to_string(), now);
        false
    }

    /// Advisory for a richer generator when `key` was recently announced;
    /// empty otherwise.
    pub fn context_hint(&self, key: &ClusterKey) -> String {
        let mut inner = self.inner.lock();
        self.purge_expired(&mut inner, Utc::now());
        if inner.entries.contains_key(key) {
            format!(
                "(Context: You recently warned the driver about this {}. Provide an UPDATE only if status changed.)",
                key.event_type
            )
        } else {
            String::new()
        }
    }

    pub fn entry(&self, key: &ClusterKey) -> Option<ContextEntry> {
        let mut inner = self.inner.lock();
        self.purge_expired(&mut inner, Utc::now());
        inner.entries.get(key).cloned()
    }

    pub fn len(&self) -> usize {
        let mut inner = self.inner.lock();
        self.purge_expired(&mut inner, Utc::now());
        inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.inner.lock().entries.clear();
    }

    fn insert(&self, inner: &mut Inner, key: ClusterKey, instruction: String, at: DateTime<Utc>) {
        self.purge_expired(inner, Utc::now());
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.entries.insert(
            key,
            ContextEntry {
                last_instruction: instruction,
                last_emitted_at: at,
                seq,
            },
        );

        if let EvictionPolicy::MaxEntries(cap) = self.policy {
            while inner.entries.len() > cap {
                let Some(oldest) = inner
                    .entries
                    .iter()
                    .min_by_key(|(_, e)| e.seq)
                    .map(|(k, _)| k.clone())
                else {
                    break;
                };
                inner.entries.remove(&oldest);
                debug!(key = %oldest, "evicted least recently emitted context entry");
            }
        }
    }

    fn purge_expired(&self, inner: &mut Inner, now: DateTime<Utc>) {
        let EvictionPolicy::MaxAge(max_age) = self.policy else {
            return;
        };
        let Ok(max_age) = chrono::Duration::from_std(max_age) else {
            return;
        };
        let before = inner.entries.len();
        inner
            .entries
            .retain(|_, e| now.signed_duration_since(e.last_emitted_at) <= max_age);
        let purged = before - inner.entries.len();
        if purged > 0 {
            debug!(purged, "expired context entries");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use vanet_core::message::EventType;

    fn key(event: EventType, loc: &str) -> ClusterKey {
        ClusterKey::new(event, loc)
    }

    #[test]
    fn suppresses_only_exact_repeat() {
        let store = ContextStore::default();
        let k = key(EventType::Accident, "KM_20");
        assert!(!store.should_suppress(&k, "Slow down."));

        store.update(k.clone(), "Slow down.");
        assert!(store.should_suppress(&k, "Slow down."));
        assert!(!store.should_suppress(&k, "Slow down!"));
        assert!(!store.should_suppress(&key(EventType::Accident, "KM_25"), "Slow down."));
    }

    #[test]
    fn update_overwrites() {
        let store = ContextStore::default();
        let k = key(EventType::Congestion, "KM_10");
        store.update(k.clone(), "first");
        store.update(k.clone(), "second");
        assert_eq!(store.len(), 1);
        assert_eq!(store.entry(&k).unwrap().last_instruction, "second");
        assert!(!store.should_suppress(&k, "first"));
    }

    #[test]
    fn no_time_decay_when_unbounded() {
        let store = ContextStore::default();
        let k = key(EventType::Accident, "KM_20");
        store.update_at(k.clone(), "Stop.", Utc::now() - chrono::Duration::days(30));
        assert!(store.should_suppress(&k, "Stop."));
    }

    #[test]
    fn context_hint_names_event() {
        let store = ContextStore::default();
        let k = key(EventType::SlipperyRoad, "KM_35");
        assert_eq!(store.context_hint(&k), "");
        store.update(k.clone(), "Advisory.");
        assert_eq!(
            store.context_hint(&k),
            "(Context: You recently warned the driver about this Slippery Road. Provide an UPDATE only if status changed.)"
        );
    }

    #[test]
    fn check_and_update_is_atomic_pair() {
        let store = ContextStore::default();
        let k = key(EventType::Accident, "KM_20");
        assert!(!store.check_and_update(&k, "Stop."));
        assert!(store.check_and_update(&k, "Stop."));
        assert!(!store.check_and_update(&k, "Proceed."));
        assert_eq!(store.entry(&k).unwrap().last_instruction, "Proceed.");
    }

    #[test]
    fn max_entries_evicts_least_recently_emitted() {
        let store = ContextStore::new(EvictionPolicy::MaxEntries(2));
        let a = key(EventType::Accident, "KM_1");
        let b = key(EventType::Accident, "KM_2");
        let c = key(EventType::Accident, "KM_3");
        store.update(a.clone(), "a");
        store.update(b.clone(), "b");
        store.update(a.clone(), "a2");
        store.update(c.clone(), "c");

        assert_eq!(store.len(), 2);
        assert!(store.entry(&b).is_none());
        assert!(store.should_suppress(&a, "a2"));
        assert!(store.should_suppress(&c, "c"));
    }

    #[test]
    fn max_age_purges_stale_entries() {
        let store = ContextStore::new(EvictionPolicy::MaxAge(Duration::from_secs(60)));
        let old = key(EventType::Congestion, "KM_10");
        let fresh = key(EventType::Congestion, "KM_15");
        store.update_at(old.clone(), "Traffic.", Utc::now() - chrono::Duration::seconds(120));
        store.update(fresh.clone(), "Traffic.");

        assert!(!store.should_suppress(&old, "Traffic."));
        assert!(store.should_suppress(&fresh, "Traffic."));
        assert_eq!(store.len(), 1);
        assert_eq!(store.context_hint(&old), "");
    }

    #[test]
    fn policy_from_settings() {
        let mut settings = ContextSettings::default();
        assert_eq!(EvictionPolicy::from(&settings), EvictionPolicy::Unbounded);
        settings.eviction = EvictionKind::MaxEntries;
        settings.max_entries = 8;
        assert_eq!(EvictionPolicy::from(&settings), EvictionPolicy::MaxEntries(8));
        settings.eviction = EvictionKind::MaxAge;
        assert_eq!(
            EvictionPolicy::from(&settings),
            EvictionPolicy::MaxAge(Duration::from_secs(300))
        );
    }

    #[test]
    fn clear_and_is_empty() {
        let store = ContextStore::default();
        store.update(key(EventType::Accident, "KM_20"), "x");
        assert!(!store.is_empty());
        store.clear();
        assert!(store.is_empty());
    }

    #[test]
    fn shared_across_threads() {
        let store = Arc::new(ContextStore::default());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let s = store.clone();
                std::thread::spawn(move || {
                    for j in 0..50 {
                        s.update(key(EventType::Congestion, &format!("KM_{i}")), format!("t{j}"));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(store.len(), 8);
        assert!(store.should_suppress(&key(EventType::Congestion, "KM_3"), "t49"));
    }
}
