//! Watchlist and continue-watching tracking for cineflow.
//!
//! Both collections are persisted through a [`KeyValueStore`] as JSON arrays.
//! Every operation reads the whole collection, changes it and writes it back.
//! Mutations within one process are serialized; two processes sharing one
//! data directory are last-writer-wins.
//!
//! Storage problems never reach the caller: an unreadable or corrupt
//! collection reads as empty, and a rejected write is logged and dropped.

use crate::storage::{CONTINUE_WATCHING_KEY, KeyValueStore, WATCHLIST_KEY};
use crate::types::{ContinueWatchingEntry, MediaType, TitleKey, WatchlistEntry};
use log::{debug, warn};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::broadcast;

/// Capacity of the change-notification channel. Slow observers only lose
/// notifications, which is harmless since they re-query anyway.
const NOTIFY_CAPACITY: usize = 16;

/// Source of `lastWatchedAt` timestamps.
pub trait Clock: Send + Sync {
    /// Milliseconds since the Unix epoch.
    fn now_millis(&self) -> u64;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }
}

/// Entries that carry a [`TitleKey`].
trait Keyed {
    fn key(&self) -> TitleKey;
}

impl Keyed for WatchlistEntry {
    fn key(&self) -> TitleKey {
        WatchlistEntry::key(self)
    }
}

impl Keyed for ContinueWatchingEntry {
    fn key(&self) -> TitleKey {
        ContinueWatchingEntry::key(self)
    }
}

/// A collection keyed by `(id, media_type)` that remembers insertion order.
///
/// Duplicate keys in the serialized form collapse to the last occurrence.
struct KeyedCollection<T> {
    order: Vec<TitleKey>,
    entries: HashMap<TitleKey, T>,
}

impl<T: Keyed> KeyedCollection<T> {
    fn from_entries(items: Vec<T>) -> Self {
        let mut collection = Self {
            order: Vec::with_capacity(items.len()),
            entries: HashMap::with_capacity(items.len()),
        };
        for item in items {
            collection.upsert(item);
        }
        collection
    }

    fn contains(&self, key: &TitleKey) -> bool {
        self.entries.contains_key(key)
    }

    fn get(&self, key: &TitleKey) -> Option<&T> {
        self.entries.get(key)
    }

    /// Replace in place, or append a new key.
    fn upsert(&mut self, item: T) {
        let key = item.key();
        if self.entries.insert(key, item).is_none() {
            self.order.push(key);
        }
    }

    fn remove(&mut self, key: &TitleKey) -> Option<T> {
        let removed = self.entries.remove(key)?;
        self.order.retain(|k| k != key);
        Some(removed)
    }

    fn into_entries(mut self) -> Vec<T> {
        self.order
            .iter()
            .filter_map(|key| self.entries.remove(key))
            .collect()
    }
}

/// Persisted watchlist and continue-watching positions.
pub struct WatchState<S> {
    store: S,
    clock: Box<dyn Clock>,
    changes: broadcast::Sender<()>,
    // Held across load, modify and persist.
    write_lock: Mutex<()>,
}

impl<S: KeyValueStore> WatchState<S> {
    /// Create a store over `store` using wall-clock timestamps.
    pub fn new(store: S) -> Self {
        Self::with_clock(store, SystemClock)
    }

    pub fn with_clock(store: S, clock: impl Clock + 'static) -> Self {
        let (changes, _) = broadcast::channel(NOTIFY_CAPACITY);
        Self {
            store,
            clock: Box::new(clock),
            changes,
            write_lock: Mutex::new(()),
        }
    }

    /// The underlying key-value store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Receive a `()` after every mutation. Observers re-query state.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.changes.subscribe()
    }

    /// Check whether a title is on the watchlist.
    pub fn is_in_watchlist(&self, id: u64, media_type: MediaType) -> bool {
        self.load_watchlist()
            .contains(&TitleKey::new(id, media_type))
    }

    /// Add a title to the watchlist. Adding a title twice is a no-op.
    pub fn add_to_watchlist(&self, entry: WatchlistEntry) {
        let _guard = self.write_guard();
        let mut watchlist = self.load_watchlist();
        if watchlist.contains(&entry.key()) {
            debug!("{} {} already in watchlist", entry.media_type, entry.id);
            return;
        }

        debug!("Adding {} {} to watchlist", entry.media_type, entry.id);
        watchlist.upsert(entry);
        self.persist(WATCHLIST_KEY, watchlist);
        self.notify();
    }

    /// Remove a title from the watchlist if present.
    pub fn remove_from_watchlist(&self, id: u64, media_type: MediaType) {
        let _guard = self.write_guard();
        let mut watchlist = self.load_watchlist();
        if watchlist.remove(&TitleKey::new(id, media_type)).is_none() {
            return;
        }

        debug!("Removed {} {} from watchlist", media_type, id);
        self.persist(WATCHLIST_KEY, watchlist);
        self.notify();
    }

    /// All watchlist entries in the order they were added.
    pub fn get_watchlist(&self) -> Vec<WatchlistEntry> {
        self.load_watchlist().into_entries()
    }

    /// Record a playback position, replacing any earlier one for the title.
    ///
    /// `last_watched_at` on the argument is ignored; the store stamps it.
    pub fn add_to_continue_watching(&self, mut entry: ContinueWatchingEntry) {
        let _guard = self.write_guard();
        let mut positions = self.load_continue_watching();
        let now = self.clock.now_millis();

        // Never move a title's timestamp backwards if the clock does.
        let previous = positions
            .get(&entry.key())
            .map(|e| e.last_watched_at)
            .unwrap_or(0);
        entry.last_watched_at = now.max(previous);

        debug!(
            "Continue watching {} {} at {:?}/{:?}",
            entry.media_type, entry.id, entry.season, entry.episode
        );
        positions.upsert(entry);
        self.persist(CONTINUE_WATCHING_KEY, positions);
        self.notify();
    }

    /// Positions ordered by `last_watched_at`, most recent first.
    pub fn get_continue_watching(&self) -> Vec<ContinueWatchingEntry> {
        let mut positions = self.load_continue_watching().into_entries();
        positions.sort_by(|a, b| b.last_watched_at.cmp(&a.last_watched_at));
        positions
    }

    /// The stored position for one title.
    pub fn continue_watching_for(
        &self,
        id: u64,
        media_type: MediaType,
    ) -> Option<ContinueWatchingEntry> {
        self.load_continue_watching()
            .get(&TitleKey::new(id, media_type))
            .cloned()
    }

    fn write_guard(&self) -> MutexGuard<'_, ()> {
        // The guarded data is in the store, so a poisoned lock is still usable.
        match self.write_lock.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn load_watchlist(&self) -> KeyedCollection<WatchlistEntry> {
        KeyedCollection::from_entries(self.load(WATCHLIST_KEY))
    }

    fn load_continue_watching(&self) -> KeyedCollection<ContinueWatchingEntry> {
        KeyedCollection::from_entries(self.load(CONTINUE_WATCHING_KEY))
    }

    fn load<T: DeserializeOwned>(&self, key: &str) -> Vec<T> {
        let Some(raw) = self.store.get(key) else {
            return Vec::new();
        };

        match serde_json::from_str(&raw) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Ignoring corrupt '{}' data: {}", key, e);
                Vec::new()
            }
        }
    }

    fn persist<T: Keyed + Serialize>(&self, key: &str, collection: KeyedCollection<T>) {
        let entries = collection.into_entries();
        let json = match serde_json::to_string(&entries) {
            Ok(json) => json,
            Err(e) => {
                warn!("Could not serialize '{}': {}", key, e);
                return;
            }
        };

        if let Err(e) = self.store.set(key, &json) {
            warn!("Could not save '{}', change will not survive a restart: {}", key, e);
        }
    }

    fn notify(&self) {
        // No receivers is fine.
        let _ = self.changes.send(());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU64, Ordering};

    /// Clock that advances only when told to.
    #[derive(Clone, Default)]
    struct ManualClock(Arc<AtomicU64>);

    impl ManualClock {
        fn set(&self, millis: u64) {
            self.0.store(millis, Ordering::SeqCst);
        }
    }

    impl Clock for ManualClock {
        fn now_millis(&self) -> u64 {
            self.0.load(Ordering::SeqCst)
        }
    }

    fn fight_club() -> WatchlistEntry {
        WatchlistEntry {
            id: 550,
            media_type: MediaType::Movie,
            title: "Fight Club".to_string(),
            poster: "/p.jpg".to_string(),
        }
    }

    fn state_with_clock() -> (WatchState<MemoryStore>, ManualClock) {
        let clock = ManualClock::default();
        (WatchState::with_clock(MemoryStore::new(), clock.clone()), clock)
    }

    #[test]
    fn test_new_state_is_empty() {
        let state = WatchState::new(MemoryStore::new());
        assert!(state.get_watchlist().is_empty());
        assert!(state.get_continue_watching().is_empty());
        assert!(!state.is_in_watchlist(550, MediaType::Movie));
    }

    #[test]
    fn test_add_and_remove_watchlist() {
        let state = WatchState::new(MemoryStore::new());
        state.add_to_watchlist(fight_club());
        assert!(state.is_in_watchlist(550, MediaType::Movie));
        assert!(!state.is_in_watchlist(550, MediaType::Tv));

        state.remove_from_watchlist(550, MediaType::Movie);
        assert!(!state.is_in_watchlist(550, MediaType::Movie));
    }

    #[test]
    fn test_add_to_watchlist_is_idempotent() {
        let state = WatchState::new(MemoryStore::new());
        state.add_to_watchlist(fight_club());
        state.add_to_watchlist(fight_club());
        assert_eq!(state.get_watchlist().len(), 1);
    }

    #[test]
    fn test_same_id_different_media_type_are_distinct() {
        let state = WatchState::new(MemoryStore::new());
        state.add_to_watchlist(fight_club());
        state.add_to_watchlist(WatchlistEntry {
            media_type: MediaType::Tv,
            ..fight_club()
        });
        assert_eq!(state.get_watchlist().len(), 2);
    }

    #[test]
    fn test_remove_absent_is_noop() {
        let state = WatchState::new(MemoryStore::new());
        let mut rx = state.subscribe();
        state.remove_from_watchlist(1, MediaType::Movie);
        assert!(rx.try_recv().is_err());
        assert!(state.store().get(WATCHLIST_KEY).is_none());
    }

    #[test]
    fn test_watchlist_keeps_insertion_order() {
        let state = WatchState::new(MemoryStore::new());
        for id in [3, 1, 2] {
            state.add_to_watchlist(WatchlistEntry { id, ..fight_club() });
        }
        state.remove_from_watchlist(1, MediaType::Movie);
        let ids: Vec<u64> = state.get_watchlist().iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![3, 2]);
    }

    #[test]
    fn test_continue_watching_upserts() {
        let (state, clock) = state_with_clock();
        clock.set(1_000);
        state.add_to_continue_watching(ContinueWatchingEntry::episode(1399, "GoT", "", 1, 1));
        clock.set(2_000);
        state.add_to_continue_watching(ContinueWatchingEntry::episode(1399, "GoT", "", 1, 2));

        let positions = state.get_continue_watching();
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].episode, Some(2));
        assert_eq!(positions[0].last_watched_at, 2_000);
    }

    #[test]
    fn test_continue_watching_timestamp_never_decreases() {
        let (state, clock) = state_with_clock();
        clock.set(5_000);
        state.add_to_continue_watching(ContinueWatchingEntry::episode(1399, "GoT", "", 1, 1));
        clock.set(4_000);
        state.add_to_continue_watching(ContinueWatchingEntry::episode(1399, "GoT", "", 1, 2));

        let entry = state.continue_watching_for(1399, MediaType::Tv).unwrap();
        assert_eq!(entry.episode, Some(2));
        assert_eq!(entry.last_watched_at, 5_000);
    }

    #[test]
    fn test_continue_watching_most_recent_first() {
        let (state, clock) = state_with_clock();
        clock.set(100);
        state.add_to_continue_watching(ContinueWatchingEntry::movie(1, "A", ""));
        clock.set(200);
        state.add_to_continue_watching(ContinueWatchingEntry::movie(2, "B", ""));
        clock.set(300);
        state.add_to_continue_watching(ContinueWatchingEntry::movie(3, "C", ""));
        clock.set(400);
        // Upserting an old entry moves it to the front without reordering storage.
        state.add_to_continue_watching(ContinueWatchingEntry::movie(1, "A", ""));

        let ids: Vec<u64> = state.get_continue_watching().iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![1, 3, 2]);
    }

    #[test]
    fn test_corrupt_storage_reads_empty() {
        let store = MemoryStore::new()
            .with_value(WATCHLIST_KEY, "{not json")
            .with_value(CONTINUE_WATCHING_KEY, "42");
        let state = WatchState::new(store);

        assert!(!state.is_in_watchlist(550, MediaType::Movie));
        assert!(state.get_continue_watching().is_empty());

        // A write replaces the corrupt value with a valid collection.
        state.add_to_watchlist(fight_club());
        assert!(state.is_in_watchlist(550, MediaType::Movie));
    }

    #[test]
    fn test_duplicate_keys_in_storage_collapse() {
        let raw = r#"[
            {"id":1399,"mediaType":"tv","title":"GoT","poster":"","season":1,"episode":1,"lastWatchedAt":10},
            {"id":1399,"mediaType":"tv","title":"GoT","poster":"","season":2,"episode":5,"lastWatchedAt":20}
        ]"#;
        let state = WatchState::new(MemoryStore::new().with_value(CONTINUE_WATCHING_KEY, raw));
        let positions = state.get_continue_watching();
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].season, Some(2));
    }

    #[test]
    fn test_failed_write_is_swallowed_and_still_notifies() {
        let state = WatchState::new(MemoryStore::failing_writes());
        let mut rx = state.subscribe();

        state.add_to_watchlist(fight_club());
        state.add_to_continue_watching(ContinueWatchingEntry::movie(550, "Fight Club", ""));

        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_ok());
        assert!(!state.is_in_watchlist(550, MediaType::Movie));
    }

    #[test]
    fn test_each_mutation_notifies_once() {
        let state = WatchState::new(MemoryStore::new());
        let mut rx = state.subscribe();

        state.add_to_watchlist(fight_club());
        state.add_to_watchlist(fight_club());
        state.remove_from_watchlist(550, MediaType::Movie);

        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    /// Store whose reads take long enough for writers to overlap.
    struct SlowReads(MemoryStore);

    impl KeyValueStore for SlowReads {
        fn get(&self, key: &str) -> Option<String> {
            std::thread::sleep(std::time::Duration::from_millis(20));
            self.0.get(key)
        }

        fn set(&self, key: &str, value: &str) -> crate::error::Result<()> {
            self.0.set(key, value)
        }
    }

    #[test]
    fn test_concurrent_upserts_keep_every_title() {
        let state = Arc::new(WatchState::new(SlowReads(MemoryStore::new())));

        let writers: Vec<_> = (1..=4u64)
            .map(|id| {
                let state = Arc::clone(&state);
                std::thread::spawn(move || {
                    state.add_to_continue_watching(ContinueWatchingEntry::movie(
                        id,
                        &format!("Movie {}", id),
                        "",
                    ));
                    state.add_to_watchlist(WatchlistEntry {
                        id,
                        media_type: MediaType::Movie,
                        title: format!("Movie {}", id),
                        poster: String::new(),
                    });
                })
            })
            .collect();
        for writer in writers {
            writer.join().unwrap();
        }

        let mut ids: Vec<u64> = state.get_continue_watching().iter().map(|e| e.id).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![1, 2, 3, 4]);
        assert_eq!(state.get_watchlist().len(), 4);
    }

    #[test]
    fn test_persisted_layout() {
        let (state, clock) = state_with_clock();
        clock.set(1_700_000_000_000);
        state.add_to_continue_watching(ContinueWatchingEntry::episode(1399, "GoT", "/g.jpg", 2, 3));

        let raw = state.store().get(CONTINUE_WATCHING_KEY).unwrap();
        assert_eq!(
            raw,
            r#"[{"id":1399,"mediaType":"tv","title":"GoT","poster":"/g.jpg","season":2,"episode":3,"lastWatchedAt":1700000000000}]"#
        );
    }
}
