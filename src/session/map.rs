//! Session store with dual-index eviction.
//!
//! The primary index maps session id to `(Context, expiry)`. A min-heap of
//! `(expiry, id)` pairs orders eviction. Touching a session pushes a fresh
//! heap entry instead of re-keying the old one; stale heap entries are
//! recognized during cleaning because their expiry no longer matches the
//! map's and are simply dropped.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::context::Context;

/// Floor applied to every session timeout and to the cleaner interval.
const MIN_SESSION_TIMEOUT_MS: u64 = 1000;
/// Heap entries popped per short-clean pass.
const SHORT_CLEAN_BATCH: usize = 8;
/// Heaps smaller than this are never shrunk.
const MIN_SHRINK_SIZE: usize = 256;

const DEFAULT_SESSION_TIMEOUT_MS: u64 = 1000 * 60 * 60 * 2;
const DEFAULT_CLEANER_INTERVAL_MS: u64 = 1000 * 60 * 30;

struct SessionEntry {
    context: Arc<Context>,
    expiry: Instant,
}

struct HeapEntry {
    expiry: Instant,
    id: String,
}

// BinaryHeap is a max-heap; the ordering is inverted so the earliest
// expiry surfaces first.
impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other.expiry.cmp(&self.expiry)
    }
}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.expiry == other.expiry
    }
}

impl Eq for HeapEntry {}

#[derive(Default)]
struct Indexes {
    map: HashMap<String, SessionEntry>,
    heap: BinaryHeap<HeapEntry>,
}

/// Concurrent session store. One exclusive lock covers both indexes; they
/// must always move together.
pub struct SessionMap {
    indexes: Mutex<Indexes>,
    default_timeout_ms: AtomicU64,
    cleaner_interval_ms: AtomicU64,
    cleaner_enabled: AtomicBool,
}

impl Default for SessionMap {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionMap {
    pub fn new() -> Self {
        Self {
            indexes: Mutex::new(Indexes::default()),
            default_timeout_ms: AtomicU64::new(DEFAULT_SESSION_TIMEOUT_MS),
            cleaner_interval_ms: AtomicU64::new(DEFAULT_CLEANER_INTERVAL_MS),
            cleaner_enabled: AtomicBool::new(false),
        }
    }

    /// Fetch the session context for `id`, extending its lifetime.
    ///
    /// A live session's expiry is bumped to at least `now + default
    /// timeout` (never shortened). An absent or expired id gets a fresh
    /// context. A short-clean pass runs after every access.
    pub fn get_session(&self, id: &str) -> Arc<Context> {
        let mut guard = self.indexes.lock().unwrap();
        let indexes = &mut *guard;
        let now = Instant::now();
        let timeout = self.default_timeout_ms.load(AtomicOrdering::Relaxed);

        let context = match indexes.map.get_mut(id) {
            Some(entry) if entry.expiry > now => {
                let context = entry.context.clone();
                let new_expiry = (now + Duration::from_millis(timeout)).max(entry.expiry);
                if new_expiry != entry.expiry {
                    entry.expiry = new_expiry;
                    indexes.heap.push(HeapEntry {
                        expiry: new_expiry,
                        id: id.to_string(),
                    });
                }
                context
            }
            _ => self.insert_fresh(indexes, id, now, timeout),
        };

        short_clean(indexes, now);

        context
    }

    /// Extend (or create) the session `id` so it lives at least
    /// `timeout_ms` from now. The stored expiry is never shortened.
    pub fn set_session_timeout(&self, id: &str, timeout_ms: u64) {
        let mut guard = self.indexes.lock().unwrap();
        let indexes = &mut *guard;
        let now = Instant::now();
        let timeout = timeout_ms.max(MIN_SESSION_TIMEOUT_MS);

        match indexes.map.get_mut(id) {
            Some(entry) => {
                let new_expiry = (now + Duration::from_millis(timeout)).max(entry.expiry);
                if new_expiry != entry.expiry {
                    entry.expiry = new_expiry;
                    indexes.heap.push(HeapEntry {
                        expiry: new_expiry,
                        id: id.to_string(),
                    });
                }
            }
            None => {
                self.insert_fresh(indexes, id, now, timeout);
            }
        }

        short_clean(indexes, now);
    }

    /// Drop the session from the primary index. Heap entries are removed
    /// lazily by the cleaning passes.
    pub fn remove_session(&self, id: &str) -> bool {
        let mut guard = self.indexes.lock().unwrap();
        let indexes = &mut *guard;
        let removed = indexes.map.remove(id).is_some();
        short_clean(indexes, Instant::now());
        removed
    }

    pub fn set_default_timeout(&self, timeout_ms: u64) {
        self.default_timeout_ms
            .store(timeout_ms, AtomicOrdering::Relaxed);
    }

    pub fn set_cleaner_interval(&self, interval_ms: u64) {
        self.cleaner_interval_ms
            .store(interval_ms, AtomicOrdering::Relaxed);
    }

    /// Effective cleaner period, floored at one second.
    pub fn cleaner_interval(&self) -> Duration {
        Duration::from_millis(
            self.cleaner_interval_ms
                .load(AtomicOrdering::Relaxed)
                .max(MIN_SESSION_TIMEOUT_MS),
        )
    }

    pub fn set_cleaner_enabled(&self, enabled: bool) {
        self.cleaner_enabled.store(enabled, AtomicOrdering::Relaxed);
    }

    pub fn cleaner_enabled(&self) -> bool {
        self.cleaner_enabled.load(AtomicOrdering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.indexes.lock().unwrap().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// One background-cleaner tick: short-clean while the heap is close to
    /// the map size, thorough-clean once it has bloated past 8×.
    pub(crate) fn clean_pass(&self) {
        let mut guard = self.indexes.lock().unwrap();
        let indexes = &mut *guard;
        let now = Instant::now();
        if indexes.heap.len() < indexes.map.len() * 8 {
            short_clean(indexes, now);
        } else {
            thorough_clean(indexes, now);
        }
    }

    fn insert_fresh(
        &self,
        indexes: &mut Indexes,
        id: &str,
        now: Instant,
        timeout_ms: u64,
    ) -> Arc<Context> {
        let context = Arc::new(Context::new());
        let expiry = now + Duration::from_millis(timeout_ms.max(MIN_SESSION_TIMEOUT_MS));

        indexes.map.insert(
            id.to_string(),
            SessionEntry {
                context: context.clone(),
                expiry,
            },
        );
        indexes.heap.push(HeapEntry {
            expiry,
            id: id.to_string(),
        });

        context
    }
}

/// Bounded incremental eviction, run inline after every access.
///
/// Only fires once the heap has outgrown the map by 2×, and pops at most
/// [`SHORT_CLEAN_BATCH`] expired entries so the access path stays cheap.
fn short_clean(indexes: &mut Indexes, now: Instant) {
    if indexes.heap.len() <= indexes.map.len() * 2 {
        return;
    }

    let mut cleaned = 0;
    while cleaned < SHORT_CLEAN_BATCH {
        match indexes.heap.peek() {
            Some(top) if top.expiry <= now => {}
            _ => break,
        }
        let entry = indexes.heap.pop().unwrap();
        evict_if_current(&mut indexes.map, entry);
        cleaned += 1;
    }

    maybe_shrink(&mut indexes.heap);
}

/// Pop every expired heap entry, evicting matching sessions.
fn thorough_clean(indexes: &mut Indexes, now: Instant) {
    let before = indexes.map.len();

    loop {
        match indexes.heap.peek() {
            Some(top) if top.expiry <= now => {}
            _ => break,
        }
        let entry = indexes.heap.pop().unwrap();
        evict_if_current(&mut indexes.map, entry);
    }

    maybe_shrink(&mut indexes.heap);

    let evicted = before - indexes.map.len();
    if evicted > 0 {
        debug!(evicted, remaining = indexes.map.len(), "session sweep");
    }
}

/// Erase the session only when the popped expiry is the current one; a
/// mismatch means the heap entry was superseded by a later touch.
fn evict_if_current(map: &mut HashMap<String, SessionEntry>, entry: HeapEntry) {
    if let Some(stored) = map.get(&entry.id) {
        if stored.expiry == entry.expiry {
            map.remove(&entry.id);
        }
    }
}

fn maybe_shrink(heap: &mut BinaryHeap<HeapEntry>) {
    if heap.len() > MIN_SHRINK_SIZE && heap.capacity() > heap.len() * 8 {
        heap.shrink_to_fit();
    }
}
