//! Per-thread tracking tables.
//!
//! Each thread that records a birth or death owns one [`ThreadTable`] holding its birth
//! map (call site → birth record) and death map (birth record → death tally). The maps
//! follow a strict ownership protocol:
//!
//! - only the owning thread ever mutates them,
//! - structural mutation (insertion) happens under the per-table mutex,
//! - foreign threads read them only under that same mutex.
//!
//! Lookups and counter updates on the owning thread therefore take no lock at all,
//! which keeps the recording paths free of contention; the mutex is touched only when a
//! call site or birth is seen for the first time on this thread, and by snapshotters.
//!
//! Tables are immortal. Once registered they stay on the global list for the life of
//! the process, and their records are never removed, so pointers handed out from here
//! remain valid on any thread indefinitely.

use crate::census::birth::{BirthKey, Births};
use crate::census::location::SourceLocation;
use crate::census::stats::{DeathData, DeathTally};
use std::cell::UnsafeCell;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Mutex, OnceLock};

struct TableMaps {
    births: BTreeMap<SourceLocation, &'static Births>,
    deaths: BTreeMap<BirthKey, DeathTally>,
}

pub struct ThreadTable {
    name: String,
    is_worker: bool,
    incarnation: u32,
    /// Link to the previously registered table. Written once, just before this table
    /// is published as the head of the global list, and never again.
    next: OnceLock<&'static ThreadTable>,
    /// Guards structural mutation of `maps` and all reads from foreign threads.
    lock: Mutex<()>,
    maps: UnsafeCell<TableMaps>,
}

// SAFETY: `maps` is mutated only by the owning thread, and structurally only while
// `lock` is held; foreign threads access it read-only, also under `lock`. The owner's
// unlocked accesses are reads plus relaxed-atomic counter updates, which cannot race
// with its own single-threaded structural writes and are defined concurrent with
// foreign locked reads.
unsafe impl Sync for ThreadTable {}

impl ThreadTable {
    pub(crate) fn new(name: String, is_worker: bool, incarnation: u32) -> Self {
        Self {
            name,
            is_worker,
            incarnation,
            next: OnceLock::new(),
            lock: Mutex::new(()),
            maps: UnsafeCell::new(TableMaps {
                births: BTreeMap::new(),
                deaths: BTreeMap::new(),
            }),
        }
    }

    /// Display name: the suggested name for message-loop threads, `WorkerThread-<n>`
    /// for workers.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_worker(&self) -> bool {
        self.is_worker
    }

    pub(crate) fn incarnation(&self) -> u32 {
        self.incarnation
    }

    pub(crate) fn next(&self) -> Option<&'static ThreadTable> {
        self.next.get().copied()
    }

    pub(crate) fn link_next(&self, previous_head: &'static ThreadTable) {
        let _ = self.next.set(previous_head);
    }

    /// Find or create the birth record for `location` and bump its count. Lock-free
    /// when the record already exists.
    ///
    /// Must be called only from the owning thread; the registry's TLS lookup is the
    /// sole caller and guarantees it.
    pub(crate) fn tally_birth(&'static self, location: SourceLocation) -> &'static Births {
        {
            // SAFETY: owner-side read; structural writes happen only on this thread.
            let maps = unsafe { &*self.maps.get() };
            if let Some(births) = maps.births.get(&location) {
                births.record_birth();
                return births;
            }
        }
        let births: &'static Births = Box::leak(Box::new(Births::new(location, self)));
        {
            let _guard = self.lock.lock().unwrap();
            // SAFETY: structural insertion by the owning thread under the table lock,
            // which excludes foreign readers.
            let maps = unsafe { &mut *self.maps.get() };
            maps.births.insert(location, births);
        }
        births.record_birth();
        births
    }

    /// Find or create the death record keyed by `birth` and fold one death into it.
    /// Lock-free when the record already exists.
    ///
    /// Same owner-thread contract as [`Self::tally_birth`]. `birth` may live on a
    /// different table; deaths are attributed to the thread they occur on.
    pub(crate) fn tally_death(&self, birth: &'static Births, queue_ms: i32, run_ms: i32) {
        let key = BirthKey(birth);
        {
            // SAFETY: owner-side read; structural writes happen only on this thread.
            let maps = unsafe { &*self.maps.get() };
            if let Some(death) = maps.deaths.get(&key) {
                death.record_death(queue_ms, run_ms);
                return;
            }
        }
        let _guard = self.lock.lock().unwrap();
        // SAFETY: structural insertion by the owning thread under the table lock.
        let maps = unsafe { &mut *self.maps.get() };
        maps.deaths
            .entry(key)
            .or_default()
            .record_death(queue_ms, run_ms);
    }

    /// Clone the birth map. Callable from any thread.
    pub fn birth_snapshot(&self) -> Vec<(SourceLocation, &'static Births)> {
        let _guard = self.lock.lock().unwrap();
        // SAFETY: foreign read under the table lock, excluded from structural writes.
        let maps = unsafe { &*self.maps.get() };
        maps.births.iter().map(|(loc, b)| (*loc, *b)).collect()
    }

    /// Clone the death map with a point-in-time copy of each tally. Callable from any
    /// thread. Individual counter words may straddle an in-flight update; the clone is
    /// structurally coherent because insertions hold the same lock.
    pub fn death_snapshot(&self) -> Vec<(&'static Births, DeathData)> {
        let _guard = self.lock.lock().unwrap();
        // SAFETY: foreign read under the table lock, excluded from structural writes.
        let maps = unsafe { &*self.maps.get() };
        maps.deaths
            .iter()
            .map(|(key, tally)| (key.0, tally.data()))
            .collect()
    }

    /// Zero every birth count and death tally owned by this table. The maps themselves
    /// are left intact. Best-effort under concurrent tallies from the owning thread.
    pub(crate) fn reset(&self) {
        let _guard = self.lock.lock().unwrap();
        // SAFETY: read-only map traversal under the table lock; the counters are
        // cleared through their atomics.
        let maps = unsafe { &*self.maps.get() };
        for births in maps.births.values() {
            births.clear();
        }
        for death in maps.deaths.values() {
            death.clear();
        }
    }
}

impl fmt::Debug for ThreadTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadTable")
            .field("name", &self.name)
            .field("is_worker", &self.is_worker)
            .field("incarnation", &self.incarnation)
            .finish_non_exhaustive()
    }
}
