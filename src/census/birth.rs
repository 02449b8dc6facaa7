//! Birth records.

use crate::census::location::SourceLocation;
use crate::census::thread_table::ThreadTable;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicI32, Ordering as MemOrdering};

/// Tally of constructions at one call site on one thread.
///
/// The identity half (location plus owning table) is immutable and safe to read from
/// any thread at any time. The count is written only by the owning thread and read
/// racily by snapshotters. Records are immortal: once registered in a thread table they
/// are never destroyed, so a `&'static Births` can be attached to a task and honored on
/// whichever thread eventually runs it.
pub struct Births {
    location: SourceLocation,
    birth_table: &'static ThreadTable,
    birth_count: AtomicI32,
}

impl Births {
    pub(crate) fn new(location: SourceLocation, birth_table: &'static ThreadTable) -> Self {
        Self {
            location,
            birth_table,
            birth_count: AtomicI32::new(0),
        }
    }

    pub fn location(&self) -> SourceLocation {
        self.location
    }

    pub fn birth_table(&self) -> &'static ThreadTable {
        self.birth_table
    }

    pub fn birth_count(&self) -> i32 {
        self.birth_count.load(MemOrdering::Relaxed)
    }

    pub(crate) fn record_birth(&self) {
        self.birth_count.fetch_add(1, MemOrdering::Relaxed);
    }

    /// Back out one birth after a corrected birthplace attribution.
    pub fn forget_birth(&self) {
        self.birth_count.fetch_sub(1, MemOrdering::Relaxed);
    }

    pub(crate) fn clear(&self) {
        self.birth_count.store(0, MemOrdering::Relaxed);
    }
}

impl fmt::Debug for Births {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Births")
            .field("location", &self.location)
            .field("thread", &self.birth_table.name())
            .field("count", &self.birth_count())
            .finish()
    }
}

/// A birth record used as a map key, compared by address.
///
/// Death maps and the collector's residual map key on the birth record itself, not on
/// its location: the same call site produces distinct records on distinct birth
/// threads, and those must stay distinct buckets.
#[derive(Clone, Copy)]
pub(crate) struct BirthKey(pub(crate) &'static Births);

impl BirthKey {
    fn addr(self) -> usize {
        self.0 as *const Births as usize
    }
}

impl PartialEq for BirthKey {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.0, other.0)
    }
}

impl Eq for BirthKey {}

impl PartialOrd for BirthKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for BirthKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.addr().cmp(&other.addr())
    }
}

impl Hash for BirthKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_usize(self.addr());
    }
}

impl fmt::Debug for BirthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BirthKey({:p})", self.0)
    }
}
