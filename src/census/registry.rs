//! The process-wide table registry and the tally entry points.
//!
//! All global state lives in one lazily-created singleton: the head of the
//! singly-linked table list, the worker-table reuse pool, the thread-number and
//! incarnation counters (all under a single list mutex), and the status word. Tables
//! are registered by prepending at the head and are never removed, so a reader that
//! captured the head can walk its suffix without any coordination while registration
//! continues.
//!
//! Locking discipline: the list mutex is never held while acquiring a per-table mutex,
//! and vice versa; per-table mutexes are taken one at a time.
//!
//! Worker threads (threads that never called [`initialize_thread_context`]) get their
//! tables from the reuse pool when one from the current incarnation is available. A
//! recycled table is deliberately *not* cleared: statistics are keyed by (birth record,
//! death table), and a recycled table is the same statistics bucket under a new OS
//! thread. Toggling the tracking status bumps the incarnation, which abandons pooled
//! tables from the previous incarnation (they stay on the list, inspectable).

use crate::census::birth::Births;
use crate::census::location::SourceLocation;
use crate::census::thread_table::ThreadTable;
use crate::census::time::{self, TrackedTime};
use std::cell::{Cell, RefCell};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{LazyLock, Mutex};
use std::time::Instant;

/// Tracking states. The system can flip between `Active` and `Deactivated` but never
/// returns to `Uninitialized` in production; the single-threaded test teardown is the
/// only exception.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Status {
    Uninitialized = 0,
    Active = 1,
    Deactivated = 2,
}

impl Status {
    fn from_u8(raw: u8) -> Status {
        match raw {
            1 => Status::Active,
            2 => Status::Deactivated,
            _ => Status::Uninitialized,
        }
    }
}

struct RegistryInner {
    /// Most recently registered table; start of the null-terminated list.
    head: Option<&'static ThreadTable>,
    /// Worker tables parked between thread lifetimes.
    pool: Vec<&'static ThreadTable>,
    thread_number: u32,
    incarnation: u32,
}

struct Registry {
    epoch: Instant,
    /// Written only while `inner` is locked; read with relaxed loads on hot paths.
    status: AtomicU8,
    inner: Mutex<RegistryInner>,
}

static REGISTRY: LazyLock<Registry> = LazyLock::new(|| Registry {
    epoch: Instant::now(),
    status: AtomicU8::new(Status::Uninitialized as u8),
    inner: Mutex::new(RegistryInner {
        head: None,
        pool: Vec::new(),
        thread_number: 0,
        incarnation: 0,
    }),
});

thread_local! {
    /// This thread's table, if it has recorded anything yet.
    static TABLE: Cell<Option<&'static ThreadTable>> = const { Cell::new(None) };
    /// Drop guard that offers worker tables back to the pool on thread exit.
    static EXIT_GUARD: RefCell<Option<ExitGuard>> = const { RefCell::new(None) };
}

struct ExitGuard(&'static ThreadTable);

impl Drop for ExitGuard {
    fn drop(&mut self) {
        recycle(self.0);
    }
}

fn recycle(table: &'static ThreadTable) {
    let mut inner = REGISTRY.inner.lock().unwrap();
    if table.is_worker() && table.incarnation() == inner.incarnation {
        inner.pool.push(table);
    }
    // Named-thread tables and tables from a stale incarnation just stay on the list.
}

pub(crate) fn elapsed_ms() -> u32 {
    REGISTRY.epoch.elapsed().as_millis() as u32
}

fn status() -> Status {
    Status::from_u8(REGISTRY.status.load(Ordering::Relaxed))
}

/// Whether tally entry points are currently recording.
pub fn tracking_status() -> bool {
    status() == Status::Active
}

/// Bring the system out of `Uninitialized` into `Active`. Idempotent; returns true.
pub fn initialize() -> bool {
    let registry = &*REGISTRY;
    let mut inner = registry.inner.lock().unwrap();
    if Status::from_u8(registry.status.load(Ordering::Relaxed)) == Status::Uninitialized {
        inner.incarnation += 1;
        registry.status.store(Status::Active as u8, Ordering::Relaxed);
    }
    true
}

/// Toggle between `Active` and `Deactivated`, initializing first if needed. Each
/// transition bumps the incarnation counter so that pooled worker tables from the
/// previous incarnation are abandoned rather than reused.
pub fn set_tracking_status(active: bool) {
    initialize();
    let registry = &*REGISTRY;
    let mut inner = registry.inner.lock().unwrap();
    let desired = if active {
        Status::Active
    } else {
        Status::Deactivated
    };
    if Status::from_u8(registry.status.load(Ordering::Relaxed)) != desired {
        inner.incarnation += 1;
        registry.status.store(desired as u8, Ordering::Relaxed);
    }
}

/// Starts global tracking on construction. Teardown is intentionally absent: the
/// registry and its tables are immortal, and leaking them is preferred over racing
/// with threads still holding pointers.
#[derive(Debug)]
pub struct AutoCensus {
    _private: (),
}

impl AutoCensus {
    pub fn new() -> Self {
        initialize();
        Self { _private: () }
    }
}

impl Default for AutoCensus {
    fn default() -> Self {
        Self::new()
    }
}

/// Register `table`, prepending it to the global list. Caller holds the list mutex.
fn register_locked(inner: &mut RegistryInner, table: ThreadTable) -> &'static ThreadTable {
    let table: &'static ThreadTable = Box::leak(Box::new(table));
    if let Some(head) = inner.head {
        table.link_next(head);
    }
    inner.head = Some(table);
    table
}

fn install(table: &'static ThreadTable) {
    let _ = TABLE.try_with(|cell| cell.set(Some(table)));
    let _ = EXIT_GUARD.try_with(|slot| *slot.borrow_mut() = Some(ExitGuard(table)));
}

/// Give the current thread a display name before its first birth. Message-loop style
/// threads call this once at startup; threads that skip it are treated as workers and
/// get a synthetic `WorkerThread-<n>` name on first use. No-op before [`initialize`]
/// or when the thread already has a table.
pub fn initialize_thread_context(suggested_name: &str) {
    if status() == Status::Uninitialized {
        return;
    }
    if TABLE.try_with(Cell::get).ok().flatten().is_some() {
        return;
    }
    let table = {
        let mut inner = REGISTRY.inner.lock().unwrap();
        let incarnation = inner.incarnation;
        register_locked(
            &mut inner,
            ThreadTable::new(suggested_name.to_string(), false, incarnation),
        )
    };
    install(table);
}

fn worker_table() -> &'static ThreadTable {
    let mut inner = REGISTRY.inner.lock().unwrap();
    // Prefer a pooled table from the current incarnation; stale entries are dropped
    // from the pool (they remain on the global list).
    while let Some(table) = inner.pool.pop() {
        if table.incarnation() == inner.incarnation {
            return table;
        }
    }
    inner.thread_number += 1;
    let name = format!("WorkerThread-{}", inner.thread_number);
    let incarnation = inner.incarnation;
    register_locked(&mut inner, ThreadTable::new(name, true, incarnation))
}

/// The current thread's table, created on first use. Returns `None` when tracking is
/// not active and the thread has no table yet, or when TLS is unavailable (thread
/// startup and teardown edges), so hot paths degrade to a null check.
pub fn get() -> Option<&'static ThreadTable> {
    match TABLE.try_with(Cell::get) {
        Ok(Some(table)) => return Some(table),
        Ok(None) => {}
        Err(_) => return None,
    }
    if !tracking_status() {
        return None;
    }
    let table = worker_table();
    install(table);
    Some(table)
}

/// Snapshot of the registry list: the head captured under the list mutex, then the
/// immortal `next` chain walked lock-free.
pub(crate) fn tables() -> impl Iterator<Item = &'static ThreadTable> {
    let head = REGISTRY.inner.lock().unwrap().head;
    std::iter::successors(head, |table| table.next())
}

/// Fast-path birth tally: find or create the current thread's birth record for
/// `location` and bump its count. Returns `None` (recording nothing) when tracking is
/// not active.
pub fn tally_birth_if_active(location: SourceLocation) -> Option<&'static Births> {
    if !tracking_status() {
        return None;
    }
    let table = get()?;
    Some(table.tally_birth(location))
}

/// The bundle a posted task carries to its completion point: the birth it was tallied
/// against, when it was posted, and, for delayed tasks, when it was due to start.
#[derive(Debug, Clone, Copy)]
pub struct TrackingInfo {
    pub birth: Option<&'static Births>,
    pub time_posted: TrackedTime,
    pub delayed_start: Option<TrackedTime>,
}

impl TrackingInfo {
    /// Capture a posted task in one step: tally a birth (when active) and stamp the
    /// posting time.
    pub fn new(location: SourceLocation, delayed_start: Option<TrackedTime>) -> Self {
        Self {
            birth: tally_birth_if_active(location),
            time_posted: time::now(),
            delayed_start,
        }
    }
}

/// Attribute a completed task run on a message-loop-named thread to the current
/// thread's death record for the task's birth. Queue time runs from the posting
/// instant (or the delayed-start instant, when present) to `start_of_run`.
pub fn tally_run_on_named_thread(
    info: &TrackingInfo,
    start_of_run: TrackedTime,
    end_of_run: TrackedTime,
) {
    if !tracking_status() {
        return;
    }
    let Some(birth) = info.birth else {
        return;
    };
    let effective_posted = info.delayed_start.unwrap_or(info.time_posted);
    let queue_ms = start_of_run.duration_since(effective_posted).max(0);
    let run_ms = end_of_run.duration_since(start_of_run).max(0);
    tally_death(birth, queue_ms, run_ms);
}

/// As [`tally_run_on_named_thread`], for worker-pool tasks that carry their timing
/// explicitly instead of in a [`TrackingInfo`].
pub fn tally_run_on_worker_thread(
    birth: Option<&'static Births>,
    time_posted: TrackedTime,
    start_of_run: TrackedTime,
    end_of_run: TrackedTime,
) {
    if !tracking_status() {
        return;
    }
    let Some(birth) = birth else {
        return;
    };
    let queue_ms = start_of_run.duration_since(time_posted).max(0);
    let run_ms = end_of_run.duration_since(start_of_run).max(0);
    tally_death(birth, queue_ms, run_ms);
}

/// Record the end of execution in a scoped region. Queue time is zero by definition.
pub fn tally_run_in_scoped_region(
    birth: Option<&'static Births>,
    start_of_run: TrackedTime,
    end_of_run: TrackedTime,
) {
    if !tracking_status() {
        return;
    }
    let Some(birth) = birth else {
        return;
    };
    let run_ms = end_of_run.duration_since(start_of_run).max(0);
    tally_death(birth, 0, run_ms);
}

fn tally_death(birth: &'static Births, queue_ms: i32, run_ms: i32) {
    if let Some(table) = get() {
        table.tally_death(birth, queue_ms, run_ms);
    }
}

/// Zero every birth count and death tally across all registered tables, taking each
/// table's mutex in turn. Best-effort: tallies racing with the sweep may survive it or
/// be lost. The maps themselves are never emptied.
pub fn reset_all() {
    for table in tables() {
        table.reset();
    }
}

/// Test-only teardown: return the registry to `Uninitialized`, bump the incarnation so
/// stale pooled tables are abandoned, and clear the calling thread's slot. Every table
/// ever registered is leaked. Callers must have joined all other tracking threads
/// first.
#[doc(hidden)]
pub fn shutdown_single_threaded_cleanup() {
    let registry = &*REGISTRY;
    {
        let mut inner = registry.inner.lock().unwrap();
        inner.head = None;
        inner.pool.clear();
        inner.thread_number = 0;
        inner.incarnation += 1;
        registry.status.store(Status::Uninitialized as u8, Ordering::Relaxed);
    }
    let _ = TABLE.try_with(|cell| cell.set(None));
    // Dropping the guard runs the recycle hook, which the incarnation bump turns into
    // a no-op.
    let _ = EXIT_GUARD.try_with(|slot| slot.borrow_mut().take());
}
