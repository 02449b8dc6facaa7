//! Live duration tallies and their frozen snapshot counterparts.
//!
//! The live types ([`DurationTally`], [`DeathTally`]) sit inside thread tables and are
//! written only by the owning thread; relaxed atomics keep concurrent snapshot reads
//! defined without a lock on the tally path. The frozen types ([`DurationData`],
//! [`DeathData`]) are point-in-time copies used in snapshots and aggregation. Merging
//! happens only on the frozen side, never on live statistics.

use std::sync::atomic::{AtomicI32, Ordering};

/// Accumulates the sum and max of one duration metric in integer milliseconds.
#[derive(Debug, Default)]
pub struct DurationTally {
    sum_ms: AtomicI32,
    max_ms: AtomicI32,
}

impl DurationTally {
    pub fn add(&self, duration_ms: i32) {
        self.sum_ms.fetch_add(duration_ms, Ordering::Relaxed);
        self.max_ms.fetch_max(duration_ms, Ordering::Relaxed);
    }

    pub fn clear(&self) {
        self.sum_ms.store(0, Ordering::Relaxed);
        self.max_ms.store(0, Ordering::Relaxed);
    }

    pub fn data(&self) -> DurationData {
        DurationData {
            sum_ms: self.sum_ms.load(Ordering::Relaxed),
            max_ms: self.max_ms.load(Ordering::Relaxed),
        }
    }
}

/// Frozen copy of a [`DurationTally`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DurationData {
    sum_ms: i32,
    max_ms: i32,
}

impl DurationData {
    pub fn sum_ms(&self) -> i32 {
        self.sum_ms
    }

    pub fn max_ms(&self) -> i32 {
        self.max_ms
    }

    /// Integer-millisecond average over `count` observations. The one place averages
    /// are computed.
    pub fn average_ms(&self, count: i32) -> i32 {
        if count <= 0 { 0 } else { self.sum_ms / count }
    }

    /// Aggregate another frozen tally into this one.
    pub fn merge(&mut self, other: &DurationData) {
        self.sum_ms += other.sum_ms;
        self.max_ms = self.max_ms.max(other.max_ms);
    }
}

/// Death statistics for one (birth record, death thread) pair, updated in place by the
/// thread the deaths occur on.
#[derive(Debug, Default)]
pub struct DeathTally {
    count: AtomicI32,
    run_time: DurationTally,
    queue_time: DurationTally,
}

impl DeathTally {
    pub fn record_death(&self, queue_duration_ms: i32, run_duration_ms: i32) {
        self.count.fetch_add(1, Ordering::Relaxed);
        self.queue_time.add(queue_duration_ms);
        self.run_time.add(run_duration_ms);
    }

    pub fn clear(&self) {
        self.count.store(0, Ordering::Relaxed);
        self.run_time.clear();
        self.queue_time.clear();
    }

    pub fn data(&self) -> DeathData {
        DeathData {
            count: self.count.load(Ordering::Relaxed),
            run_time: self.run_time.data(),
            queue_time: self.queue_time.data(),
        }
    }
}

/// Frozen death statistics as they appear in snapshots.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeathData {
    count: i32,
    run_time: DurationData,
    queue_time: DurationData,
}

impl DeathData {
    /// Stats for births without a matching death yet: a bare count, zero durations.
    pub fn living(count: i32) -> Self {
        Self {
            count,
            ..Default::default()
        }
    }

    pub fn count(&self) -> i32 {
        self.count
    }

    pub fn run_time(&self) -> DurationData {
        self.run_time
    }

    pub fn queue_time(&self) -> DurationData {
        self.queue_time
    }

    pub fn average_run_ms(&self) -> i32 {
        self.run_time.average_ms(self.count)
    }

    pub fn average_queue_ms(&self) -> i32 {
        self.queue_time.average_ms(self.count)
    }

    /// Aggregate another frozen record into this one. Snapshot-side only.
    pub fn merge(&mut self, other: &DeathData) {
        self.count += other.count;
        self.run_time.merge(&other.run_time);
        self.queue_time.merge(&other.queue_time);
    }
}
