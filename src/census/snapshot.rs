//! Frozen snapshot records and cross-thread collection.
//!
//! Collection runs concurrently with ongoing tallying. Pointer data (births, tables)
//! is invariant and perfectly acquired; the statistics are copied under each table's
//! mutex and are coherent per entry, though the totals across threads may miss or
//! double-count increments in flight. The output is descriptive telemetry, not
//! accounting of record.

use crate::census::birth::{BirthKey, Births};
use crate::census::location::SourceLocation;
use crate::census::registry;
use crate::census::stats::DeathData;
use crate::census::thread_table::ThreadTable;
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use serde_json::Value;
use std::collections::HashMap;

/// Frozen view of one (birth, death-thread) pair at sampling time.
///
/// Holding the record is always safe: birth records and thread tables are immortal,
/// and the death statistics are a by-value copy.
#[derive(Debug, Clone, Copy)]
pub struct Snapshot {
    birth: &'static Births,
    death_table: Option<&'static ThreadTable>,
    death_data: DeathData,
}

impl Snapshot {
    pub(crate) fn full(
        birth: &'static Births,
        death_table: &'static ThreadTable,
        death_data: DeathData,
    ) -> Self {
        Self {
            birth,
            death_table: Some(death_table),
            death_data,
        }
    }

    /// A birth not yet matched by deaths: no death thread, a residual count, zero
    /// durations.
    pub(crate) fn birth_only(birth: &'static Births, living_count: i32) -> Self {
        Self {
            birth,
            death_table: None,
            death_data: DeathData::living(living_count),
        }
    }

    pub fn location(&self) -> SourceLocation {
        self.birth.location()
    }

    pub fn birth_thread_name(&self) -> &str {
        self.birth.birth_table().name()
    }

    /// `None` for birth-only (still living) records.
    pub fn death_thread_name(&self) -> Option<&str> {
        self.death_table.map(ThreadTable::name)
    }

    pub fn count(&self) -> i32 {
        self.death_data.count()
    }

    pub fn death_data(&self) -> &DeathData {
        &self.death_data
    }
}

impl Serialize for Snapshot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut record = serializer.serialize_struct("Snapshot", 10)?;
        record.serialize_field("location", &self.location())?;
        record.serialize_field("birth_thread", self.birth_thread_name())?;
        match self.death_thread_name() {
            Some(name) => record.serialize_field("death_thread", name)?,
            None => record.skip_field("death_thread")?,
        }
        record.serialize_field("count", &self.death_data.count())?;
        record.serialize_field("run_ms", &self.death_data.run_time().sum_ms())?;
        record.serialize_field("run_ms_max", &self.death_data.run_time().max_ms())?;
        record.serialize_field("run_ms_avg", &self.death_data.average_run_ms())?;
        record.serialize_field("queue_ms", &self.death_data.queue_time().sum_ms())?;
        record.serialize_field("queue_ms_max", &self.death_data.queue_time().max_ms())?;
        record.serialize_field("queue_ms_avg", &self.death_data.average_queue_ms())?;
        record.end()
    }
}

/// Accumulates snapshot records across thread tables.
///
/// Call [`append`](Self::append) for every registered table, then
/// [`add_list_of_living_objects`](Self::add_list_of_living_objects) to convert the
/// remaining birth residuals into birth-only records.
#[derive(Debug, Default)]
pub struct SnapshotCollector {
    collection: Vec<Snapshot>,
    /// Births minus deaths seen so far, keyed by birth record.
    global_birth_count: HashMap<BirthKey, i32>,
}

impl SnapshotCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one table's contribution in: its births feed the residual map (each birth
    /// record lives in exactly one table, so each is counted once), its death records
    /// join the collection and debit the residuals of whichever births they track.
    pub fn append(&mut self, table: &'static ThreadTable) {
        for (_location, births) in table.birth_snapshot() {
            *self
                .global_birth_count
                .entry(BirthKey(births))
                .or_insert(0) += births.birth_count();
        }
        for (birth, death_data) in table.death_snapshot() {
            *self.global_birth_count.entry(BirthKey(birth)).or_insert(0) -= death_data.count();
            self.collection.push(Snapshot::full(birth, table, death_data));
        }
    }

    /// Emit one birth-only record per birth with a positive residual. Negative
    /// residuals indicate a snapshotting race and are coerced to zero (dropped).
    pub fn add_list_of_living_objects(&mut self) {
        for (key, residual) in &self.global_birth_count {
            if *residual > 0 {
                self.collection.push(Snapshot::birth_only(key.0, *residual));
            }
        }
    }

    pub fn collection(&self) -> &[Snapshot] {
        &self.collection
    }

    /// Serialize the collection as an array of records. Read-only over frozen copies;
    /// no locks held.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(&self.collection).unwrap_or(Value::Null)
    }
}

/// Snapshot every registered table and serialize the combined collection.
pub fn to_value() -> Value {
    let mut collector = SnapshotCollector::new();
    for table in registry::tables() {
        collector.append(table);
    }
    collector.add_list_of_living_objects();
    collector.to_value()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::call_site;
    use crate::census::registry::{
        initialize, initialize_thread_context, shutdown_single_threaded_cleanup,
        tally_birth_if_active, tally_run_in_scoped_region,
    };
    use crate::census::test_support::registry_guard;
    use crate::census::time::TrackedTime;

    fn fresh_named(name: &str) {
        shutdown_single_threaded_cleanup();
        initialize();
        initialize_thread_context(name);
    }

    #[test]
    fn test_single_thread_round_trip() {
        let _guard = registry_guard();
        fresh_named("RoundTrip");
        let birth = tally_birth_if_active(call_site!());
        tally_run_in_scoped_region(birth, TrackedTime::from_ms(1000), TrackedTime::from_ms(1050));

        let value = to_value();
        let records = value.as_array().unwrap();
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record["birth_thread"], "RoundTrip");
        assert_eq!(record["death_thread"], "RoundTrip");
        assert_eq!(record["count"], 1);
        assert_eq!(record["run_ms"], 50);
        assert_eq!(record["run_ms_max"], 50);
        assert_eq!(record["run_ms_avg"], 50);
        assert_eq!(record["queue_ms"], 0);
        assert_eq!(record["queue_ms_max"], 0);
    }

    #[test]
    fn test_living_residual_emitted_without_death_thread() {
        let _guard = registry_guard();
        fresh_named("Residual");
        let location = call_site!();
        let birth = tally_birth_if_active(location);
        tally_birth_if_active(location);
        tally_birth_if_active(location);
        tally_run_in_scoped_region(birth, TrackedTime::from_ms(100), TrackedTime::from_ms(110));

        let value = to_value();
        let records = value.as_array().unwrap();
        assert_eq!(records.len(), 2);

        let full = records
            .iter()
            .find(|r| r.get("death_thread").is_some())
            .unwrap();
        assert_eq!(full["count"], 1);
        assert_eq!(full["run_ms"], 10);

        let living = records
            .iter()
            .find(|r| r.get("death_thread").is_none())
            .unwrap();
        assert_eq!(living["count"], 2);
        assert_eq!(living["run_ms"], 0);
        assert_eq!(living["birth_thread"], "Residual");
    }

    #[test]
    fn test_reset_zeroes_stats_but_keeps_records() {
        let _guard = registry_guard();
        fresh_named("ResetAll");
        let location = call_site!();
        let mut birth = None;
        for _ in 0..5 {
            birth = tally_birth_if_active(location);
        }
        for run_ms in [10u32, 20, 30] {
            tally_run_in_scoped_region(
                birth,
                TrackedTime::from_ms(0),
                TrackedTime::from_ms(run_ms),
            );
        }
        crate::census::registry::reset_all();

        let value = to_value();
        let records = value.as_array().unwrap();
        // The death record survives with zeroed stats; no living residual remains.
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["count"], 0);
        assert_eq!(records[0]["run_ms"], 0);
        assert_eq!(records[0]["run_ms_max"], 0);
    }

    #[test]
    fn test_deactivation_freezes_the_snapshot() {
        let _guard = registry_guard();
        fresh_named("Frozen");
        let location = call_site!();
        tally_birth_if_active(location);
        let before = to_value();

        crate::census::registry::set_tracking_status(false);
        assert!(tally_birth_if_active(location).is_none());
        assert_eq!(to_value(), before);
    }

    #[test]
    fn test_collector_merges_nothing_across_distinct_births() {
        let _guard = registry_guard();
        fresh_named("Distinct");
        let a = tally_birth_if_active(call_site!());
        let b = tally_birth_if_active(call_site!());
        tally_run_in_scoped_region(a, TrackedTime::from_ms(0), TrackedTime::from_ms(5));
        tally_run_in_scoped_region(b, TrackedTime::from_ms(0), TrackedTime::from_ms(7));

        let mut collector = SnapshotCollector::new();
        for table in registry::tables() {
            collector.append(table);
        }
        collector.add_list_of_living_objects();
        assert_eq!(collector.collection().len(), 2);
        let total: i32 = collector.collection().iter().map(Snapshot::count).sum();
        assert_eq!(total, 2);
    }
}
