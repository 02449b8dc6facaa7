//! The tracking database: per-thread birth/death tables, the global registry, and the
//! snapshot pipeline.
//!
//! A call site tallies a birth through the current thread's table and attaches the
//! returned record to the task it is about to enqueue; whichever thread later runs the
//! task reports the start and end instants, and the death is tallied on *that* thread,
//! keyed by the birth record. Snapshotters walk the registry and briefly lock each
//! table only to clone its two maps.

pub mod birth;
pub mod location;
pub mod registry;
pub mod snapshot;
pub mod stats;
pub mod thread_table;
pub mod time;

pub use birth::Births;
pub use location::SourceLocation;
pub use registry::{
    AutoCensus, Status, TrackingInfo, get, initialize, initialize_thread_context, reset_all,
    set_tracking_status, tally_birth_if_active, tally_run_in_scoped_region,
    tally_run_on_named_thread, tally_run_on_worker_thread, tracking_status,
};
pub use snapshot::{Snapshot, SnapshotCollector, to_value};
pub use stats::{DeathData, DeathTally, DurationData, DurationTally};
pub use thread_table::ThreadTable;
pub use time::{TrackedTime, now, now_for_end_of_run, now_for_start_of_run};
