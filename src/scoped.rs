//! Scoped-region instrumentation.

use crate::census::{self, Births, TrackedTime};

/// RAII timer around a tracked region.
///
/// Captures the start instant at construction and reports a scoped-region death on
/// drop, on every exit path including unwind. When tracking is disabled both probes
/// return the cheap sentinel and the drop is a null check.
pub struct ScopedTracker {
    birth: Option<&'static Births>,
    start_of_run: TrackedTime,
}

impl ScopedTracker {
    pub fn new(birth: Option<&'static Births>) -> Self {
        Self {
            birth,
            start_of_run: census::now_for_start_of_run(),
        }
    }
}

impl Drop for ScopedTracker {
    fn drop(&mut self) {
        census::tally_run_in_scoped_region(
            self.birth,
            self.start_of_run,
            census::now_for_end_of_run(),
        );
    }
}

/// Track the enclosing scope: tallies a birth at the expansion site and returns the
/// guard that reports the region on drop.
///
/// ```ignore
/// let _tracked = track_scoped_region!();
/// ```
#[macro_export]
macro_rules! track_scoped_region {
    () => {
        $crate::scoped::ScopedTracker::new($crate::census::tally_birth_if_active(
            $crate::call_site!(),
        ))
    };
}
