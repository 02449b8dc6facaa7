use std::sync::{Mutex, MutexGuard};
use task_census::census;

/// Serializes tests that touch the process-wide registry.
#[allow(dead_code)]
pub fn registry_guard() -> MutexGuard<'static, ()> {
    static LOCK: Mutex<()> = Mutex::new(());
    LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Tear the registry down, bring tracking back up, and name the current thread.
#[allow(dead_code)]
pub fn fresh_named(name: &str) {
    census::registry::shutdown_single_threaded_cleanup();
    census::initialize();
    census::initialize_thread_context(name);
}

/// Tear the registry down and bring tracking back up without naming this thread.
#[allow(dead_code)]
pub fn fresh_unnamed() {
    census::registry::shutdown_single_threaded_cleanup();
    census::initialize();
}
