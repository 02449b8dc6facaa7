//! Cross-thread attribution and worker-table recycling.

mod common;

use assert2::check;
use common::{fresh_named, fresh_unnamed, registry_guard};
use std::thread;
use task_census::call_site;
use task_census::census::{self, TrackedTime};

#[test]
fn death_is_attributed_to_the_thread_that_ran_the_task() {
    let _guard = registry_guard();
    fresh_named("BirthThread");

    let birth = census::tally_birth_if_active(call_site!());
    check!(birth.is_some());

    thread::spawn(move || {
        census::initialize_thread_context("DeathThread");
        census::tally_run_on_worker_thread(
            birth,
            TrackedTime::from_ms(100),
            TrackedTime::from_ms(140),
            TrackedTime::from_ms(200),
        );
    })
    .join()
    .unwrap();

    check!(birth.unwrap().birth_count() == 1);
    check!(birth.unwrap().birth_table().name() == "BirthThread");

    let value = census::to_value();
    let records = value.as_array().unwrap();
    // One birth matched by one death: no living residual.
    check!(records.len() == 1);
    let record = &records[0];
    check!(record["birth_thread"] == "BirthThread");
    check!(record["death_thread"] == "DeathThread");
    check!(record["count"] == 1);
    check!(record["queue_ms"] == 40);
    check!(record["run_ms"] == 60);
}

#[test]
fn worker_tables_are_recycled_within_an_incarnation() {
    let _guard = registry_guard();
    fresh_unnamed();

    let location = call_site!();

    let first = thread::spawn(move || {
        let birth = census::tally_birth_if_active(location).unwrap();
        (census::get().unwrap().name().to_string(), birth.birth_count())
    })
    .join()
    .unwrap();
    check!(first.0.starts_with("WorkerThread-"));
    check!(first.1 == 1);

    let second = thread::spawn(move || {
        let birth = census::tally_birth_if_active(location).unwrap();
        (census::get().unwrap().name().to_string(), birth.birth_count())
    })
    .join()
    .unwrap();

    // The second worker adopted the first worker's table: same synthetic name, and the
    // birth count keeps accumulating in the same bucket.
    check!(second.0 == first.0);
    check!(second.1 == 2);

    let value = census::to_value();
    let records = value.as_array().unwrap();
    check!(records.len() == 1);
    check!(records[0]["count"] == 2);
    check!(records[0]["birth_thread"] == first.0.as_str());
}

#[test]
fn concurrent_workers_get_distinct_tables() {
    let _guard = registry_guard();
    fresh_unnamed();

    let location = call_site!();
    let barrier = std::sync::Arc::new(std::sync::Barrier::new(2));

    let handles: Vec<_> = (0..2)
        .map(|_| {
            let barrier = barrier.clone();
            thread::spawn(move || {
                census::tally_birth_if_active(location).unwrap();
                let name = census::get().unwrap().name().to_string();
                // Hold the table until both threads have claimed one.
                barrier.wait();
                name
            })
        })
        .collect();

    let mut names: Vec<String> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    names.sort();
    names.dedup();
    check!(names.len() == 2, "two live workers must not share a table");
}

#[test]
fn stale_pooled_tables_are_abandoned_after_a_status_toggle() {
    let _guard = registry_guard();
    fresh_unnamed();

    let location = call_site!();

    let first_name = thread::spawn(move || {
        census::tally_birth_if_active(location).unwrap();
        census::get().unwrap().name().to_string()
    })
    .join()
    .unwrap();

    // Each toggle bumps the incarnation; the pooled table is now stale.
    census::set_tracking_status(false);
    census::set_tracking_status(true);

    let second_name = thread::spawn(move || {
        census::tally_birth_if_active(location).unwrap();
        census::get().unwrap().name().to_string()
    })
    .join()
    .unwrap();

    check!(second_name != first_name);

    // The abandoned table is still on the list and still visible to snapshots.
    let value = census::to_value();
    let birth_threads: Vec<&str> = value
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["birth_thread"].as_str().unwrap())
        .collect();
    check!(birth_threads.contains(&first_name.as_str()));
    check!(birth_threads.contains(&second_name.as_str()));
}

#[test]
fn many_threads_tally_concurrently_without_losing_counts() {
    let _guard = registry_guard();
    fresh_named("Spawner");

    let location = call_site!();
    let birth = census::tally_birth_if_active(location);

    let handles: Vec<_> = (0..4)
        .map(|_| {
            thread::spawn(move || {
                for i in 0..250u32 {
                    census::tally_run_on_worker_thread(
                        birth,
                        TrackedTime::from_ms(i),
                        TrackedTime::from_ms(i + 1),
                        TrackedTime::from_ms(i + 3),
                    );
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let value = census::to_value();
    let records = value.as_array().unwrap();
    let total_deaths: i64 = records
        .iter()
        .filter(|r| r.get("death_thread").is_some())
        .map(|r| r["count"].as_i64().unwrap())
        .sum();
    // In a quiesced system the tallies are exact: every thread owned its own death
    // record, so no increment could be lost.
    check!(total_deaths == 1000);
    for record in records.iter().filter(|r| r.get("death_thread").is_some()) {
        check!(record["run_ms"] == record["count"].as_i64().unwrap() * 2);
        check!(record["queue_ms"] == record["count"].as_i64().unwrap());
        check!(record["run_ms_max"] == 2);
        check!(record["queue_ms_max"] == 1);
    }
}
