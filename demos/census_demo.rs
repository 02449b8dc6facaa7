//! End-to-end tour: a named main thread posts tracked jobs to a small worker pool,
//! the workers attribute the deaths to their own tables, and the final snapshot is
//! printed as JSON.

use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::time::Duration;
use task_census::call_site;
use task_census::census::{self, TrackingInfo};

struct Job {
    info: TrackingInfo,
    work: Duration,
}

fn main() {
    let _census = census::AutoCensus::new();
    census::initialize_thread_context("MainThread");

    let (tx, rx) = mpsc::channel::<Job>();
    let rx = Arc::new(Mutex::new(rx));

    let workers: Vec<_> = (0..3)
        .map(|_| {
            let rx = rx.clone();
            thread::spawn(move || {
                loop {
                    let job = match rx.lock().unwrap().recv() {
                        Ok(job) => job,
                        Err(_) => break,
                    };
                    let start = census::now_for_start_of_run();
                    thread::sleep(job.work);
                    let end = census::now_for_end_of_run();
                    census::tally_run_on_worker_thread(
                        job.info.birth,
                        job.info.time_posted,
                        start,
                        end,
                    );
                }
            })
        })
        .collect();

    for round in 0..12u64 {
        let job = Job {
            info: TrackingInfo::new(call_site!(), None),
            work: Duration::from_millis(2 + round % 5),
        };
        tx.send(job).unwrap();
    }
    drop(tx);
    for worker in workers {
        worker.join().unwrap();
    }

    // A region on the main thread, tracked the RAII way.
    {
        let _tracked = task_census::track_scoped_region!();
        thread::sleep(Duration::from_millis(3));
    }

    println!(
        "{}",
        serde_json::to_string_pretty(&census::to_value()).expect("snapshot serializes")
    );
}
