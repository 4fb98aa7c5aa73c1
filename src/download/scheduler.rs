// src/download/scheduler.rs
// =============================================================================
// Runs one page worth of fetch-and-save units with bounded parallelism.
//
// How it works:
// 1. Take a permit from the admission gate (a tokio Semaphore sized to the
//    parallelism budget). This waits while the budget is used up.
// 2. Spawn the unit; the permit moves into the task and is dropped when the
//    task ends, whether it succeeded, failed or panicked.
// 3. Pause the submission loop for a random politeness delay, then admit the
//    next unit. In-flight units keep running during the pause. The last
//    admission is followed by a pause too, so the next page's listing
//    request never follows the previous page's requests immediately.
// 4. Once every unit is admitted, wait for all of them before returning, so
//    the next page never overlaps this one.
//
// A failing unit is logged and counted. It never cancels its siblings and
// never turns into an error for the page.
// =============================================================================

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use crate::config::DelayRange;
use crate::error::FetchError;

/// One remote item waiting to be resolved and saved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemTask {
    /// 1-based position in the gallery; also the file name stem
    pub sequence_index: usize,
    pub item_page_url: String,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PageReport {
    pub saved: usize,
    pub failed: usize,
}

pub struct FetchScheduler {
    gate: Arc<Semaphore>,
    politeness: DelayRange,
}

impl FetchScheduler {
    pub fn new(max_parallel: usize, politeness: DelayRange) -> Self {
        Self {
            gate: Arc::new(Semaphore::new(max_parallel)),
            politeness,
        }
    }

    // Runs `work` once per task, at most `max_parallel` at a time, and
    // returns when all of them have finished.
    //
    // `work` builds the unit for a task (resolve + download + save) and
    // yields the saved path.
    pub async fn run_page<F, Fut>(&self, tasks: Vec<ItemTask>, work: F) -> PageReport
    where
        F: Fn(ItemTask) -> Fut,
        Fut: Future<Output = Result<PathBuf, FetchError>> + Send + 'static,
    {
        let mut handles = Vec::with_capacity(tasks.len());

        for task in tasks {
            // Waits here while `max_parallel` units are already running
            let permit = match self.gate.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    // Only happens if the gate was closed, which nothing does
                    error!("admission gate closed, not admitting further items");
                    break;
                }
            };

            let sequence_index = task.sequence_index;
            debug!(sequence_index, url = %task.item_page_url, "admitting item");
            let unit = work(task);
            handles.push(tokio::spawn(async move {
                let _permit = permit; // released when this task ends
                (sequence_index, unit.await)
            }));

            // Throttles admissions, not the units already in flight
            let pause = self.politeness.sample();
            debug!(pause_ms = pause.as_millis() as u64, "politeness pause");
            tokio::time::sleep(pause).await;
        }

        // Page barrier: nothing of the next page starts before this returns
        let mut report = PageReport::default();
        for joined in join_all(handles).await {
            match joined {
                Ok((sequence_index, Ok(path))) => {
                    info!(sequence_index, path = %path.display(), "image saved");
                    report.saved += 1;
                }
                Ok((sequence_index, Err(e))) => {
                    warn!(sequence_index, error = %e, "skipping item");
                    report.failed += 1;
                }
                Err(e) => {
                    warn!(error = %e, "fetch task panicked");
                    report.failed += 1;
                }
            }
        }

        report
    }
}

// -----------------------------------------------------------------------------
// BEGINNER NOTES:
//
// 1. Why acquire_owned() instead of acquire()?
//    - acquire() returns a permit that borrows the semaphore, so it cannot
//      move into a spawned task ('static)
//    - acquire_owned() needs an Arc<Semaphore> and returns a permit that owns
//      its handle, so the task can carry it
//
// 2. Where is the permit released?
//    - Nowhere explicitly: `let _permit = permit;` keeps it alive for the
//      task's whole body and dropping it gives the slot back (RAII)
//    - A panicking task is dropped by tokio too, so its slot also comes back
//
// 3. Why sleep in the submission loop and not inside the units?
//    - Sleeping in a unit would hold a slot while doing nothing
//    - Sleeping between submissions throttles how fast new requests start,
//      no matter how quickly earlier ones finish
//
// 4. What does join_all do?
//    - Waits for every JoinHandle and returns their results in order
//    - A JoinError means the task panicked or was cancelled
// -----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, Instant};

    fn tasks(count: usize) -> Vec<ItemTask> {
        (1..=count)
            .map(|i| ItemTask {
                sequence_index: i,
                item_page_url: format!("https://e-hentai.org/s/x/1-{}", i),
            })
            .collect()
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    #[tokio::test]
    async fn test_never_more_than_budget_in_flight() {
        let budget = 3;
        let count = 10;
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let finished = Arc::new(AtomicUsize::new(0));
        // Units block until the test hands out a release permit
        let release = Arc::new(Semaphore::new(0));

        let scheduler = FetchScheduler::new(budget, DelayRange::none());
        let run = {
            let (in_flight, peak, finished, release) =
                (in_flight.clone(), peak.clone(), finished.clone(), release.clone());
            tokio::spawn(async move {
                scheduler
                    .run_page(tasks(count), move |task| {
                        let (in_flight, peak, finished, release) =
                            (in_flight.clone(), peak.clone(), finished.clone(), release.clone());
                        async move {
                            let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                            peak.fetch_max(now, Ordering::SeqCst);
                            release.acquire().await.unwrap().forget();
                            in_flight.fetch_sub(1, Ordering::SeqCst);
                            finished.fetch_add(1, Ordering::SeqCst);
                            Ok::<_, FetchError>(PathBuf::from(format!("{}.jpg", task.sequence_index)))
                        }
                    })
                    .await
            })
        };

        wait_until(|| in_flight.load(Ordering::SeqCst) == budget).await;
        // Give the admission loop a chance to overrun the budget if it could
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(in_flight.load(Ordering::SeqCst), budget);
        assert!(!run.is_finished());

        // Release units one at a time
        for released in 1..=count {
            release.add_permits(1);
            wait_until(|| finished.load(Ordering::SeqCst) == released).await;
            assert!(in_flight.load(Ordering::SeqCst) <= budget);
        }

        let report = run.await.unwrap();
        assert_eq!(report, PageReport { saved: count, failed: 0 });
        assert_eq!(peak.load(Ordering::SeqCst), budget);
    }

    #[tokio::test]
    async fn test_returns_only_after_every_unit_finished() {
        let finished = Arc::new(AtomicUsize::new(0));
        let scheduler = FetchScheduler::new(2, DelayRange::none());

        let counter = finished.clone();
        let report = scheduler
            .run_page(tasks(5), move |task| {
                let counter = counter.clone();
                async move {
                    tokio::time::sleep(Duration::from_millis(10 * task.sequence_index as u64)).await;
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, FetchError>(PathBuf::from("x"))
                }
            })
            .await;

        assert_eq!(finished.load(Ordering::SeqCst), 5);
        assert_eq!(report.saved, 5);
    }

    #[tokio::test]
    async fn test_failures_do_not_stop_siblings() {
        let scheduler = FetchScheduler::new(2, DelayRange::none());
        let report = scheduler
            .run_page(tasks(5), |task| async move {
                if task.sequence_index == 3 {
                    Err(FetchError::Status {
                        url: task.item_page_url,
                        status: 503,
                    })
                } else {
                    Ok(PathBuf::from(format!("{}.jpg", task.sequence_index)))
                }
            })
            .await;

        assert_eq!(report, PageReport { saved: 4, failed: 1 });
    }

    #[tokio::test]
    async fn test_panicking_unit_releases_its_slot() {
        let scheduler = FetchScheduler::new(1, DelayRange::none());
        let report = scheduler
            .run_page(tasks(3), |task| async move {
                if task.sequence_index == 1 {
                    panic!("unit blew up");
                }
                Ok::<_, FetchError>(PathBuf::from("x"))
            })
            .await;

        assert_eq!(report, PageReport { saved: 2, failed: 1 });
    }

    #[tokio::test]
    async fn test_politeness_pause_after_every_submission() {
        let scheduler = FetchScheduler::new(5, DelayRange::new(0.05, 0.05));
        let started = Instant::now();
        let report = scheduler
            .run_page(tasks(3), |_| async { Ok::<_, FetchError>(PathBuf::from("x")) })
            .await;

        assert_eq!(report.saved, 3);
        // Three pauses, including one after the last submission
        assert!(started.elapsed() >= Duration::from_millis(150));
    }

    #[tokio::test]
    async fn test_back_to_back_pages_are_separated_by_a_pause() {
        let scheduler = FetchScheduler::new(5, DelayRange::new(0.05, 0.05));
        let last_start_of_first_page = Arc::new(std::sync::Mutex::new(None::<Instant>));

        let marker = last_start_of_first_page.clone();
        scheduler
            .run_page(tasks(1), move |_| {
                let marker = marker.clone();
                async move {
                    *marker.lock().unwrap() = Some(Instant::now());
                    Ok::<_, FetchError>(PathBuf::from("1.jpg"))
                }
            })
            .await;
        let first_of_next_page = Instant::now();

        let previous = last_start_of_first_page.lock().unwrap().unwrap();
        assert!(first_of_next_page - previous >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_empty_page_is_a_no_op() {
        let scheduler = FetchScheduler::new(5, DelayRange::new(1.0, 1.0));
        let started = Instant::now();
        let report = scheduler
            .run_page(Vec::new(), |_| async { Ok::<_, FetchError>(PathBuf::from("x")) })
            .await;
        assert_eq!(report, PageReport::default());
        assert!(started.elapsed() < Duration::from_millis(500));
    }
}
