//! Serialized FIFO request queue.
//!
//! A single worker task drains the queue one job at a time. Consecutive
//! admissions are at least `min_spacing` apart and a job runs to completion
//! before the next one is admitted, so at most one upstream call is ever
//! in flight.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

type Job = Pin<Box<dyn Future<Output = ()> + Send>>;

pub const DEFAULT_MIN_SPACING_MS: u64 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ScheduleError {
    /// The worker task has stopped; no further work can be admitted.
    #[error("request scheduler has stopped")]
    Closed,

    /// The job panicked. The worker keeps draining the queue.
    #[error("scheduled job panicked")]
    JobPanicked,
}

/// Handle to one queued unit of work.
///
/// Dropping a ticket does not cancel the work; it still runs when its turn
/// comes, only the result is discarded.
#[derive(Debug)]
pub struct Ticket<T> {
    rx: oneshot::Receiver<Result<T, ScheduleError>>,
}

impl<T> Ticket<T> {
    pub async fn wait(self) -> Result<T, ScheduleError> {
        self.rx.await.unwrap_or(Err(ScheduleError::Closed))
    }
}

#[derive(Debug, Clone)]
pub struct RequestScheduler {
    tx: mpsc::UnboundedSender<Job>,
}

impl RequestScheduler {
    /// Spawn the worker. Must be called from within a Tokio runtime.
    ///
    /// The worker exits once every clone of the scheduler is dropped and the
    /// queue is drained.
    pub fn new(min_spacing: Duration) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(drain(rx, min_spacing));
        Self { tx }
    }

    /// Enqueue `work` at the back of the queue.
    pub fn submit<F, T>(&self, work: F) -> Result<Ticket<T>, ScheduleError>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (done_tx, done_rx) = oneshot::channel();
        let job: Job = Box::pin(async move {
            // Own task, so a panicking job cannot take the worker down
            let output = tokio::spawn(work).await.map_err(|e| {
                tracing::error!("Scheduled weather request failed: {}", e);
                ScheduleError::JobPanicked
            });
            // Receiver gone means the caller lost interest
            let _ = done_tx.send(output);
        });
        self.tx.send(job).map_err(|_| ScheduleError::Closed)?;
        Ok(Ticket { rx: done_rx })
    }

    /// Enqueue `work` and wait for its result.
    pub async fn schedule<F, T>(&self, work: F) -> Result<T, ScheduleError>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        self.submit(work)?.wait().await
    }
}

async fn drain(mut rx: mpsc::UnboundedReceiver<Job>, min_spacing: Duration) {
    let mut last_admission: Option<Instant> = None;

    while let Some(job) = rx.recv().await {
        if let Some(last) = last_admission {
            tokio::time::sleep_until(last + min_spacing).await;
        }
        last_admission = Some(Instant::now());
        tracing::trace!("Admitted queued weather request");

        job.await;
    }

    tracing::debug!("Request scheduler stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use parking_lot::Mutex;

    #[tokio::test(start_paused = true)]
    async fn test_admissions_are_spaced_and_fifo() {
        let scheduler = RequestScheduler::new(Duration::from_secs(1));
        let log: Arc<Mutex<Vec<(usize, Instant)>>> = Arc::new(Mutex::new(Vec::new()));

        let tickets: Vec<_> = (0..5)
            .map(|i| {
                let log = log.clone();
                scheduler
                    .submit(async move {
                        log.lock().push((i, Instant::now()));
                        i
                    })
                    .unwrap()
            })
            .collect();

        for (i, ticket) in tickets.into_iter().enumerate() {
            assert_eq!(ticket.wait().await, Ok(i));
        }

        let log = log.lock();
        let order: Vec<usize> = log.iter().map(|(i, _)| *i).collect();
        assert_eq!(order, vec![0, 1, 2, 3, 4]);
        for pair in log.windows(2) {
            assert!(pair[1].1 - pair[0].1 >= Duration::from_secs(1));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_admission_is_immediate() {
        let scheduler = RequestScheduler::new(Duration::from_secs(5));
        let started = Instant::now();
        scheduler.schedule(async {}).await.unwrap();
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_only_one_job_in_flight() {
        let scheduler = RequestScheduler::new(Duration::from_millis(100));
        let spans: Arc<Mutex<Vec<(Instant, Instant)>>> = Arc::new(Mutex::new(Vec::new()));

        let tickets: Vec<_> = (0..3)
            .map(|_| {
                let spans = spans.clone();
                scheduler
                    .submit(async move {
                        let start = Instant::now();
                        tokio::time::sleep(Duration::from_secs(2)).await;
                        spans.lock().push((start, Instant::now()));
                    })
                    .unwrap()
            })
            .collect();

        for ticket in tickets {
            ticket.wait().await.unwrap();
        }

        let spans = spans.lock();
        assert_eq!(spans.len(), 3);
        for pair in spans.windows(2) {
            assert!(pair[1].0 >= pair[0].1, "next job started before previous finished");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_ticket_still_runs() {
        let scheduler = RequestScheduler::new(Duration::from_millis(10));
        let ran = Arc::new(AtomicBool::new(false));

        let flag = ran.clone();
        drop(
            scheduler
                .submit(async move { flag.store(true, Ordering::SeqCst) })
                .unwrap(),
        );

        scheduler.schedule(async {}).await.unwrap();
        assert!(ran.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_job_does_not_stop_worker() {
        let scheduler = RequestScheduler::new(Duration::from_millis(10));

        let failed = scheduler.schedule::<_, ()>(async { panic!("boom") }).await;
        assert_eq!(failed, Err(ScheduleError::JobPanicked));

        assert_eq!(scheduler.schedule(async { 7 }).await, Ok(7));
    }
}
