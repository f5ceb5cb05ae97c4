//! Bounded-concurrency batch execution.
//!
//! Items are split into consecutive chunks of at most `batch_size`. All items
//! of a chunk run concurrently; the next chunk starts only after every item
//! of the current one has resolved. This caps in-flight remote calls at
//! `batch_size` against a store with unknown rate limits.
//!
//! A failing item is recorded and never cancels its siblings or later chunks.

use crate::config::BatchConfig;
use crate::model::MetadataObject;
use futures::future::join_all;
use serde::Serialize;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Something the scheduler can identify in its failure report.
pub trait BatchItem {
    fn item_id(&self) -> &str;
    fn item_name(&self) -> String;
}

impl BatchItem for MetadataObject {
    fn item_id(&self) -> &str {
        &self.id
    }

    fn item_name(&self) -> String {
        self.display_name()
    }
}

/// One failed item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemFailure {
    pub id: String,
    pub name: String,
    pub message: String,
}

/// Tally of a batch run.
#[derive(Debug, Clone)]
pub struct AggregateResult<O> {
    pub succeeded: usize,
    pub failed: usize,
    /// Outputs of successful items, in input order.
    pub outputs: Vec<O>,
    pub failures: Vec<ItemFailure>,
}

impl<O> Default for AggregateResult<O> {
    fn default() -> Self {
        Self {
            succeeded: 0,
            failed: 0,
            outputs: Vec::new(),
            failures: Vec::new(),
        }
    }
}

impl<O> AggregateResult<O> {
    pub fn total(&self) -> usize {
        self.succeeded + self.failed
    }
}

/// Progress snapshot emitted after each chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BatchProgress {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    /// 1-based index of the chunk that just finished.
    pub chunk_index: usize,
    pub chunk_count: usize,
}

impl BatchProgress {
    /// Overall progress (0.0-1.0).
    pub fn fraction(&self) -> f32 {
        if self.total == 0 {
            1.0
        } else {
            self.completed as f32 / self.total as f32
        }
    }
}

/// Runs work items in sequential chunks of concurrent futures.
#[derive(Debug, Clone)]
pub struct BatchScheduler {
    batch_size: usize,
    item_timeout: Option<Duration>,
}

impl Default for BatchScheduler {
    fn default() -> Self {
        Self::new(BatchConfig::BATCH_SIZE)
    }
}

impl BatchScheduler {
    /// A `batch_size` of zero is treated as one.
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
            item_timeout: None,
        }
    }

    /// Fail any single item that takes longer than `timeout`.
    pub fn with_item_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.item_timeout = timeout;
        self
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Run `worker` over every item.
    pub async fn run<I, O, E, F, Fut>(&self, items: Vec<I>, worker: F) -> AggregateResult<O>
    where
        I: BatchItem,
        E: std::fmt::Display,
        F: Fn(I) -> Fut,
        Fut: Future<Output = Result<O, E>>,
    {
        self.run_with_progress(items, worker, |_| {}).await
    }

    /// Run `worker` over every item, reporting progress after each chunk.
    pub async fn run_with_progress<I, O, E, F, Fut>(
        &self,
        items: Vec<I>,
        worker: F,
        mut on_progress: impl FnMut(&BatchProgress),
    ) -> AggregateResult<O>
    where
        I: BatchItem,
        E: std::fmt::Display,
        F: Fn(I) -> Fut,
        Fut: Future<Output = Result<O, E>>,
    {
        let total = items.len();
        let chunk_count = total.div_ceil(self.batch_size);
        let mut result = AggregateResult::default();
        let mut remaining = items.into_iter();

        for chunk_index in 1..=chunk_count {
            let chunk: Vec<I> = remaining.by_ref().take(self.batch_size).collect();
            debug!(
                "Running chunk {}/{} ({} items)",
                chunk_index,
                chunk_count,
                chunk.len()
            );

            let timeout = self.item_timeout;
            let settled = join_all(chunk.into_iter().map(|item| {
                let id = item.item_id().to_string();
                let name = item.item_name();
                let work = worker(item);
                async move {
                    let outcome = match timeout {
                        Some(limit) => match tokio::time::timeout(limit, work).await {
                            Ok(outcome) => outcome.map_err(|e| e.to_string()),
                            Err(_) => Err(format!("Timed out after {:?}", limit)),
                        },
                        None => work.await.map_err(|e| e.to_string()),
                    };
                    (id, name, outcome)
                }
            }))
            .await;

            for (id, name, outcome) in settled {
                match outcome {
                    Ok(output) => {
                        result.succeeded += 1;
                        result.outputs.push(output);
                    }
                    Err(message) => {
                        warn!("Item {} ({}) failed: {}", id, name, message);
                        result.failed += 1;
                        result.failures.push(ItemFailure { id, name, message });
                    }
                }
            }

            on_progress(&BatchProgress {
                total,
                completed: result.total(),
                failed: result.failed,
                chunk_index,
                chunk_count,
            });
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone)]
    struct Job {
        id: String,
        delay: Duration,
        fail: bool,
    }

    impl Job {
        fn new(id: &str) -> Self {
            Self {
                id: id.to_string(),
                delay: Duration::from_millis(10),
                fail: false,
            }
        }

        fn slow(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        fn failing(mut self) -> Self {
            self.fail = true;
            self
        }
    }

    impl BatchItem for Job {
        fn item_id(&self) -> &str {
            &self.id
        }

        fn item_name(&self) -> String {
            format!("job {}", self.id)
        }
    }

    type Log = Arc<Mutex<Vec<String>>>;

    fn position(log: &[String], entry: &str) -> usize {
        log.iter()
            .position(|e| e == entry)
            .unwrap_or_else(|| panic!("missing log entry {}", entry))
    }

    #[tokio::test(start_paused = true)]
    async fn test_chunk_boundary_is_a_barrier() {
        let log: Log = Arc::default();
        let jobs = vec![
            Job::new("1").failing(),
            Job::new("2").slow(Duration::from_secs(5)),
            Job::new("3").slow(Duration::from_secs(30)),
            Job::new("4"),
            Job::new("5"),
        ];

        let scheduler = BatchScheduler::new(2);
        let result = scheduler
            .run(jobs, |job: Job| {
                let log = log.clone();
                async move {
                    log.lock().unwrap().push(format!("start {}", job.id));
                    tokio::time::sleep(job.delay).await;
                    log.lock().unwrap().push(format!("end {}", job.id));
                    if job.fail {
                        Err(format!("job {} exploded", job.id))
                    } else {
                        Ok(job.id)
                    }
                }
            })
            .await;

        let log = log.lock().unwrap().clone();
        assert!(position(&log, "end 1") < position(&log, "start 3"));
        assert!(position(&log, "end 2") < position(&log, "start 3"));
        assert!(position(&log, "end 3") < position(&log, "start 5"));
        assert!(position(&log, "start 2") < position(&log, "end 1"));

        assert_eq!(result.succeeded, 4);
        assert_eq!(result.failed, 1);
        assert_eq!(result.outputs, vec!["2", "3", "4", "5"]);
        assert_eq!(
            result.failures,
            vec![ItemFailure {
                id: "1".into(),
                name: "job 1".into(),
                message: "job 1 exploded".into(),
            }]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_items_in_a_chunk_run_concurrently() {
        let jobs: Vec<Job> = (0..4)
            .map(|i| Job::new(&i.to_string()).slow(Duration::from_secs(10)))
            .collect();

        let started = tokio::time::Instant::now();
        let result = BatchScheduler::new(4)
            .run(jobs, |job: Job| async move {
                tokio::time::sleep(job.delay).await;
                Ok::<_, String>(())
            })
            .await;

        assert_eq!(result.succeeded, 4);
        assert!(started.elapsed() < Duration::from_secs(11));
    }

    #[tokio::test(start_paused = true)]
    async fn test_item_timeout_becomes_failure() {
        let jobs = vec![
            Job::new("fast"),
            Job::new("hung").slow(Duration::from_secs(3600)),
        ];

        let result = BatchScheduler::new(5)
            .with_item_timeout(Some(Duration::from_secs(1)))
            .run(jobs, |job: Job| async move {
                tokio::time::sleep(job.delay).await;
                Ok::<_, String>(job.id)
            })
            .await;

        assert_eq!(result.outputs, vec!["fast"]);
        assert_eq!(result.failures.len(), 1);
        assert_eq!(result.failures[0].id, "hung");
        assert!(result.failures[0].message.starts_with("Timed out"));
    }

    #[tokio::test]
    async fn test_progress_reported_per_chunk() {
        let jobs: Vec<Job> = (0..5).map(|i| Job::new(&i.to_string())).collect();
        let mut seen = Vec::new();

        let result = BatchScheduler::new(2)
            .run_with_progress(
                jobs,
                |job: Job| async move {
                    if job.id == "4" {
                        Err("nope")
                    } else {
                        Ok(())
                    }
                },
                |progress| seen.push(*progress),
            )
            .await;

        assert_eq!(result.total(), 5);
        assert_eq!(seen.len(), 3);
        assert_eq!(seen[0].completed, 2);
        assert_eq!(seen[2].completed, 5);
        assert_eq!(seen[2].failed, 1);
        assert_eq!(seen[2].chunk_count, 3);
        assert!((seen[2].fraction() - 1.0).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn test_empty_input_and_zero_batch_size() {
        let scheduler = BatchScheduler::new(0);
        assert_eq!(scheduler.batch_size(), 1);

        let result = scheduler
            .run(Vec::<Job>::new(), |_job: Job| async { Ok::<_, String>(()) })
            .await;
        assert_eq!(result.total(), 0);
    }
}
