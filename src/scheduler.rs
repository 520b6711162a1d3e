//! Job queue for sorting many source PDFs.
//!
//! [`JobScheduler`] is an owned object: build one per queue, share it behind
//! an `Arc`. Jobs run strictly one at a time in enqueue order, even when
//! several tasks call [`JobScheduler::run`] on the same scheduler. A failed
//! attempt is retried after a fixed pause until the attempt budget is spent.
//!
//! [`JobScheduler::reset`] clears pending jobs and bumps a generation
//! counter. A job already running is not interrupted; its result is
//! discarded when it finishes.
//!
//! Observers call [`JobScheduler::subscribe`] for a broadcast stream of
//! [`JobEvent`]s.

use crate::config::SchedulerConfig;
use crate::error::SortError;
use crate::output::SortOutput;
use crate::sort::SortContext;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{broadcast, Mutex as AsyncMutex};
use tokio::time::{sleep, Duration};
use tracing::{info, warn};

pub type JobId = u64;

/// Processes one queued input.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, input: &str) -> Result<SortOutput, SortError>;
}

#[async_trait]
impl JobHandler for SortContext {
    async fn handle(&self, input: &str) -> Result<SortOutput, SortError> {
        self.sort(input).await
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Running { attempt: u32 },
    Completed { success: usize, failed: usize },
    Failed { error: String },
    Discarded,
}

impl JobState {
    pub fn is_finished(&self) -> bool {
        matches!(
            self,
            JobState::Completed { .. } | JobState::Failed { .. } | JobState::Discarded
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobSnapshot {
    pub id: JobId,
    pub input: String,
    pub state: JobState,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobEvent {
    Queued { id: JobId, input: String },
    Started { id: JobId, attempt: u32 },
    Retrying { id: JobId, attempt: u32, error: String },
    Completed { id: JobId, success: usize, failed: usize },
    Failed { id: JobId, error: String },
    /// Finished after a reset; the result was dropped.
    Discarded { id: JobId },
    /// Pending jobs removed by [`JobScheduler::reset`].
    Reset { cleared: usize },
}

/// Totals for one [`JobScheduler::run`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub completed: usize,
    pub failed: usize,
    pub discarded: usize,
}

struct Job {
    input: String,
    state: JobState,
    generation: u64,
}

#[derive(Default)]
struct Queue {
    next_id: JobId,
    pending: VecDeque<JobId>,
    jobs: BTreeMap<JobId, Job>,
    outputs: HashMap<JobId, SortOutput>,
}

pub struct JobScheduler {
    config: SchedulerConfig,
    handler: Arc<dyn JobHandler>,
    queue: Mutex<Queue>,
    generation: AtomicU64,
    events: broadcast::Sender<JobEvent>,
    /// Held for the whole of [`JobScheduler::run`].
    running: AsyncMutex<()>,
}

enum Outcome {
    Completed,
    Failed,
    Discarded,
}

impl JobScheduler {
    pub fn new(config: SchedulerConfig, handler: Arc<dyn JobHandler>) -> Result<Self, SortError> {
        config.validate()?;
        let (events, _) = broadcast::channel(256);
        Ok(Self {
            config,
            handler,
            queue: Mutex::new(Queue::default()),
            generation: AtomicU64::new(0),
            events,
            running: AsyncMutex::new(()),
        })
    }

    /// Scheduler over a [`SortContext`]. The context's rate gate is replaced
    /// by one honouring `config.rate_limit_interval_ms` for the whole queue.
    pub fn for_context(config: SchedulerConfig, context: SortContext) -> Result<Self, SortError> {
        let interval = Duration::from_millis(config.rate_limit_interval_ms);
        let context = context.with_rate_limit(interval);
        Self::new(config, Arc::new(context))
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.events.subscribe()
    }

    pub fn enqueue(&self, input: impl Into<String>) -> JobId {
        let input = input.into();
        let id = {
            let mut queue = self.lock();
            let id = queue.next_id;
            queue.next_id += 1;
            queue.jobs.insert(
                id,
                Job {
                    input: input.clone(),
                    state: JobState::Pending,
                    generation: self.generation.load(Ordering::SeqCst),
                },
            );
            queue.pending.push_back(id);
            id
        };
        self.emit(JobEvent::Queued { id, input });
        id
    }

    /// Drop every pending job and disown the running one.
    pub fn reset(&self) -> usize {
        self.generation.fetch_add(1, Ordering::SeqCst);
        let cleared = {
            let mut queue = self.lock();
            let pending: Vec<JobId> = queue.pending.drain(..).collect();
            for id in &pending {
                queue.jobs.remove(id);
            }
            pending.len()
        };
        info!("Scheduler reset: {} pending jobs cleared", cleared);
        self.emit(JobEvent::Reset { cleared });
        cleared
    }

    /// Every known job, in enqueue order.
    pub fn snapshot(&self) -> Vec<JobSnapshot> {
        self.lock()
            .jobs
            .iter()
            .map(|(&id, job)| JobSnapshot {
                id,
                input: job.input.clone(),
                state: job.state.clone(),
            })
            .collect()
    }

    pub fn state(&self, id: JobId) -> Option<JobState> {
        self.lock().jobs.get(&id).map(|j| j.state.clone())
    }

    /// Take the output of a completed job.
    pub fn take_output(&self, id: JobId) -> Option<SortOutput> {
        self.lock().outputs.remove(&id)
    }

    /// Process queued jobs one at a time until the queue is empty.
    ///
    /// A second concurrent call waits for the first to finish, then drains
    /// whatever is still queued.
    pub async fn run(&self) -> RunSummary {
        let _running = self.running.lock().await;
        let mut summary = RunSummary::default();
        while let Some((id, input, generation)) = self.next_job() {
            match self.process(id, &input, generation).await {
                Outcome::Completed => summary.completed += 1,
                Outcome::Failed => summary.failed += 1,
                Outcome::Discarded => summary.discarded += 1,
            }
        }
        summary
    }

    fn next_job(&self) -> Option<(JobId, String, u64)> {
        let mut queue = self.lock();
        let id = queue.pending.pop_front()?;
        let job = queue.jobs.get(&id)?;
        Some((id, job.input.clone(), job.generation))
    }

    async fn process(&self, id: JobId, input: &str, generation: u64) -> Outcome {
        let max_attempts = self.config.max_attempts.max(1);

        for attempt in 1..=max_attempts {
            if self.is_stale(generation) {
                return self.discard(id);
            }
            self.set_state(id, JobState::Running { attempt });
            self.emit(JobEvent::Started { id, attempt });

            let result = self.handler.handle(input).await;
            if self.is_stale(generation) {
                return self.discard(id);
            }

            match result {
                Ok(output) => {
                    let (success, failed) = (output.report.success, output.report.failed);
                    {
                        let mut queue = self.lock();
                        if let Some(job) = queue.jobs.get_mut(&id) {
                            job.state = JobState::Completed { success, failed };
                        }
                        queue.outputs.insert(id, output);
                    }
                    info!("Job {} completed: {} written, {} failed", id, success, failed);
                    self.emit(JobEvent::Completed { id, success, failed });
                    return Outcome::Completed;
                }
                Err(e) if attempt < max_attempts => {
                    warn!(
                        "Job {} attempt {}/{} failed: {}; retrying in {}ms",
                        id, attempt, max_attempts, e, self.config.retry_delay_ms
                    );
                    self.emit(JobEvent::Retrying {
                        id,
                        attempt,
                        error: e.to_string(),
                    });
                    sleep(Duration::from_millis(self.config.retry_delay_ms)).await;
                }
                Err(e) => {
                    let error = e.to_string();
                    warn!("Job {} failed after {} attempts: {}", id, max_attempts, error);
                    self.set_state(id, JobState::Failed { error: error.clone() });
                    self.emit(JobEvent::Failed { id, error });
                    return Outcome::Failed;
                }
            }
        }
        Outcome::Failed
    }

    fn discard(&self, id: JobId) -> Outcome {
        self.set_state(id, JobState::Discarded);
        self.emit(JobEvent::Discarded { id });
        Outcome::Discarded
    }

    fn is_stale(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) != generation
    }

    fn set_state(&self, id: JobId, state: JobState) {
        if let Some(job) = self.lock().jobs.get_mut(&id) {
            job.state = state;
        }
    }

    fn emit(&self, event: JobEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn lock(&self) -> MutexGuard<'_, Queue> {
        self.queue.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::{SortStats, WriteReport};
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Notify;

    fn output(name: &str) -> SortOutput {
        SortOutput {
            source_file_name: name.to_string(),
            pages: Vec::new(),
            groups: Vec::new(),
            report: WriteReport {
                success: 2,
                ..Default::default()
            },
            stats: SortStats::default(),
        }
    }

    fn fast() -> SchedulerConfig {
        SchedulerConfig {
            retry_delay_ms: 1,
            ..Default::default()
        }
    }

    /// Fails inputs starting with "bad", counting every call.
    #[derive(Default)]
    struct Scripted {
        calls: AtomicUsize,
        order: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl JobHandler for Scripted {
        async fn handle(&self, input: &str) -> Result<SortOutput, SortError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.order.lock().unwrap().push(input.to_string());
            if input.starts_with("bad") {
                return Err(SortError::Classifier {
                    detail: "model unavailable".into(),
                });
            }
            Ok(output(input))
        }
    }

    #[tokio::test]
    async fn jobs_run_in_order_and_failures_use_the_attempt_budget() {
        let handler = Arc::new(Scripted::default());
        let scheduler = JobScheduler::new(fast(), handler.clone()).unwrap();
        let mut events = scheduler.subscribe();

        let a = scheduler.enqueue("a.pdf");
        let bad = scheduler.enqueue("bad.pdf");
        let c = scheduler.enqueue("c.pdf");

        let summary = scheduler.run().await;
        assert_eq!(
            summary,
            RunSummary {
                completed: 2,
                failed: 1,
                discarded: 0
            }
        );
        assert_eq!(handler.calls.load(Ordering::SeqCst), 1 + 3 + 1);
        assert_eq!(
            *handler.order.lock().unwrap(),
            vec!["a.pdf", "bad.pdf", "bad.pdf", "bad.pdf", "c.pdf"]
        );

        assert!(matches!(scheduler.state(a), Some(JobState::Completed { success: 2, .. })));
        match scheduler.state(bad) {
            Some(JobState::Failed { error }) => assert!(error.contains("model unavailable")),
            other => panic!("unexpected state {other:?}"),
        }
        assert_eq!(scheduler.take_output(c).unwrap().source_file_name, "c.pdf");

        let mut retries = 0;
        while let Ok(event) = events.try_recv() {
            if matches!(event, JobEvent::Retrying { id, .. } if id == bad) {
                retries += 1;
            }
        }
        assert_eq!(retries, 2);
    }

    /// Blocks until released so a reset can land mid-job.
    struct Gated {
        started: Notify,
        release: Notify,
    }

    #[async_trait]
    impl JobHandler for Gated {
        async fn handle(&self, input: &str) -> Result<SortOutput, SortError> {
            self.started.notify_one();
            self.release.notified().await;
            Ok(output(input))
        }
    }

    #[tokio::test]
    async fn reset_clears_pending_and_discards_in_flight() {
        let handler = Arc::new(Gated {
            started: Notify::new(),
            release: Notify::new(),
        });
        let scheduler = Arc::new(JobScheduler::new(fast(), handler.clone()).unwrap());
        let first = scheduler.enqueue("one.pdf");
        scheduler.enqueue("two.pdf");
        scheduler.enqueue("three.pdf");

        let runner = {
            let scheduler = Arc::clone(&scheduler);
            tokio::spawn(async move { scheduler.run().await })
        };

        handler.started.notified().await;
        assert_eq!(scheduler.reset(), 2);
        handler.release.notify_one();

        let summary = runner.await.unwrap();
        assert_eq!(summary.discarded, 1);
        assert_eq!(summary.completed, 0);
        assert_eq!(scheduler.state(first), Some(JobState::Discarded));
        assert!(scheduler.take_output(first).is_none());
        assert_eq!(scheduler.snapshot().len(), 1);
    }

    /// Sleeps while tracking how many calls overlap.
    #[derive(Default)]
    struct Slow {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl JobHandler for Slow {
        async fn handle(&self, input: &str) -> Result<SortOutput, SortError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            sleep(Duration::from_millis(20)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(output(input))
        }
    }

    #[tokio::test]
    async fn overlapping_runs_still_process_one_job_at_a_time() {
        let handler = Arc::new(Slow::default());
        let scheduler = JobScheduler::new(fast(), handler.clone()).unwrap();
        for name in ["a.pdf", "b.pdf", "c.pdf", "d.pdf"] {
            scheduler.enqueue(name);
        }

        let (first, second) = tokio::join!(scheduler.run(), scheduler.run());

        assert_eq!(handler.peak.load(Ordering::SeqCst), 1);
        assert_eq!(first.completed + second.completed, 4);
    }

    #[test]
    fn rejects_parallel_configuration() {
        let config = SchedulerConfig {
            max_concurrency: 4,
            ..Default::default()
        };
        assert!(JobScheduler::new(config, Arc::new(Scripted::default())).is_err());
    }
}
