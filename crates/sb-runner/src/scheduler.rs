//! Experiment scheduler: runs every trial of a plan on a bounded worker pool.
//!
//! Device slots are computed from input order before anything starts;
//! outcomes arrive in completion order and are re-keyed by trial name, so the
//! returned set does not depend on how the trials interleaved.

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use std::any::Any;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, error, info};

use sb_types::{
    BenchResult, DeviceSlot, PlanError, TrialFailure, TrialOutcome, TrialSpec, TrialState,
};

use crate::allocator::DeviceAllocation;
use crate::config::{DeviceAssignment, RunnerConfig};
use crate::console::Console;
use crate::executor::TrialExecutor;

/// Bounds on the extra time an executor gets past the trial timeout before
/// the scheduler gives up on it and records a timeout itself.
pub const MIN_TIMEOUT_GRACE: Duration = Duration::from_secs(1);
pub const MAX_TIMEOUT_GRACE: Duration = Duration::from_secs(5);

/// Grace past `timeout`: a tenth of it, clamped to
/// `[MIN_TIMEOUT_GRACE, MAX_TIMEOUT_GRACE]`.
pub fn timeout_grace(timeout: Duration) -> Duration {
    (timeout / 10).clamp(MIN_TIMEOUT_GRACE, MAX_TIMEOUT_GRACE)
}

/// When the scheduler stops waiting on an executor. Saturates instead of
/// overflowing for huge timeouts.
pub fn backstop_deadline(timeout: Duration) -> Duration {
    timeout.saturating_add(timeout_grace(timeout))
}

/// Everything a finished run produced.
#[derive(Debug, Clone, Serialize)]
pub struct RunResults {
    /// One outcome per submitted spec, in submission order.
    pub outcomes: Vec<TrialOutcome>,
    /// Observed wall-clock time for the whole batch.
    pub elapsed_seconds: f64,
    pub worker_count: usize,
}

impl RunResults {
    pub fn success_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.succeeded()).count()
    }

    /// Sum of trial durations: what the run would have cost sequentially.
    pub fn sequential_seconds(&self) -> f64 {
        self.outcomes.iter().map(|o| o.duration_seconds()).sum()
    }

    pub fn get(&self, trial_name: &str) -> Option<&TrialOutcome> {
        self.outcomes.iter().find(|o| o.name() == trial_name)
    }
}

/// Per-state trial counts at one instant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StateCounts {
    pub pending: usize,
    pub running: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub timed_out: usize,
    pub launch_error: usize,
}

impl StateCounts {
    pub fn finished(&self) -> usize {
        self.succeeded + self.failed + self.timed_out + self.launch_error
    }
}

struct Job {
    spec: TrialSpec,
    slot: DeviceSlot,
}

/// Bounded-concurrency trial scheduler.
pub struct Scheduler {
    config: RunnerConfig,
    executor: Arc<dyn TrialExecutor>,
    console: Console,
    board: Arc<DashMap<String, TrialState>>,
}

impl Scheduler {
    /// Fails only when the configuration cannot back a worker pool.
    pub fn new(
        config: RunnerConfig,
        executor: Arc<dyn TrialExecutor>,
        console: Console,
    ) -> BenchResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            executor,
            console,
            board: Arc::new(DashMap::new()),
        })
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Current state of a trial by name.
    pub fn state_of(&self, trial_name: &str) -> Option<TrialState> {
        self.board.get(trial_name).map(|s| *s)
    }

    pub fn snapshot(&self) -> StateCounts {
        let mut counts = StateCounts::default();
        for entry in self.board.iter() {
            match *entry.value() {
                TrialState::Pending => counts.pending += 1,
                TrialState::Running => counts.running += 1,
                TrialState::Succeeded => counts.succeeded += 1,
                TrialState::Failed => counts.failed += 1,
                TrialState::TimedOut => counts.timed_out += 1,
                TrialState::LaunchError => counts.launch_error += 1,
            }
        }
        counts
    }

    /// Run every spec once and return exactly one outcome per spec.
    ///
    /// Trial failures never surface as `Err`; the only error is a batch with
    /// duplicate trial names.
    pub async fn run(&self, specs: Vec<TrialSpec>) -> BenchResult<RunResults> {
        let mut seen = HashSet::new();
        for spec in &specs {
            if !seen.insert(spec.name()) {
                return Err(PlanError::DuplicateTrial {
                    name: spec.name().to_string(),
                }
                .into());
            }
        }

        let workers = self.config.worker_count;
        let allocation = DeviceAllocation::round_robin(&specs, workers);

        self.board.clear();
        for spec in &specs {
            self.board.insert(spec.name().to_string(), TrialState::Pending);
        }
        self.console.begin(specs.len());
        info!(trials = specs.len(), workers, "starting run");

        let started = Instant::now();
        let outcomes = if workers <= 1 {
            self.run_sequential(specs).await
        } else {
            self.run_pool(specs, allocation).await
        };
        let elapsed_seconds = started.elapsed().as_secs_f64();

        let results = RunResults {
            outcomes,
            elapsed_seconds,
            worker_count: workers,
        };
        info!(
            succeeded = results.success_count(),
            total = results.outcomes.len(),
            elapsed_seconds,
            "run finished"
        );
        Ok(results)
    }

    async fn run_sequential(&self, specs: Vec<TrialSpec>) -> Vec<TrialOutcome> {
        let total = specs.len();
        let mut outcomes = Vec::with_capacity(total);
        for (i, spec) in specs.into_iter().enumerate() {
            self.console.line(format!("[progress {}/{}]", i + 1, total));
            let outcome = run_trial(
                &self.config,
                Arc::clone(&self.executor),
                &self.board,
                spec,
                DeviceSlot(0),
            )
            .await;
            self.console.complete(outcome.name(), None);
            outcomes.push(outcome);
        }
        outcomes
    }

    async fn run_pool(&self, specs: Vec<TrialSpec>, allocation: DeviceAllocation) -> Vec<TrialOutcome> {
        let order: Vec<TrialSpec> = specs.clone();
        let queue: VecDeque<Job> = specs
            .into_iter()
            .zip(allocation.assignments.iter())
            .map(|(spec, (_, slot))| Job { spec, slot: *slot })
            .collect();
        let queue = Arc::new(Mutex::new(queue));
        let (tx, mut rx) = mpsc::unbounded_channel::<TrialOutcome>();

        for worker in 0..allocation.num_workers {
            let queue = Arc::clone(&queue);
            let tx = tx.clone();
            let executor = Arc::clone(&self.executor);
            let board = Arc::clone(&self.board);
            let console = self.console.clone();
            let config = self.config.clone();

            tokio::spawn(async move {
                loop {
                    let next = queue.lock().pop_front();
                    let Some(job) = next else {
                        break;
                    };
                    let slot = match config.device_assignment {
                        DeviceAssignment::RoundRobin => job.slot,
                        DeviceAssignment::PerWorker => DeviceSlot(worker),
                    };
                    let outcome =
                        run_trial(&config, Arc::clone(&executor), &board, job.spec, slot).await;
                    console.complete(outcome.name(), None);
                    if tx.send(outcome).is_err() {
                        break;
                    }
                }
                debug!(worker, "worker drained queue");
            });
        }
        drop(tx);

        let mut by_name: HashMap<String, TrialOutcome> = HashMap::new();
        while let Some(outcome) = rx.recv().await {
            by_name.insert(outcome.name().to_string(), outcome);
        }

        // A worker that died without reporting still owes its trials an outcome.
        order
            .into_iter()
            .enumerate()
            .map(|(index, spec)| match by_name.remove(spec.name()) {
                Some(outcome) => outcome,
                None => {
                    error!(trial = %spec.name(), "no outcome reported; recording failure");
                    let slot = allocation.assignments[index].1;
                    let artifact = self.config.artifact_path(spec.name());
                    let outcome = TrialOutcome::failure(
                        spec,
                        slot,
                        0.0,
                        artifact,
                        TrialFailure::Internal("worker exited before reporting".into()),
                    );
                    self.board.insert(outcome.name().to_string(), outcome.state());
                    outcome
                }
            })
            .collect()
    }
}

/// Run one trial behind a task boundary and a backstop deadline.
///
/// Panics and executors that overrun [`backstop_deadline`] are turned into
/// failed outcomes for this trial alone.
async fn run_trial(
    config: &RunnerConfig,
    executor: Arc<dyn TrialExecutor>,
    board: &DashMap<String, TrialState>,
    spec: TrialSpec,
    slot: DeviceSlot,
) -> TrialOutcome {
    board.insert(spec.name().to_string(), TrialState::Running);
    let started = Instant::now();

    let task_spec = spec.clone();
    let handle = tokio::spawn(async move { executor.execute(&task_spec, slot).await });
    let abort = handle.abort_handle();

    let outcome = match tokio::time::timeout(backstop_deadline(config.trial_timeout()), handle).await {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(join_err)) => {
            let message = if join_err.is_panic() {
                panic_message(join_err.into_panic())
            } else {
                "trial task cancelled".to_string()
            };
            error!(trial = %spec.name(), %message, "executor faulted");
            let artifact = config.artifact_path(spec.name());
            TrialOutcome::failure(
                spec,
                slot,
                started.elapsed().as_secs_f64(),
                artifact,
                TrialFailure::Internal(message),
            )
        }
        Err(_) => {
            // Dropping the executor future kills its child process.
            abort.abort();
            error!(trial = %spec.name(), "executor overran its deadline");
            let artifact = config.artifact_path(spec.name());
            TrialOutcome::failure(
                spec,
                slot,
                started.elapsed().as_secs_f64(),
                artifact,
                TrialFailure::Timeout,
            )
        }
    };

    board.insert(outcome.name().to_string(), outcome.state());
    outcome
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "executor panicked".to_string()
    }
}
