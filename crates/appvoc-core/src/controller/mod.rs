//! Orchestration loops, one per harvest type.
//!
//! Category controllers (ratings, reviews) take jobs from the [`Director`]
//! until none remain. The app-data controller works through search terms,
//! resuming each from its persisted [`Project`](crate::project::Project).
//! All of them stop early when the consecutive-failure breaker opens or the
//! cancellation token fires, leaving the job or project resumable.

mod appdata;
mod rating;
mod review;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

pub use appdata::AppDataController;
pub use rating::RatingController;
pub use review::ReviewController;

use crate::batch::Batch;
use crate::circuit_breaker::ConsecutiveFailureBreaker;
use crate::director::Director;
use crate::error::AppError;
use crate::harvest::{Harvester, Termination};
use crate::job::{ControllerKind, Job};
use crate::run::{JobRun, RunMetrics};
use crate::traits::{Entity, ItemStore, JobStore};

/// Events emitted by controllers for monitoring/logging.
#[derive(Debug, Clone)]
pub enum HarvestEvent<'a> {
    Locked {
        controller: ControllerKind,
    },
    /// A job run (or project session) began. `id` is the job or project id;
    /// `target` is its category or search term.
    RunStarted {
        controller: ControllerKind,
        id: Uuid,
        target: &'a str,
    },
    Progress {
        controller: ControllerKind,
        id: Uuid,
        target: &'a str,
        batches: u64,
        items: u64,
        errors: u64,
    },
    BatchFailed {
        controller: ControllerKind,
        id: Uuid,
        data_errors: u64,
        client_errors: u64,
        server_errors: u64,
        consecutive: u32,
    },
    CircuitOpen {
        controller: ControllerKind,
        id: Uuid,
        failures: u32,
    },
    RunEnded {
        controller: ControllerKind,
        id: Uuid,
        target: &'a str,
        complete: bool,
        items: u64,
        errors: u64,
        elapsed_seconds: f64,
    },
    NoMoreWork {
        controller: ControllerKind,
    },
}

/// Trait for receiving harvest events (decoupled logging).
pub trait HarvestReporter: Send + Sync {
    fn report(&self, event: HarvestEvent<'_>) {
        let _ = event;
    }
}

/// Reporter that uses the `tracing` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl HarvestReporter for TracingReporter {
    fn report(&self, event: HarvestEvent<'_>) {
        match event {
            HarvestEvent::Locked { controller } => {
                tracing::warn!(%controller, "Controller not authorized to run");
            }
            HarvestEvent::RunStarted {
                controller,
                id,
                target,
            } => {
                tracing::info!(%controller, %id, %target, "Run started");
            }
            HarvestEvent::Progress {
                controller,
                id,
                target,
                batches,
                items,
                errors,
            } => {
                tracing::info!(%controller, %id, %target, batches, items, errors, "Progress");
            }
            HarvestEvent::BatchFailed {
                controller,
                id,
                data_errors,
                client_errors,
                server_errors,
                consecutive,
            } => {
                tracing::debug!(
                    %controller,
                    %id,
                    data_errors,
                    client_errors,
                    server_errors,
                    consecutive,
                    "Batch failed"
                );
            }
            HarvestEvent::CircuitOpen {
                controller,
                id,
                failures,
            } => {
                tracing::warn!(%controller, %id, failures, "Circuit open, abandoning run");
            }
            HarvestEvent::RunEnded {
                controller,
                id,
                target,
                complete,
                items,
                errors,
                elapsed_seconds,
            } => {
                tracing::info!(
                    %controller,
                    %id,
                    %target,
                    complete,
                    items,
                    errors,
                    elapsed_seconds,
                    "Run ended"
                );
            }
            HarvestEvent::NoMoreWork { controller } => {
                tracing::info!(%controller, "No more work");
            }
        }
    }
}

/// True when the environment variable named after `controller` is `true`.
pub fn is_locked(controller: ControllerKind) -> bool {
    std::env::var(controller.as_str())
        .map(|v| v.trim().eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// What a controller accomplished in one invocation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HarvestSummary {
    /// Jobs or projects worked on.
    pub runs: u32,
    /// Jobs or projects completed.
    pub completed: u32,
    pub items: u64,
    pub errors: u64,
    /// The last run was abandoned by the breaker, by cancellation, or by a
    /// harvester that gave up after repeated failures.
    pub abandoned: bool,
}

/// Why a batch loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LoopExit {
    /// The harvester finished on its own.
    Finished(Option<Termination>),
    CircuitOpen,
    Cancelled,
}

impl LoopExit {
    /// The loop stopped before its harvester ran to the end.
    pub(crate) fn is_abandoned(&self) -> bool {
        !matches!(self, LoopExit::Finished(_))
    }

    /// The harvester ran out of remote records, as opposed to stopping on
    /// failures or a page limit.
    pub(crate) fn is_exhausted(&self) -> bool {
        matches!(self, LoopExit::Finished(Some(t)) if t.is_exhausted())
    }
}

/// Result of handling one batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Step {
    /// The batch was valid and its items are committed.
    Saved,
    Failed,
    Exit(LoopExit),
}

/// Classify a failed batch for the breaker and the event stream.
fn failure_reason<T>(batch: &Batch<T>) -> String {
    format!(
        "data_errors={} client_errors={} server_errors={}",
        batch.data_errors, batch.client_errors, batch.server_errors
    )
}

/// Shared per-job batch loop for category controllers.
pub(crate) struct JobLoop<'a, J: JobStore, R: HarvestReporter> {
    pub controller: ControllerKind,
    pub director: &'a Director<J>,
    pub reporter: &'a R,
    pub breaker: ConsecutiveFailureBreaker,
    pub cancel: &'a CancellationToken,
    pub verbose: u64,
    pub batches: u64,
}

impl<'a, J: JobStore, R: HarvestReporter> JobLoop<'a, J, R> {
    pub fn new(
        controller: ControllerKind,
        director: &'a Director<J>,
        reporter: &'a R,
        failure_threshold: u32,
        cancel: &'a CancellationToken,
        verbose: u64,
    ) -> Self {
        Self {
            controller,
            director,
            reporter,
            breaker: ConsecutiveFailureBreaker::new(controller.as_str(), failure_threshold),
            cancel,
            verbose: verbose.max(1),
            batches: 0,
        }
    }

    /// Pull every batch from `harvester`, persisting valid ones into `store`
    /// and folding all of them into `run`.
    pub async fn drain<H, S, M>(
        &mut self,
        job: &Job,
        harvester: &mut H,
        store: &S,
        run: &mut JobRun<M>,
    ) -> Result<LoopExit, AppError>
    where
        H: Harvester,
        H::Item: Entity,
        S: ItemStore<H::Item>,
        M: RunMetrics,
    {
        loop {
            if let Step::Exit(exit) = self.step(job, harvester, store, run).await? {
                return Ok(exit);
            }
        }
    }

    /// Handle a single batch from `harvester`.
    pub async fn step<H, S, M>(
        &mut self,
        job: &Job,
        harvester: &mut H,
        store: &S,
        run: &mut JobRun<M>,
    ) -> Result<Step, AppError>
    where
        H: Harvester,
        H::Item: Entity,
        S: ItemStore<H::Item>,
        M: RunMetrics,
    {
        if self.cancel.is_cancelled() {
            return Ok(Step::Exit(LoopExit::Cancelled));
        }
        let Some(mut batch) = harvester.next_batch().await else {
            return Ok(Step::Exit(LoopExit::Finished(harvester.termination())));
        };
        run.add(&batch);

        if batch.is_valid() {
            self.breaker.record_success();
            store.load(std::mem::take(&mut batch.items)).await?;
            store.save().await?;
            self.director.update_jobrun(&run.to_record()?).await?;

            self.batches += 1;
            if self.batches % self.verbose == 0 {
                self.reporter.report(HarvestEvent::Progress {
                    controller: self.controller,
                    id: job.id,
                    target: &job.category,
                    batches: self.batches,
                    items: run.metrics.items(),
                    errors: run.errors,
                });
            }
            return Ok(Step::Saved);
        }

        let tripped = self.breaker.record_failure(failure_reason(&batch));
        let consecutive = self.breaker.stats().consecutive_failures;
        self.reporter.report(HarvestEvent::BatchFailed {
            controller: self.controller,
            id: job.id,
            data_errors: batch.data_errors,
            client_errors: batch.client_errors,
            server_errors: batch.server_errors,
            consecutive,
        });
        if tripped {
            self.reporter.report(HarvestEvent::CircuitOpen {
                controller: self.controller,
                id: job.id,
                failures: consecutive,
            });
            return Ok(Step::Exit(LoopExit::CircuitOpen));
        }
        Ok(Step::Failed)
    }
}

/// Start `job` and open a persisted run for it.
pub(crate) async fn begin_run<J, M, R>(
    director: &Director<J>,
    reporter: &R,
    job: &mut Job,
) -> Result<JobRun<M>, AppError>
where
    J: JobStore,
    M: RunMetrics,
    R: HarvestReporter,
{
    job.start()?;
    director.update_job(job).await?;
    let run = JobRun::<M>::from_job(job);
    director.add_jobrun(&run.to_record()?).await?;
    reporter.report(HarvestEvent::RunStarted {
        controller: job.controller,
        id: job.id,
        target: &job.category,
    });
    Ok(run)
}

/// Close the run, complete the job if warranted, and persist both.
pub(crate) async fn finish_run<J, M, R>(
    director: &Director<J>,
    reporter: &R,
    job: &mut Job,
    run: &mut JobRun<M>,
    complete: bool,
    summary: &mut HarvestSummary,
) -> Result<(), AppError>
where
    J: JobStore,
    M: RunMetrics,
    R: HarvestReporter,
{
    run.end(complete);
    job.end(complete)?;
    director.update_jobrun(&run.to_record()?).await?;
    director.update_job(job).await?;

    summary.runs += 1;
    summary.items += run.metrics.items();
    summary.errors += run.errors;
    if complete {
        summary.completed += 1;
    }

    reporter.report(HarvestEvent::RunEnded {
        controller: job.controller,
        id: job.id,
        target: &job.category,
        complete,
        items: run.metrics.items(),
        errors: run.errors,
        elapsed_seconds: run.elapsed_seconds,
    });
    Ok(())
}
