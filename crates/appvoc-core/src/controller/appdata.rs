use chrono::Utc;
use tokio_util::sync::CancellationToken;

use super::{HarvestEvent, HarvestReporter, HarvestSummary, LoopExit, failure_reason, is_locked};
use crate::circuit_breaker::ConsecutiveFailureBreaker;
use crate::config::HarvestConfig;
use crate::error::AppError;
use crate::harvest::{Harvester, SEARCH_URL, SearchHarvester};
use crate::job::ControllerKind;
use crate::models::App;
use crate::project::Project;
use crate::traits::{Fetcher, ItemStore, ProjectStore};

/// Harvests app listings by search term, resuming each term's project from
/// the last page it covered.
pub struct AppDataController<P, A, F>
where
    P: ProjectStore,
    A: ItemStore<App>,
    F: Fetcher,
{
    projects: P,
    apps: A,
    fetcher: F,
    config: HarvestConfig,
    url: String,
    lock_check: fn(ControllerKind) -> bool,
}

impl<P, A, F> AppDataController<P, A, F>
where
    P: ProjectStore,
    A: ItemStore<App>,
    F: Fetcher,
{
    pub const KIND: ControllerKind = ControllerKind::AppData;

    pub fn new(projects: P, apps: A, fetcher: F, config: HarvestConfig) -> Self {
        Self {
            projects,
            apps,
            fetcher,
            config,
            url: SEARCH_URL.to_string(),
            lock_check: is_locked,
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn with_lock_check(mut self, check: fn(ControllerKind) -> bool) -> Self {
        self.lock_check = check;
        self
    }

    /// Harvest each term in turn. Stops at the first abandoned project.
    pub async fn run<R: HarvestReporter>(
        &self,
        terms: &[String],
        cancel_token: CancellationToken,
        reporter: &R,
    ) -> Result<HarvestSummary, AppError> {
        let mut summary = HarvestSummary::default();
        if (self.lock_check)(Self::KIND) {
            reporter.report(HarvestEvent::Locked {
                controller: Self::KIND,
            });
            return Ok(summary);
        }

        for term in terms {
            if cancel_token.is_cancelled() {
                break;
            }
            let exit = self
                .execute_project(term, &cancel_token, reporter, &mut summary)
                .await?;
            if exit.is_abandoned() {
                summary.abandoned = true;
                break;
            }
        }

        reporter.report(HarvestEvent::NoMoreWork {
            controller: Self::KIND,
        });
        Ok(summary)
    }

    async fn get_or_start_project(&self, term: &str) -> Result<Project, AppError> {
        if let Some(project) = self.projects.get_project(Self::KIND, term).await? {
            tracing::info!(%term, apps = project.apps, status = %project.status, "Retrieved project");
            return Ok(project);
        }
        let mut project = Project::new(Self::KIND, term, self.config.page_size as i64);
        project.start()?;
        self.projects.add_project(&project).await?;
        tracing::info!(%term, "Started project");
        Ok(project)
    }

    async fn execute_project<R: HarvestReporter>(
        &self,
        term: &str,
        cancel_token: &CancellationToken,
        reporter: &R,
        summary: &mut HarvestSummary,
    ) -> Result<LoopExit, AppError> {
        let mut project = self.get_or_start_project(term).await?;
        if project.is_complete() {
            tracing::info!(%term, "Project already complete, skipping");
            return Ok(LoopExit::Finished(None));
        }
        project.start()?;

        reporter.report(HarvestEvent::RunStarted {
            controller: Self::KIND,
            id: project.id,
            target: term,
        });

        let started = Utc::now();
        let offset = project.rewind();
        let mut harvester = SearchHarvester::new(
            self.fetcher.clone(),
            term,
            project.page_size.max(1) as u64,
            self.config.max_pages,
        )
        .with_offset(offset)
        .with_url(self.url.clone());

        let breaker = ConsecutiveFailureBreaker::new(Self::KIND.as_str(), self.config.failure_threshold);
        let verbose = self.config.verbose.max(1);
        let mut pages = 0u64;
        let mut items = 0u64;
        let mut errors = 0u64;

        let exit = loop {
            if cancel_token.is_cancelled() {
                break LoopExit::Cancelled;
            }
            let Some(batch) = harvester.next_batch().await else {
                break LoopExit::Finished(harvester.termination());
            };
            errors += batch.errors();

            if batch.is_valid() {
                breaker.record_success();
                let count = batch.items.len();
                project.update(count as i64);
                // Items first: a crash in between leaves the project behind
                // the data, and the re-fetched page is ignored on load.
                self.apps.load(batch.items).await?;
                self.apps.save().await?;
                self.projects.update_project(&project).await?;

                pages += 1;
                items += count as u64;
                if pages % verbose == 0 {
                    reporter.report(HarvestEvent::Progress {
                        controller: Self::KIND,
                        id: project.id,
                        target: term,
                        batches: pages,
                        items,
                        errors,
                    });
                }
            } else {
                let tripped = breaker.record_failure(failure_reason(&batch));
                let consecutive = breaker.stats().consecutive_failures;
                reporter.report(HarvestEvent::BatchFailed {
                    controller: Self::KIND,
                    id: project.id,
                    data_errors: batch.data_errors,
                    client_errors: batch.client_errors,
                    server_errors: batch.server_errors,
                    consecutive,
                });
                if tripped {
                    reporter.report(HarvestEvent::CircuitOpen {
                        controller: Self::KIND,
                        id: project.id,
                        failures: consecutive,
                    });
                    break LoopExit::CircuitOpen;
                }
            }
        };

        let complete = exit.is_exhausted();
        if complete {
            project.complete()?;
            self.projects.update_project(&project).await?;
        }

        summary.runs += 1;
        summary.items += items;
        summary.errors += errors;
        if complete {
            summary.completed += 1;
        }
        reporter.report(HarvestEvent::RunEnded {
            controller: Self::KIND,
            id: project.id,
            target: term,
            complete,
            items,
            errors,
            elapsed_seconds: (Utc::now() - started).num_milliseconds() as f64 / 1000.0,
        });
        Ok(exit)
    }
}
