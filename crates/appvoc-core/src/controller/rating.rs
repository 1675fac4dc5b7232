use tokio_util::sync::CancellationToken;

use super::{HarvestEvent, HarvestReporter, HarvestSummary, JobLoop, begin_run, finish_run, is_locked};
use crate::config::HarvestConfig;
use crate::director::Director;
use crate::error::AppError;
use crate::harvest::{LookupHarvester, RATING_URL};
use crate::identity::{HeaderSource, StorefrontHeader};
use crate::job::ControllerKind;
use crate::models::{App, AppRef, Rating};
use crate::run::{ItemMetrics, JobRun};
use crate::traits::{BatchFetcher, ItemStore, JobStore};

/// Harvests rating histograms for every app in a category, one category job
/// at a time.
pub struct RatingController<J, A, S, B>
where
    J: JobStore,
    A: ItemStore<App>,
    S: ItemStore<Rating>,
    B: BatchFetcher,
{
    director: Director<J>,
    apps: A,
    ratings: S,
    fetcher: B,
    config: HarvestConfig,
    url: String,
    lock_check: fn(ControllerKind) -> bool,
}

impl<J, A, S, B> RatingController<J, A, S, B>
where
    J: JobStore,
    A: ItemStore<App>,
    S: ItemStore<Rating>,
    B: BatchFetcher,
{
    pub const KIND: ControllerKind = ControllerKind::Rating;

    pub fn new(director: Director<J>, apps: A, ratings: S, fetcher: B, config: HarvestConfig) -> Self {
        Self {
            director,
            apps,
            ratings,
            fetcher,
            config,
            url: RATING_URL.to_string(),
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

    /// Work through rating jobs until none remain, a run is abandoned, or
    /// `cancel_token` fires.
    pub async fn run<R: HarvestReporter>(
        &self,
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

        while !cancel_token.is_cancelled() {
            let Some(mut job) = self.director.next(Self::KIND).await? else {
                reporter.report(HarvestEvent::NoMoreWork {
                    controller: Self::KIND,
                });
                break;
            };

            let mut run: JobRun<ItemMetrics> = begin_run(&self.director, reporter, &mut job).await?;

            let mut pending = Vec::new();
            for app in self.apps.get_by_category(job.category_id).await? {
                if !self.ratings.exists(&app.id).await? {
                    pending.push(AppRef::from(&app));
                }
            }
            tracing::debug!(job_id = %job.id, category = %job.category, apps = pending.len(), "Apps awaiting ratings");

            let mut harvester = LookupHarvester::new(self.fetcher.clone(), pending, self.config.batch_size)
                .with_header(StorefrontHeader::us().next_header())
                .with_url(self.url.clone());
            let mut job_loop = JobLoop::new(
                Self::KIND,
                &self.director,
                reporter,
                self.config.failure_threshold,
                &cancel_token,
                self.config.verbose,
            );
            let exit = job_loop
                .drain(&job, &mut harvester, &self.ratings, &mut run)
                .await?;

            let complete = !exit.is_abandoned();
            finish_run(&self.director, reporter, &mut job, &mut run, complete, &mut summary).await?;
            if exit.is_abandoned() {
                summary.abandoned = true;
                break;
            }
        }

        Ok(summary)
    }
}
