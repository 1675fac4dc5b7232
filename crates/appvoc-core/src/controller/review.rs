use std::collections::HashMap;

use tokio_util::sync::CancellationToken;

use super::{
    HarvestEvent, HarvestReporter, HarvestSummary, JobLoop, LoopExit, Step, begin_run, finish_run,
    is_locked,
};
use crate::config::HarvestConfig;
use crate::director::Director;
use crate::error::AppError;
use crate::harvest::{REVIEW_URL, ReviewHarvester, Termination};
use crate::job::{ControllerKind, Job};
use crate::models::{App, AppRef, Review, ReviewCursor};
use crate::run::{JobRun, ReviewMetrics};
use crate::traits::{CursorStore, Fetcher, ItemStore, JobStore};

/// Harvests review text for the well-rated apps of a category, app by app.
///
/// Each app's progress is kept in a [`ReviewCursor`] that moves after every
/// stored page, so an interrupted app resumes at its first missing window.
/// A job completes only when every eligible app ran out of reviews.
pub struct ReviewController<J, A, S, C, F>
where
    J: JobStore,
    A: ItemStore<App>,
    S: ItemStore<Review>,
    C: CursorStore,
    F: Fetcher,
{
    director: Director<J>,
    apps: A,
    reviews: S,
    cursors: C,
    fetcher: F,
    config: HarvestConfig,
    url: String,
    lock_check: fn(ControllerKind) -> bool,
}

/// How the harvest of one app ended.
enum AppExit {
    /// No reviews remain.
    Done,
    /// Stopped at the page limit; the cursor picks it up next run.
    Paused,
    /// Stopped by failures or cancellation.
    Abandoned,
}

impl<J, A, S, C, F> ReviewController<J, A, S, C, F>
where
    J: JobStore,
    A: ItemStore<App>,
    S: ItemStore<Review>,
    C: CursorStore,
    F: Fetcher,
{
    pub const KIND: ControllerKind = ControllerKind::Review;

    pub fn new(
        director: Director<J>,
        apps: A,
        reviews: S,
        cursors: C,
        fetcher: F,
        config: HarvestConfig,
    ) -> Self {
        Self {
            director,
            apps,
            reviews,
            cursors,
            fetcher,
            config,
            url: REVIEW_URL.to_string(),
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

    /// Apps in `category_id` with enough ratings whose reviews are not yet
    /// exhausted, each paired with its cursor.
    async fn pending_apps(&self, category_id: i64) -> Result<Vec<(AppRef, ReviewCursor)>, AppError> {
        let mut cursors: HashMap<i64, ReviewCursor> = self
            .cursors
            .get_cursors(category_id)
            .await?
            .into_iter()
            .map(|c| (c.app_id, c))
            .collect();

        Ok(self
            .apps
            .get_by_category(category_id)
            .await?
            .iter()
            .filter(|app| app.ratings > self.config.min_ratings)
            .map(AppRef::from)
            .filter_map(|app| match cursors.remove(&app.id) {
                Some(cursor) if cursor.exhausted => None,
                Some(cursor) => Some((app, cursor)),
                None => {
                    let cursor = ReviewCursor::new(&app);
                    Some((app, cursor))
                }
            })
            .collect())
    }

    /// Harvest one app from its cursor, persisting the cursor after every
    /// stored page.
    async fn harvest_app<R: HarvestReporter>(
        &self,
        job_loop: &mut JobLoop<'_, J, R>,
        job: &Job,
        run: &mut JobRun<ReviewMetrics>,
        app: AppRef,
        mut cursor: ReviewCursor,
    ) -> Result<AppExit, AppError> {
        let mut harvester = ReviewHarvester::new(
            self.fetcher.clone(),
            app,
            self.config.review_page_size,
            self.config.max_pages,
        )
        .with_start_index(cursor.last_index)
        .with_failure_threshold(self.config.failure_threshold)
        .with_url(self.url.clone());

        let exit = loop {
            match job_loop.step(job, &mut harvester, &self.reviews, run).await? {
                Step::Saved => {
                    cursor.advance(harvester.next_index());
                    self.cursors.upsert_cursor(&cursor).await?;
                }
                Step::Failed => {}
                Step::Exit(exit) => break exit,
            }
        };

        Ok(match exit {
            LoopExit::Finished(Some(Termination::Exhausted)) => {
                cursor.exhaust();
                self.cursors.upsert_cursor(&cursor).await?;
                AppExit::Done
            }
            LoopExit::Finished(Some(Termination::PageLimit)) => AppExit::Paused,
            other => {
                tracing::warn!(
                    app_id = cursor.app_id,
                    next_index = cursor.last_index,
                    exit = ?other,
                    "Review harvest stopped early"
                );
                AppExit::Abandoned
            }
        })
    }

    /// Work through review jobs until none remain, a run is abandoned, or
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

            let mut run: JobRun<ReviewMetrics> = begin_run(&self.director, reporter, &mut job).await?;
            let pending = self.pending_apps(job.category_id).await?;
            tracing::debug!(job_id = %job.id, category = %job.category, apps = pending.len(), "Apps awaiting reviews");

            // One loop per job, so a failure streak carries across apps.
            let mut job_loop = JobLoop::new(
                Self::KIND,
                &self.director,
                reporter,
                self.config.failure_threshold,
                &cancel_token,
                self.config.verbose,
            );
            let mut abandoned = false;
            let mut paused = false;
            for (app, cursor) in pending {
                match self.harvest_app(&mut job_loop, &job, &mut run, app, cursor).await? {
                    AppExit::Done => run.metrics.app_done(),
                    AppExit::Paused => paused = true,
                    AppExit::Abandoned => {
                        abandoned = true;
                        break;
                    }
                }
            }

            let complete = !abandoned && !paused;
            finish_run(&self.director, reporter, &mut job, &mut run, complete, &mut summary).await?;
            if abandoned || paused {
                summary.abandoned = abandoned;
                break;
            }
        }

        Ok(summary)
    }
}
