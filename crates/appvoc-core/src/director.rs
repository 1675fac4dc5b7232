use crate::categories::Category;
use crate::error::AppError;
use crate::job::{ControllerKind, Job, JobStatus};
use crate::run::JobRunRecord;
use crate::traits::JobStore;

/// Hands out jobs to controllers and persists their progress.
///
/// Jobs already in progress are resumed before fresh ones are started, so an
/// interrupted category finishes before new work begins.
#[derive(Clone)]
pub struct Director<J: JobStore> {
    store: J,
}

impl<J: JobStore> Director<J> {
    pub fn new(store: J) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &J {
        &self.store
    }

    /// Next job for `controller`, or `None` when every job is complete.
    pub async fn next(&self, controller: ControllerKind) -> Result<Option<Job>, AppError> {
        for status in [JobStatus::InProgress, JobStatus::NotStarted] {
            if let Some(job) = self.store.pick(controller, status).await? {
                return Ok(Some(job));
            }
        }
        Ok(None)
    }

    pub async fn add_jobrun(&self, run: &JobRunRecord) -> Result<(), AppError> {
        self.store.add_jobrun(run).await
    }

    pub async fn update_jobrun(&self, run: &JobRunRecord) -> Result<(), AppError> {
        self.store.update_jobrun(run).await
    }

    pub async fn update_job(&self, job: &Job) -> Result<(), AppError> {
        self.store.update_job(job).await
    }

    /// Create one job per category for `controller`, skipping categories that
    /// already have one. Returns the number of jobs created.
    pub async fn seed(
        &self,
        controller: ControllerKind,
        categories: &[Category],
    ) -> Result<usize, AppError> {
        let existing = self.store.list_jobs(controller).await?;
        let mut created = 0;
        for category in categories {
            if existing.iter().any(|job| job.category_id == category.id) {
                continue;
            }
            let job = Job::new(controller, category.id, category.name);
            self.store.add_job(&job).await?;
            tracing::info!(job_id = %job.id, %controller, category = category.name, "Seeded job");
            created += 1;
        }
        Ok(created)
    }
}
