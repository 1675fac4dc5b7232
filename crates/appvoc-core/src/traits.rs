use std::future::Future;

use uuid::Uuid;

use crate::error::AppError;
use crate::identity::Header;
use crate::job::{ControllerKind, Job, JobStatus};
use crate::models::{App, Rating, RawResponse, Review, ReviewCursor};
use crate::project::Project;
use crate::run::JobRunRecord;

/// Issues one HTTP GET with identity rotation, throttling and bounded
/// retries. Transport failures surface as errors once retries run out;
/// HTTP error statuses are returned as responses for the validator.
pub trait Fetcher: Send + Sync + Clone {
    fn get(
        &self,
        url: &str,
        header: Option<&Header>,
        params: &[(String, String)],
    ) -> impl Future<Output = Result<RawResponse, AppError>> + Send;
}

/// Issues many GETs concurrently under a concurrency limit.
///
/// The returned vector is index-aligned with `urls`. A slot is `None` when
/// that request exhausted its retries.
pub trait BatchFetcher: Send + Sync + Clone {
    fn get_batch(
        &self,
        urls: &[String],
        header: Option<&Header>,
    ) -> impl Future<Output = Vec<Option<RawResponse>>> + Send;
}

/// A harvested record that can be persisted through an [`ItemStore`].
pub trait Entity: Clone + Send + Sync + 'static {
    type Id: Clone + PartialEq + Send + Sync + std::fmt::Debug + 'static;

    fn id(&self) -> &Self::Id;
    fn category_id(&self) -> i64;
}

impl Entity for App {
    type Id = i64;

    fn id(&self) -> &i64 {
        &self.id
    }

    fn category_id(&self) -> i64 {
        self.category_id
    }
}

impl Entity for Rating {
    type Id = i64;

    fn id(&self) -> &i64 {
        &self.id
    }

    fn category_id(&self) -> i64 {
        self.category_id
    }
}

impl Entity for Review {
    type Id = String;

    fn id(&self) -> &String {
        &self.id
    }

    fn category_id(&self) -> i64 {
        self.category_id
    }
}

/// Persistence capability for harvested records.
///
/// `load` and `replace` stage items; nothing is durable until `save`, which
/// commits everything staged in a single transaction.
pub trait ItemStore<T: Entity>: Send + Sync + Clone {
    /// Stage items for insertion. Items whose id already exists are ignored.
    fn load(&self, items: Vec<T>) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Stage items to overwrite any existing rows with the same id.
    fn replace(&self, items: Vec<T>) -> impl Future<Output = Result<(), AppError>> + Send;

    fn get_by_category(
        &self,
        category_id: i64,
    ) -> impl Future<Output = Result<Vec<T>, AppError>> + Send;

    fn exists(&self, id: &T::Id) -> impl Future<Output = Result<bool, AppError>> + Send;

    /// Remove every persisted item. Returns the number of rows removed.
    fn delete_all(&self) -> impl Future<Output = Result<u64, AppError>> + Send;

    /// Commit staged items. Returns the number of items written.
    fn save(&self) -> impl Future<Output = Result<u64, AppError>> + Send;
}

/// Durable storage for jobs and their runs.
pub trait JobStore: Send + Sync + Clone {
    fn add_job(&self, job: &Job) -> impl Future<Output = Result<(), AppError>> + Send;

    fn get_job(&self, id: Uuid) -> impl Future<Output = Result<Option<Job>, AppError>> + Send;

    fn update_job(&self, job: &Job) -> impl Future<Output = Result<(), AppError>> + Send;

    /// All jobs for `controller`, ordered by category id.
    fn list_jobs(
        &self,
        controller: ControllerKind,
    ) -> impl Future<Output = Result<Vec<Job>, AppError>> + Send;

    /// One job for `controller` in `status`, chosen at random among the
    /// matches, or `None` when no job is in that status.
    fn pick(
        &self,
        controller: ControllerKind,
        status: JobStatus,
    ) -> impl Future<Output = Result<Option<Job>, AppError>> + Send;

    fn add_jobrun(&self, run: &JobRunRecord) -> impl Future<Output = Result<(), AppError>> + Send;

    fn update_jobrun(
        &self,
        run: &JobRunRecord,
    ) -> impl Future<Output = Result<(), AppError>> + Send;
}

/// Durable storage for term-based projects.
pub trait ProjectStore: Send + Sync + Clone {
    fn get_project(
        &self,
        controller: ControllerKind,
        term: &str,
    ) -> impl Future<Output = Result<Option<Project>, AppError>> + Send;

    fn add_project(&self, project: &Project) -> impl Future<Output = Result<(), AppError>> + Send;

    fn update_project(
        &self,
        project: &Project,
    ) -> impl Future<Output = Result<(), AppError>> + Send;
}

/// Durable per-app review progress.
pub trait CursorStore: Send + Sync + Clone {
    /// Every cursor recorded for apps in `category_id`.
    fn get_cursors(
        &self,
        category_id: i64,
    ) -> impl Future<Output = Result<Vec<ReviewCursor>, AppError>> + Send;

    /// Insert the cursor or overwrite the one stored for the same app.
    fn upsert_cursor(
        &self,
        cursor: &ReviewCursor,
    ) -> impl Future<Output = Result<(), AppError>> + Send;
}
