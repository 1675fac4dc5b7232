//! Test utilities: mock implementations of all core traits.
//!
//! Handwritten mocks for dependency injection in unit tests.
//! All mocks use `Arc<Mutex<_>>` for interior mutability, allowing
//! test assertions on recorded calls.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use serde_json::{Value, json};
use uuid::Uuid;

use crate::categories;
use crate::controller::{HarvestEvent, HarvestReporter};
use crate::error::AppError;
use crate::identity::Header;
use crate::job::{ControllerKind, Job, JobStatus};
use crate::models::{App, AppRef, RawResponse, ReviewCursor};
use crate::project::Project;
use crate::run::JobRunRecord;
use crate::traits::{
    BatchFetcher, CursorStore, Entity, Fetcher, ItemStore, JobStore, ProjectStore,
};

// ---------------------------------------------------------------------------
// MockFetcher
// ---------------------------------------------------------------------------

/// A request seen by [`MockFetcher`].
#[derive(Debug, Clone)]
pub struct MockCall {
    pub url: String,
    pub header: Option<Header>,
    pub params: Vec<(String, String)>,
}

/// Mock serial fetcher that replays a queue of results.
#[derive(Clone)]
pub struct MockFetcher {
    /// Each call pops the front. Once empty, calls fail with a network error.
    responses: Arc<Mutex<VecDeque<Result<RawResponse, AppError>>>>,
    calls: Arc<Mutex<Vec<MockCall>>>,
}

impl MockFetcher {
    pub fn with_responses(responses: Vec<Result<RawResponse, AppError>>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses.into())),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl Fetcher for MockFetcher {
    async fn get(
        &self,
        url: &str,
        header: Option<&Header>,
        params: &[(String, String)],
    ) -> Result<RawResponse, AppError> {
        self.calls.lock().unwrap().push(MockCall {
            url: url.to_string(),
            header: header.cloned(),
            params: params.to_vec(),
        });
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(AppError::NetworkError("no more mock responses".into())))
    }
}

// ---------------------------------------------------------------------------
// MockBatchFetcher
// ---------------------------------------------------------------------------

/// Mock concurrent fetcher answering by URL. Unknown URLs yield `None`, as
/// if retries were exhausted.
#[derive(Clone, Default)]
pub struct MockBatchFetcher {
    responses: Arc<Mutex<HashMap<String, RawResponse>>>,
    requested: Arc<Mutex<Vec<Vec<String>>>>,
    headers: Arc<Mutex<Vec<Option<Header>>>>,
}

impl MockBatchFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, url: &str, response: RawResponse) {
        self.responses
            .lock()
            .unwrap()
            .insert(url.to_string(), response);
    }

    /// URL lists of every `get_batch` call, in call order.
    pub fn requested(&self) -> Vec<Vec<String>> {
        self.requested.lock().unwrap().clone()
    }

    /// Header passed to every `get_batch` call, in call order.
    pub fn headers(&self) -> Vec<Option<Header>> {
        self.headers.lock().unwrap().clone()
    }
}

impl BatchFetcher for MockBatchFetcher {
    async fn get_batch(&self, urls: &[String], header: Option<&Header>) -> Vec<Option<RawResponse>> {
        self.requested.lock().unwrap().push(urls.to_vec());
        self.headers.lock().unwrap().push(header.cloned());
        let responses = self.responses.lock().unwrap();
        urls.iter().map(|url| responses.get(url).cloned()).collect()
    }
}

// ---------------------------------------------------------------------------
// MockItemStore
// ---------------------------------------------------------------------------

struct ItemState<T> {
    committed: Vec<T>,
    staged: Vec<(T, bool)>,
    saves: usize,
    error: Option<String>,
}

/// In-memory item store with the same staging semantics as the database.
#[derive(Clone)]
pub struct MockItemStore<T: Entity> {
    state: Arc<Mutex<ItemState<T>>>,
}

impl<T: Entity> MockItemStore<T> {
    pub fn empty() -> Self {
        Self::with_items(Vec::new())
    }

    pub fn with_items(items: Vec<T>) -> Self {
        Self {
            state: Arc::new(Mutex::new(ItemState {
                committed: items,
                staged: Vec::new(),
                saves: 0,
                error: None,
            })),
        }
    }

    /// A store whose every call fails with a database error.
    pub fn with_error(msg: &str) -> Self {
        let store = Self::empty();
        store.state.lock().unwrap().error = Some(msg.to_string());
        store
    }

    pub fn saved(&self) -> Vec<T> {
        self.state.lock().unwrap().committed.clone()
    }

    pub fn save_count(&self) -> usize {
        self.state.lock().unwrap().saves
    }

    fn check(&self) -> Result<std::sync::MutexGuard<'_, ItemState<T>>, AppError> {
        let state = self.state.lock().unwrap();
        match &state.error {
            Some(msg) => Err(AppError::DatabaseError(msg.clone())),
            None => Ok(state),
        }
    }
}

impl<T: Entity> ItemStore<T> for MockItemStore<T> {
    async fn load(&self, items: Vec<T>) -> Result<(), AppError> {
        let mut state = self.check()?;
        state.staged.extend(items.into_iter().map(|item| (item, false)));
        Ok(())
    }

    async fn replace(&self, items: Vec<T>) -> Result<(), AppError> {
        let mut state = self.check()?;
        state.staged.extend(items.into_iter().map(|item| (item, true)));
        Ok(())
    }

    async fn get_by_category(&self, category_id: i64) -> Result<Vec<T>, AppError> {
        let state = self.check()?;
        Ok(state
            .committed
            .iter()
            .filter(|item| item.category_id() == category_id)
            .cloned()
            .collect())
    }

    async fn exists(&self, id: &T::Id) -> Result<bool, AppError> {
        let state = self.check()?;
        Ok(state.committed.iter().any(|item| item.id() == id))
    }

    async fn delete_all(&self) -> Result<u64, AppError> {
        let mut state = self.check()?;
        let removed = state.committed.len() as u64;
        state.committed.clear();
        Ok(removed)
    }

    async fn save(&self) -> Result<u64, AppError> {
        let mut state = self.check()?;
        let staged = std::mem::take(&mut state.staged);
        let mut written = 0;
        for (item, replace) in staged {
            match state.committed.iter().position(|c| c.id() == item.id()) {
                Some(i) if replace => {
                    state.committed[i] = item;
                    written += 1;
                }
                Some(_) => {}
                None => {
                    state.committed.push(item);
                    written += 1;
                }
            }
        }
        state.saves += 1;
        Ok(written)
    }
}

// ---------------------------------------------------------------------------
// MockJobStore
// ---------------------------------------------------------------------------

#[derive(Default)]
struct JobState {
    jobs: Vec<Job>,
    runs: Vec<JobRunRecord>,
    error: Option<String>,
}

/// In-memory job store recording jobs and the latest version of each run.
#[derive(Clone, Default)]
pub struct MockJobStore {
    state: Arc<Mutex<JobState>>,
}

impl MockJobStore {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_jobs(jobs: Vec<Job>) -> Self {
        let store = Self::default();
        store.state.lock().unwrap().jobs = jobs;
        store
    }

    pub fn with_error(msg: &str) -> Self {
        let store = Self::default();
        store.state.lock().unwrap().error = Some(msg.to_string());
        store
    }

    pub fn jobs(&self) -> Vec<Job> {
        self.state.lock().unwrap().jobs.clone()
    }

    pub fn job(&self, id: Uuid) -> Option<Job> {
        self.jobs().into_iter().find(|j| j.id == id)
    }

    pub fn runs(&self) -> Vec<JobRunRecord> {
        self.state.lock().unwrap().runs.clone()
    }

    fn check(&self) -> Result<std::sync::MutexGuard<'_, JobState>, AppError> {
        let state = self.state.lock().unwrap();
        match &state.error {
            Some(msg) => Err(AppError::DatabaseError(msg.clone())),
            None => Ok(state),
        }
    }
}

impl JobStore for MockJobStore {
    async fn add_job(&self, job: &Job) -> Result<(), AppError> {
        self.check()?.jobs.push(job.clone());
        Ok(())
    }

    async fn get_job(&self, id: Uuid) -> Result<Option<Job>, AppError> {
        Ok(self.check()?.jobs.iter().find(|j| j.id == id).cloned())
    }

    async fn update_job(&self, job: &Job) -> Result<(), AppError> {
        let mut state = self.check()?;
        match state.jobs.iter_mut().find(|j| j.id == job.id) {
            Some(existing) => {
                *existing = job.clone();
                Ok(())
            }
            None => Err(AppError::DatabaseError(format!("job {} not found", job.id))),
        }
    }

    async fn list_jobs(&self, controller: ControllerKind) -> Result<Vec<Job>, AppError> {
        let mut jobs: Vec<Job> = self
            .check()?
            .jobs
            .iter()
            .filter(|j| j.controller == controller)
            .cloned()
            .collect();
        jobs.sort_by_key(|j| j.category_id);
        Ok(jobs)
    }

    async fn pick(
        &self,
        controller: ControllerKind,
        status: JobStatus,
    ) -> Result<Option<Job>, AppError> {
        let mut matches: Vec<Job> = self
            .check()?
            .jobs
            .iter()
            .filter(|j| j.controller == controller && j.status == status)
            .cloned()
            .collect();
        if matches.is_empty() {
            return Ok(None);
        }
        let i = rand::random_range(0..matches.len());
        Ok(Some(matches.swap_remove(i)))
    }

    async fn add_jobrun(&self, run: &JobRunRecord) -> Result<(), AppError> {
        self.check()?.runs.push(run.clone());
        Ok(())
    }

    async fn update_jobrun(&self, run: &JobRunRecord) -> Result<(), AppError> {
        let mut state = self.check()?;
        match state.runs.iter_mut().find(|r| r.id == run.id) {
            Some(existing) => {
                *existing = run.clone();
                Ok(())
            }
            None => Err(AppError::DatabaseError(format!("jobrun {} not found", run.id))),
        }
    }
}

// ---------------------------------------------------------------------------
// MockProjectStore
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
pub struct MockProjectStore {
    projects: Arc<Mutex<Vec<Project>>>,
}

impl MockProjectStore {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_projects(projects: Vec<Project>) -> Self {
        Self {
            projects: Arc::new(Mutex::new(projects)),
        }
    }

    pub fn project(&self, controller: ControllerKind, term: &str) -> Option<Project> {
        self.projects
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.controller == controller && p.term == term)
            .cloned()
    }
}

impl ProjectStore for MockProjectStore {
    async fn get_project(
        &self,
        controller: ControllerKind,
        term: &str,
    ) -> Result<Option<Project>, AppError> {
        Ok(self.project(controller, term))
    }

    async fn add_project(&self, project: &Project) -> Result<(), AppError> {
        self.projects.lock().unwrap().push(project.clone());
        Ok(())
    }

    async fn update_project(&self, project: &Project) -> Result<(), AppError> {
        let mut projects = self.projects.lock().unwrap();
        match projects.iter_mut().find(|p| p.id == project.id) {
            Some(existing) => {
                *existing = project.clone();
                Ok(())
            }
            None => Err(AppError::DatabaseError(format!(
                "project {} not found",
                project.id
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// MockCursorStore
// ---------------------------------------------------------------------------

/// In-memory cursor store keyed by app id.
#[derive(Clone, Default)]
pub struct MockCursorStore {
    cursors: Arc<Mutex<HashMap<i64, ReviewCursor>>>,
    writes: Arc<Mutex<usize>>,
}

impl MockCursorStore {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_cursors(cursors: Vec<ReviewCursor>) -> Self {
        let store = Self::default();
        store
            .cursors
            .lock()
            .unwrap()
            .extend(cursors.into_iter().map(|c| (c.app_id, c)));
        store
    }

    pub fn cursor(&self, app_id: i64) -> Option<ReviewCursor> {
        self.cursors.lock().unwrap().get(&app_id).cloned()
    }

    pub fn writes(&self) -> usize {
        *self.writes.lock().unwrap()
    }
}

impl CursorStore for MockCursorStore {
    async fn get_cursors(&self, category_id: i64) -> Result<Vec<ReviewCursor>, AppError> {
        Ok(self
            .cursors
            .lock()
            .unwrap()
            .values()
            .filter(|c| c.category_id == category_id)
            .cloned()
            .collect())
    }

    async fn upsert_cursor(&self, cursor: &ReviewCursor) -> Result<(), AppError> {
        self.cursors
            .lock()
            .unwrap()
            .insert(cursor.app_id, cursor.clone());
        *self.writes.lock().unwrap() += 1;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MockReporter
// ---------------------------------------------------------------------------

/// Reporter that records the Debug form of every event.
#[derive(Clone, Default)]
pub struct MockReporter {
    events: Arc<Mutex<Vec<String>>>,
}

impl MockReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    /// True if any recorded event is the variant named `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.events().iter().any(|e| {
            e.strip_prefix(name)
                .is_some_and(|rest| rest.is_empty() || rest.starts_with([' ', '{']))
        })
    }
}

impl HarvestReporter for MockReporter {
    fn report(&self, event: HarvestEvent<'_>) {
        self.events.lock().unwrap().push(format!("{event:?}"));
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub fn make_test_job(controller: ControllerKind, category_id: i64) -> Job {
    let name = categories::find(category_id)
        .map(|c| c.name.to_string())
        .unwrap_or_else(|| format!("Category {category_id}"));
    Job::new(controller, category_id, name)
}

pub fn make_app(id: i64, category_id: i64, ratings: i64) -> App {
    App {
        id,
        name: format!("App {id}"),
        description: "A test app".into(),
        category_id,
        category: categories::find(category_id)
            .map(|c| c.name.to_string())
            .unwrap_or_default(),
        price: 0.0,
        developer_id: 1000 + id,
        developer: "Test Developer".into(),
        rating: 4.0,
        ratings,
        released: None,
    }
}

pub fn make_app_ref(id: i64) -> AppRef {
    AppRef::from(&make_app(id, 6000, 100))
}

/// One element of a search response's `results`.
pub fn listing(id: i64) -> Value {
    json!({
        "trackId": id,
        "trackName": format!("App {id}"),
        "description": "A test app",
        "primaryGenreId": 6000,
        "primaryGenreName": "Business",
        "price": 0.0,
        "artistId": 1000 + id,
        "artistName": "Test Developer",
        "averageUserRating": 4.5,
        "userRatingCount": 120,
        "releaseDate": "2020-01-01T00:00:00Z"
    })
}

/// One element of a `userReviewList`.
pub fn review(id: i64) -> Value {
    json!({
        "userReviewId": id.to_string(),
        "name": "reviewer",
        "rating": 4,
        "title": "Useful",
        "body": "Does what it says",
        "voteSum": 1,
        "voteCount": 2,
        "date": "2023-05-01T12:00:00Z"
    })
}

/// A customer-reviews payload for app `id`.
pub fn rating_body(id: i64) -> Value {
    json!({
        "adamId": id,
        "ratingAverage": 4.2,
        "totalNumberOfReviews": 10,
        "ratingCount": 100,
        "ratingCountList": [5, 5, 10, 30, 50]
    })
}
