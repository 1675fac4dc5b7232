pub mod batch;
pub mod categories;
pub mod circuit_breaker;
pub mod config;
pub mod controller;
pub mod director;
pub mod error;
pub mod harvest;
pub mod identity;
pub mod job;
pub mod models;
pub mod project;
pub mod run;
pub mod throttle;
pub mod traits;
pub mod validator;

#[cfg(test)]
pub mod testutil;

pub use batch::Batch;
pub use circuit_breaker::ConsecutiveFailureBreaker;
pub use config::HarvestConfig;
pub use controller::{
    AppDataController, HarvestEvent, HarvestReporter, HarvestSummary, RatingController,
    ReviewController, TracingReporter,
};
pub use director::Director;
pub use error::AppError;
pub use harvest::{Harvester, LookupHarvester, ReviewHarvester, SearchHarvester, Termination};
pub use identity::{Header, HeaderRotator, HeaderSource, ProxyPool, StorefrontHeader};
pub use job::{ControllerKind, Job, JobStatus};
pub use models::{App, AppRef, Rating, RawResponse, Review, ReviewCursor};
pub use project::{Project, ProjectStatus};
pub use run::{ItemMetrics, JobRun, JobRunRecord, ReviewMetrics, RunMetrics};
pub use throttle::{BurstThrottle, LatencyThrottle, RequestTimer, Throttle};
pub use traits::{BatchFetcher, CursorStore, Entity, Fetcher, ItemStore, JobStore, ProjectStore};
pub use validator::{Outcome, Validation, Validator};
