//! Job runs: one execution of a controller against a job, with cumulative
//! request, error and throughput statistics.

use std::fmt::Debug;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::batch::Batch;
use crate::error::AppError;
use crate::job::{ControllerKind, Job};

/// Resource-specific statistics carried by a [`JobRun`].
pub trait RunMetrics: Serialize + Default + Clone + Debug + Send + Sync + 'static {
    /// Count items harvested in one batch.
    fn record_items(&mut self, items: u64);

    /// Recompute per-second rates for the current elapsed time.
    fn update_rates(&mut self, elapsed_seconds: f64);

    fn items(&self) -> u64;
}

fn per_second(count: u64, elapsed_seconds: f64) -> f64 {
    if elapsed_seconds > 0.0 {
        count as f64 / elapsed_seconds
    } else {
        0.0
    }
}

/// Metrics for runs that harvest one kind of item (apps, ratings).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemMetrics {
    pub items: u64,
    pub items_per_second: f64,
}

impl RunMetrics for ItemMetrics {
    fn record_items(&mut self, items: u64) {
        self.items += items;
    }

    fn update_rates(&mut self, elapsed_seconds: f64) {
        self.items_per_second = per_second(self.items, elapsed_seconds);
    }

    fn items(&self) -> u64 {
        self.items
    }
}

/// Metrics for review runs, which track apps visited as well as reviews.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReviewMetrics {
    pub apps: u64,
    pub reviews: u64,
    pub apps_per_second: f64,
    pub reviews_per_second: f64,
}

impl ReviewMetrics {
    /// Count one app whose reviews have been fully harvested.
    pub fn app_done(&mut self) {
        self.apps += 1;
    }
}

impl RunMetrics for ReviewMetrics {
    fn record_items(&mut self, items: u64) {
        self.reviews += items;
    }

    fn update_rates(&mut self, elapsed_seconds: f64) {
        self.apps_per_second = per_second(self.apps, elapsed_seconds);
        self.reviews_per_second = per_second(self.reviews, elapsed_seconds);
    }

    fn items(&self) -> u64 {
        self.reviews
    }
}

/// One execution of a controller against a job.
#[derive(Debug, Clone)]
pub struct JobRun<M: RunMetrics> {
    pub id: Uuid,
    pub job_id: Uuid,
    pub controller: ControllerKind,
    pub category_id: i64,
    pub category: String,
    pub started: DateTime<Utc>,
    pub ended: Option<DateTime<Utc>>,
    pub elapsed_seconds: f64,
    pub requests: u64,
    pub client_errors: u64,
    pub server_errors: u64,
    pub data_errors: u64,
    pub errors: u64,
    pub size_bytes: u64,
    /// Mean response size in bytes.
    pub size_ave: f64,
    pub bytes_per_second: f64,
    pub metrics: M,
    pub complete: bool,
}

impl<M: RunMetrics> JobRun<M> {
    /// Start a run for `job` now.
    pub fn from_job(job: &Job) -> Self {
        Self {
            id: Uuid::new_v4(),
            job_id: job.id,
            controller: job.controller,
            category_id: job.category_id,
            category: job.category.clone(),
            started: Utc::now(),
            ended: None,
            elapsed_seconds: 0.0,
            requests: 0,
            client_errors: 0,
            server_errors: 0,
            data_errors: 0,
            errors: 0,
            size_bytes: 0,
            size_ave: 0.0,
            bytes_per_second: 0.0,
            metrics: M::default(),
            complete: false,
        }
    }

    /// Refresh elapsed time and rates as of `now`.
    fn measure(&mut self, now: DateTime<Utc>) {
        self.elapsed_seconds = (now - self.started).num_milliseconds() as f64 / 1000.0;
        self.bytes_per_second = per_second(self.size_bytes, self.elapsed_seconds);
        self.metrics.update_rates(self.elapsed_seconds);
    }

    /// Fold one batch (valid or not) into the cumulative counters.
    pub fn add<T>(&mut self, batch: &Batch<T>) {
        self.requests += batch.requests;
        self.client_errors += batch.client_errors;
        self.server_errors += batch.server_errors;
        self.data_errors += batch.data_errors;
        self.errors = self.client_errors + self.server_errors + self.data_errors;
        self.size_bytes += batch.size_bytes;
        self.size_ave = if self.requests > 0 {
            self.size_bytes as f64 / self.requests as f64
        } else {
            0.0
        };
        self.metrics.record_items(batch.items.len() as u64);
        self.measure(Utc::now());
    }

    /// Close the run. `complete` records whether the job's sequence was
    /// exhausted rather than abandoned.
    pub fn end(&mut self, complete: bool) {
        let now = Utc::now();
        self.complete = complete;
        self.ended = Some(now);
        self.measure(now);
    }

    /// Flatten into the persisted shape, with metrics as a JSON document.
    pub fn to_record(&self) -> Result<JobRunRecord, AppError> {
        Ok(JobRunRecord {
            id: self.id,
            job_id: self.job_id,
            controller: self.controller,
            category_id: self.category_id,
            category: self.category.clone(),
            started: self.started,
            ended: self.ended,
            elapsed_seconds: self.elapsed_seconds,
            requests: self.requests as i64,
            client_errors: self.client_errors as i64,
            server_errors: self.server_errors as i64,
            data_errors: self.data_errors as i64,
            errors: self.errors as i64,
            size_bytes: self.size_bytes as i64,
            size_ave: self.size_ave,
            bytes_per_second: self.bytes_per_second,
            items: self.metrics.items() as i64,
            metrics: serde_json::to_value(&self.metrics)?,
            complete: self.complete,
        })
    }
}

/// Storage form of a [`JobRun`], independent of its metrics type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRunRecord {
    pub id: Uuid,
    pub job_id: Uuid,
    pub controller: ControllerKind,
    pub category_id: i64,
    pub category: String,
    pub started: DateTime<Utc>,
    pub ended: Option<DateTime<Utc>>,
    pub elapsed_seconds: f64,
    pub requests: i64,
    pub client_errors: i64,
    pub server_errors: i64,
    pub data_errors: i64,
    pub errors: i64,
    pub size_bytes: i64,
    pub size_ave: f64,
    pub bytes_per_second: f64,
    pub items: i64,
    pub metrics: serde_json::Value,
    pub complete: bool,
}
