use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

/// Which harvest loop owns a job, run or project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ControllerKind {
    AppData,
    Rating,
    Review,
}

impl ControllerKind {
    /// Persisted name. Also the environment variable that locks the
    /// controller when set to `true`.
    pub fn as_str(&self) -> &'static str {
        match self {
            ControllerKind::AppData => "AppDataController",
            ControllerKind::Rating => "RatingController",
            ControllerKind::Review => "ReviewController",
        }
    }
}

impl fmt::Display for ControllerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ControllerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "AppDataController" => Ok(ControllerKind::AppData),
            "RatingController" => Ok(ControllerKind::Rating),
            "ReviewController" => Ok(ControllerKind::Review),
            _ => Err(format!("Unknown controller: {}", s)),
        }
    }
}

/// Lifecycle of a category job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    NotStarted,
    InProgress,
    Complete,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::NotStarted => "not_started",
            JobStatus::InProgress => "in_progress",
            JobStatus::Complete => "complete",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Complete)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "not_started" => Ok(JobStatus::NotStarted),
            "in_progress" => Ok(JobStatus::InProgress),
            "complete" => Ok(JobStatus::Complete),
            _ => Err(format!("Unknown job status: {}", s)),
        }
    }
}

/// A unit of harvest work: one category for one controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub controller: ControllerKind,
    pub category_id: i64,
    pub category: String,
    pub status: JobStatus,
    pub complete: bool,
    pub completed: Option<DateTime<Utc>>,
    /// Number of runs started against this job.
    pub runs: i32,
    pub started: Option<DateTime<Utc>>,
    pub updated: DateTime<Utc>,
}

impl Job {
    pub fn new(controller: ControllerKind, category_id: i64, category: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            controller,
            category_id,
            category: category.into(),
            status: JobStatus::NotStarted,
            complete: false,
            completed: None,
            runs: 0,
            started: None,
            updated: Utc::now(),
        }
    }

    /// Begin a run. A fresh job moves to `in_progress`; an in-progress job is
    /// resumed and only its run counter moves.
    pub fn start(&mut self) -> Result<(), AppError> {
        let now = Utc::now();
        match self.status {
            JobStatus::Complete => {
                return Err(AppError::StateError(format!(
                    "job {} ({}) is already complete",
                    self.id, self.category
                )));
            }
            JobStatus::NotStarted => {
                self.status = JobStatus::InProgress;
                self.started = Some(now);
            }
            JobStatus::InProgress => {}
        }
        self.runs += 1;
        self.updated = now;
        Ok(())
    }

    /// Record the end of a run. `completed` marks the job terminal.
    pub fn end(&mut self, completed: bool) -> Result<(), AppError> {
        if self.status.is_terminal() {
            return Err(AppError::StateError(format!(
                "job {} ({}) is already complete",
                self.id, self.category
            )));
        }
        let now = Utc::now();
        if completed {
            self.status = JobStatus::Complete;
            self.complete = true;
            self.completed = Some(now);
        }
        self.updated = now;
        Ok(())
    }
}
