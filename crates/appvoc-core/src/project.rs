use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::job::ControllerKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProjectStatus {
    Ready,
    InProgress,
    Complete,
}

impl ProjectStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectStatus::Ready => "ready",
            ProjectStatus::InProgress => "in-progress",
            ProjectStatus::Complete => "complete",
        }
    }
}

impl fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ProjectStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ready" => Ok(ProjectStatus::Ready),
            "in-progress" => Ok(ProjectStatus::InProgress),
            "complete" => Ok(ProjectStatus::Complete),
            _ => Err(format!("Unknown project status: {}", s)),
        }
    }
}

/// Progress of a term-based search harvest, used to resume where the last
/// run stopped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: Uuid,
    pub controller: ControllerKind,
    pub term: String,
    pub status: ProjectStatus,
    pub page_size: i64,
    /// Pages fetched so far, across all runs.
    pub pages: i64,
    /// Pages' worth of apps harvested: `apps / page_size`.
    pub vpages: i64,
    pub apps: i64,
    pub started: Option<DateTime<Utc>>,
    pub updated: Option<DateTime<Utc>>,
    pub completed: Option<DateTime<Utc>>,
}

impl Project {
    pub fn new(controller: ControllerKind, term: impl Into<String>, page_size: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            controller,
            term: term.into(),
            status: ProjectStatus::Ready,
            page_size,
            pages: 0,
            vpages: 0,
            apps: 0,
            started: None,
            updated: None,
            completed: None,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.status == ProjectStatus::Complete
    }

    /// Move a ready project to in-progress. Starting an in-progress project is
    /// a no-op.
    pub fn start(&mut self) -> Result<(), AppError> {
        match self.status {
            ProjectStatus::Complete => Err(AppError::StateError(format!(
                "project '{}' is already complete",
                self.term
            ))),
            ProjectStatus::InProgress => Ok(()),
            ProjectStatus::Ready => {
                let now = Utc::now();
                self.status = ProjectStatus::InProgress;
                self.started = Some(now);
                self.updated = Some(now);
                Ok(())
            }
        }
    }

    /// Account for one harvested page holding `items` apps.
    pub fn update(&mut self, items: i64) {
        self.pages += 1;
        self.apps += items;
        self.vpages = self.start_page();
        self.updated = Some(Utc::now());
    }

    pub fn complete(&mut self) -> Result<(), AppError> {
        if self.is_complete() {
            return Err(AppError::StateError(format!(
                "project '{}' is already complete",
                self.term
            )));
        }
        let now = Utc::now();
        self.status = ProjectStatus::Complete;
        self.completed = Some(now);
        self.updated = Some(now);
        Ok(())
    }

    /// Offset a resumed search starts from. Apps on the partial page past
    /// it are fetched again, so the count is rolled back to match.
    pub fn rewind(&mut self) -> u64 {
        let resume_page = self.start_page();
        self.apps = resume_page * self.page_size.max(0);
        self.vpages = resume_page;
        self.apps.max(0) as u64
    }

    /// First page not yet covered by harvested apps.
    pub fn start_page(&self) -> i64 {
        if self.page_size <= 0 {
            return 0;
        }
        self.apps / self.page_size
    }
}
