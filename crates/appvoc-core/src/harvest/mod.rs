//! Harvesters turn a remote resource into a finite sequence of batches.
//!
//! Each harvester is pulled with [`Harvester::next_batch`] until it returns
//! `None`. A harvester is not restartable; resuming means building a new one
//! from persisted state (a project's start page, the remaining app ids).

mod lookup;
mod review;
mod search;

use std::fmt;
use std::future::Future;

pub use lookup::{LookupHarvester, RATING_URL};
pub use review::{REVIEW_URL, ReviewHarvester};
pub use search::{SEARCH_URL, SearchHarvester};

use crate::batch::Batch;
use crate::validator::Outcome;

/// Why a harvester stopped producing batches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The remote had no more data.
    Exhausted,
    /// The configured page limit was reached.
    PageLimit,
    /// A page failed validation and the sequence was cut short.
    Failed(Outcome),
}

impl Termination {
    pub fn is_exhausted(&self) -> bool {
        matches!(self, Termination::Exhausted)
    }
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Termination::Exhausted => write!(f, "exhausted"),
            Termination::PageLimit => write!(f, "page limit"),
            Termination::Failed(outcome) => write!(f, "failed ({})", outcome),
        }
    }
}

/// A lazy, finite source of batches.
pub trait Harvester: Send {
    type Item: Send;

    /// Fetch and parse the next batch, or `None` once the sequence has ended.
    fn next_batch(&mut self) -> impl Future<Output = Option<Batch<Self::Item>>> + Send;

    /// How the sequence ended. `None` while batches may still follow.
    fn termination(&self) -> Option<Termination>;
}
