use serde_json::Value;

use super::{Harvester, Termination};
use crate::batch::Batch;
use crate::identity::{Header, HeaderSource, StorefrontHeader};
use crate::models::{AppRef, Review};
use crate::traits::Fetcher;
use crate::validator::{ReviewValidator, Validator, is_empty_page};

pub const REVIEW_URL: &str = "https://itunes.apple.com/WebObjects/MZStore.woa/wa/userReviewsRow";

/// Pages through the reviews of a single app in fixed index windows.
///
/// Unlike search, a failed window does not end the sequence: the same window
/// is requested again, and the harvester gives up after `failure_threshold`
/// consecutive failures. `next_index` therefore always marks the first review
/// not yet harvested, which is what a resumed harvest starts from.
pub struct ReviewHarvester<F: Fetcher> {
    fetcher: F,
    url: String,
    header: Header,
    app: AppRef,
    page_size: u64,
    max_pages: u64,
    failure_threshold: u32,
    start_index: u64,
    pages: u64,
    failures: u32,
    termination: Option<Termination>,
}

impl<F: Fetcher> ReviewHarvester<F> {
    pub fn new(fetcher: F, app: AppRef, page_size: u64, max_pages: u64) -> Self {
        Self {
            fetcher,
            url: REVIEW_URL.to_string(),
            header: StorefrontHeader::us().next_header(),
            app,
            page_size,
            max_pages,
            failure_threshold: 10,
            start_index: 0,
            pages: 0,
            failures: 0,
            termination: None,
        }
    }

    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Resume from a stored cursor instead of the first review.
    pub fn with_start_index(mut self, start_index: u64) -> Self {
        self.start_index = start_index;
        self
    }

    pub fn app(&self) -> &AppRef {
        &self.app
    }

    /// Start of the next window to request.
    pub fn next_index(&self) -> u64 {
        self.start_index
    }

    fn params(&self) -> Vec<(String, String)> {
        vec![
            ("id".to_string(), self.app.id.to_string()),
            ("displayable-kind".to_string(), "11".to_string()),
            ("startIndex".to_string(), self.start_index.to_string()),
            (
                "endIndex".to_string(),
                (self.start_index + self.page_size).to_string(),
            ),
            ("sort".to_string(), "1".to_string()),
        ]
    }
}

impl<F: Fetcher> Harvester for ReviewHarvester<F> {
    type Item = Review;

    async fn next_batch(&mut self) -> Option<Batch<Review>> {
        if self.termination.is_some() {
            return None;
        }
        if self.pages >= self.max_pages {
            self.termination = Some(Termination::PageLimit);
            return None;
        }

        let params = self.params();
        let response = match self.fetcher.get(&self.url, Some(&self.header), &params).await {
            Ok(response) => Some(response),
            Err(e) => {
                tracing::warn!(app_id = self.app.id, start = self.start_index, error = %e, "Review request failed");
                None
            }
        };

        if is_empty_page(response.as_ref(), "userReviewList") {
            self.termination = Some(Termination::Exhausted);
            return None;
        }

        let mut batch = Batch::new();
        batch.record_response(response.as_ref());
        self.pages += 1;

        let validation = ReviewValidator.validate(response.as_ref());
        batch.tally(validation.outcome);
        let Some(payload) = validation.payload else {
            self.failures += 1;
            tracing::debug!(
                app_id = self.app.id,
                outcome = %validation.outcome,
                failures = self.failures,
                "Invalid review page"
            );
            if self.failures >= self.failure_threshold {
                self.termination = Some(Termination::Failed(validation.outcome));
            }
            return Some(batch);
        };
        self.failures = 0;
        self.start_index += self.page_size;

        let reviews = payload
            .get("userReviewList")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();

        for value in reviews {
            match Review::from_payload(&self.app, value) {
                Ok(review) => batch.items.push(review),
                Err(e) => {
                    tracing::debug!(app_id = self.app.id, error = %e, "Skipping malformed review");
                    batch.data_errors += 1;
                }
            }
        }

        Some(batch)
    }

    fn termination(&self) -> Option<Termination> {
        self.termination
    }
}
