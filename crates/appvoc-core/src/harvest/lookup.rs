use std::collections::VecDeque;

use super::{Harvester, Termination};
use crate::batch::Batch;
use crate::identity::Header;
use crate::models::{AppRef, Rating};
use crate::traits::BatchFetcher;
use crate::validator::{RatingValidator, Validator};

pub const RATING_URL: &str = "https://itunes.apple.com/us/customer-reviews";

/// Looks up ratings for a fixed set of apps, `batch_size` apps at a time.
///
/// Every app in a chunk is requested concurrently and validated on its own,
/// so one bad response only costs that app.
pub struct LookupHarvester<B: BatchFetcher> {
    fetcher: B,
    url: String,
    header: Option<Header>,
    chunks: VecDeque<Vec<AppRef>>,
    termination: Option<Termination>,
}

impl<B: BatchFetcher> LookupHarvester<B> {
    pub fn new(fetcher: B, apps: Vec<AppRef>, batch_size: usize) -> Self {
        let batch_size = batch_size.max(1);
        let chunks = apps
            .chunks(batch_size)
            .map(<[AppRef]>::to_vec)
            .collect::<VecDeque<_>>();
        Self {
            fetcher,
            url: RATING_URL.to_string(),
            header: None,
            chunks,
            termination: None,
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Use a fixed header instead of letting the fetcher rotate one.
    pub fn with_header(mut self, header: Header) -> Self {
        self.header = Some(header);
        self
    }

    /// Chunks not yet requested.
    pub fn remaining(&self) -> usize {
        self.chunks.len()
    }

    fn rating_url(&self, id: i64) -> String {
        format!("{}/id{}?displayable-kind=11", self.url, id)
    }
}

impl<B: BatchFetcher> Harvester for LookupHarvester<B> {
    type Item = Rating;

    async fn next_batch(&mut self) -> Option<Batch<Rating>> {
        let Some(chunk) = self.chunks.pop_front() else {
            self.termination = Some(Termination::Exhausted);
            return None;
        };

        let urls: Vec<String> = chunk.iter().map(|app| self.rating_url(app.id)).collect();
        let responses = self.fetcher.get_batch(&urls, self.header.as_ref()).await;

        let mut batch = Batch::new();
        for (i, app) in chunk.iter().enumerate() {
            let response = responses.get(i).and_then(Option::as_ref);
            batch.record_response(response);

            let validation = RatingValidator.validate(response);
            batch.tally(validation.outcome);
            let Some(payload) = validation.payload else {
                tracing::debug!(app_id = app.id, outcome = %validation.outcome, message = %validation.message, "Invalid rating response");
                continue;
            };

            match Rating::from_payload(app, &payload) {
                Ok(rating) => batch.items.push(rating),
                Err(e) => {
                    tracing::debug!(app_id = app.id, error = %e, "Skipping malformed rating");
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RawResponse;
    use crate::testutil::{MockBatchFetcher, make_app_ref, rating_body};

    fn url(id: i64) -> String {
        format!("{RATING_URL}/id{id}?displayable-kind=11")
    }

    fn fetcher_for(ids: impl IntoIterator<Item = i64>) -> MockBatchFetcher {
        let fetcher = MockBatchFetcher::new();
        for id in ids {
            fetcher.respond(&url(id), RawResponse::new(url(id), 200, rating_body(id).to_string()));
        }
        fetcher
    }

    #[tokio::test]
    async fn partitions_ids_into_batches() {
        let apps: Vec<_> = (1..=7).map(make_app_ref).collect();
        let fetcher = fetcher_for(1..=7);
        let mut harvester = LookupHarvester::new(fetcher.clone(), apps, 3);
        assert_eq!(harvester.remaining(), 3);

        let mut sizes = vec![];
        while let Some(batch) = harvester.next_batch().await {
            sizes.push(batch.items.len());
        }

        assert_eq!(sizes, vec![3, 3, 1]);
        assert_eq!(harvester.termination(), Some(Termination::Exhausted));
        assert_eq!(
            fetcher.requested(),
            vec![
                vec![url(1), url(2), url(3)],
                vec![url(4), url(5), url(6)],
                vec![url(7)],
            ]
        );
    }

    #[tokio::test]
    async fn one_failure_keeps_the_rest_of_the_batch() {
        let apps: Vec<_> = (1..=3).map(make_app_ref).collect();
        let fetcher = fetcher_for([1, 3]);
        fetcher.respond(&url(2), RawResponse::new(url(2), 200, r#"{"adamId": 2}"#));
        let mut harvester = LookupHarvester::new(fetcher, apps, 3);

        let batch = harvester.next_batch().await.unwrap();
        let ids: Vec<_> = batch.items.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 3]);
        assert_eq!(batch.data_errors, 1);
        assert_eq!(batch.requests, 3);
        assert!(batch.is_valid());
    }

    #[tokio::test]
    async fn missing_slots_are_server_errors() {
        let apps: Vec<_> = (1..=2).map(make_app_ref).collect();
        let fetcher = MockBatchFetcher::new();
        let mut harvester = LookupHarvester::new(fetcher, apps, 5);

        let batch = harvester.next_batch().await.unwrap();
        assert!(!batch.is_valid());
        assert_eq!(batch.server_errors, 2);
        assert!(harvester.next_batch().await.is_none());
    }

    #[tokio::test]
    async fn no_apps_yields_nothing() {
        let mut harvester = LookupHarvester::new(MockBatchFetcher::new(), vec![], 3);
        assert!(harvester.next_batch().await.is_none());
        assert_eq!(harvester.termination(), Some(Termination::Exhausted));
    }
}
