use serde_json::Value;

use super::{Harvester, Termination};
use crate::batch::Batch;
use crate::models::App;
use crate::traits::Fetcher;
use crate::validator::{ListingValidator, Validator, is_empty_page};

pub const SEARCH_URL: &str = "https://itunes.apple.com/search";

/// Offset-paginated search for apps matching a term.
///
/// The offset advances by the number of results the remote actually
/// returned, so a short page never skips records. A page that fails
/// validation is yielded as an error batch and ends the sequence without
/// moving the offset.
pub struct SearchHarvester<F: Fetcher> {
    fetcher: F,
    url: String,
    term: String,
    offset: u64,
    limit: u64,
    max_pages: u64,
    pages: u64,
    termination: Option<Termination>,
}

impl<F: Fetcher> SearchHarvester<F> {
    pub fn new(fetcher: F, term: impl Into<String>, limit: u64, max_pages: u64) -> Self {
        Self {
            fetcher,
            url: SEARCH_URL.to_string(),
            term: term.into(),
            offset: 0,
            limit,
            max_pages,
            pages: 0,
            termination: None,
        }
    }

    /// Start at `offset` instead of the first result.
    pub fn with_offset(mut self, offset: u64) -> Self {
        self.offset = offset;
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn pages(&self) -> u64 {
        self.pages
    }

    fn params(&self) -> Vec<(String, String)> {
        [
            ("media", "software".to_string()),
            ("term", self.term.clone()),
            ("country", "us".to_string()),
            ("lang", "en-us".to_string()),
            ("explicit", "yes".to_string()),
            ("limit", self.limit.to_string()),
            ("offset", self.offset.to_string()),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
    }
}

impl<F: Fetcher> Harvester for SearchHarvester<F> {
    type Item = App;

    async fn next_batch(&mut self) -> Option<Batch<App>> {
        if self.termination.is_some() {
            return None;
        }
        if self.pages >= self.max_pages {
            self.termination = Some(Termination::PageLimit);
            return None;
        }

        let params = self.params();
        let response = match self.fetcher.get(&self.url, None, &params).await {
            Ok(response) => Some(response),
            Err(e) => {
                tracing::warn!(term = %self.term, offset = self.offset, error = %e, "Search request failed");
                None
            }
        };

        if is_empty_page(response.as_ref(), "results") {
            tracing::debug!(term = %self.term, offset = self.offset, "Search results exhausted");
            self.termination = Some(Termination::Exhausted);
            return None;
        }

        let mut batch = Batch::new();
        batch.record_response(response.as_ref());

        let validation = ListingValidator.validate(response.as_ref());
        batch.tally(validation.outcome);
        let Some(payload) = validation.payload else {
            tracing::warn!(
                term = %self.term,
                offset = self.offset,
                outcome = %validation.outcome,
                message = %validation.message,
                "Invalid search page"
            );
            self.termination = Some(Termination::Failed(validation.outcome));
            return Some(batch);
        };

        let results = payload
            .get("results")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();

        for result in results {
            match App::from_listing(result) {
                Ok(app) => batch.items.push(app),
                Err(e) => {
                    tracing::debug!(term = %self.term, error = %e, "Skipping malformed listing");
                    batch.data_errors += 1;
                }
            }
        }

        self.offset += results.len() as u64;
        self.pages += 1;
        Some(batch)
    }

    fn termination(&self) -> Option<Termination> {
        self.termination
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::models::RawResponse;
    use crate::testutil::{MockFetcher, listing};
    use crate::validator::Outcome;
    use serde_json::json;

    fn page(ids: std::ops::Range<i64>) -> Result<RawResponse, AppError> {
        let results: Vec<_> = ids.map(listing).collect();
        Ok(RawResponse::new(
            SEARCH_URL,
            200,
            json!({"resultCount": results.len(), "results": results}).to_string(),
        ))
    }

    fn empty_page() -> Result<RawResponse, AppError> {
        Ok(RawResponse::new(
            SEARCH_URL,
            200,
            json!({"resultCount": 0, "results": []}).to_string(),
        ))
    }

    fn param<'a>(params: &'a [(String, String)], key: &str) -> &'a str {
        params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .unwrap()
    }

    #[tokio::test]
    async fn stops_at_page_limit() {
        let fetcher = MockFetcher::with_responses(vec![page(0..5), page(5..10), empty_page()]);
        let mut harvester = SearchHarvester::new(fetcher.clone(), "notes", 5, 2);

        let mut sizes = vec![];
        while let Some(batch) = harvester.next_batch().await {
            sizes.push(batch.items.len());
        }

        assert_eq!(sizes, vec![5, 5]);
        assert_eq!(harvester.termination(), Some(Termination::PageLimit));
        assert_eq!(fetcher.call_count(), 2);
    }

    #[tokio::test]
    async fn empty_page_exhausts() {
        let fetcher = MockFetcher::with_responses(vec![page(0..5), page(5..8), empty_page()]);
        let mut harvester = SearchHarvester::new(fetcher.clone(), "notes", 5, 10);

        assert_eq!(harvester.next_batch().await.unwrap().items.len(), 5);
        assert_eq!(harvester.next_batch().await.unwrap().items.len(), 3);
        assert!(harvester.next_batch().await.is_none());
        assert!(harvester.next_batch().await.is_none());
        assert_eq!(harvester.termination(), Some(Termination::Exhausted));
        assert_eq!(fetcher.call_count(), 3);
    }

    #[tokio::test]
    async fn offset_advances_by_items_returned() {
        let fetcher = MockFetcher::with_responses(vec![page(0..5), page(5..8), empty_page()]);
        let mut harvester = SearchHarvester::new(fetcher.clone(), "notes", 5, 10).with_offset(400);

        while harvester.next_batch().await.is_some() {}

        let calls = fetcher.calls();
        assert_eq!(param(&calls[0].params, "offset"), "400");
        assert_eq!(param(&calls[1].params, "offset"), "405");
        assert_eq!(param(&calls[2].params, "offset"), "408");
        assert_eq!(param(&calls[0].params, "term"), "notes");
        assert_eq!(param(&calls[0].params, "media"), "software");
        assert_eq!(harvester.offset(), 408);
    }

    #[tokio::test]
    async fn invalid_page_ends_without_advancing() {
        let fetcher = MockFetcher::with_responses(vec![
            page(0..5),
            Ok(RawResponse::new(SEARCH_URL, 503, "unavailable")),
        ]);
        let mut harvester = SearchHarvester::new(fetcher, "notes", 5, 10);

        assert!(harvester.next_batch().await.unwrap().is_valid());
        let failed = harvester.next_batch().await.unwrap();
        assert!(!failed.is_valid());
        assert_eq!(failed.server_errors, 1);
        assert_eq!(failed.requests, 1);

        assert!(harvester.next_batch().await.is_none());
        assert_eq!(
            harvester.termination(),
            Some(Termination::Failed(Outcome::ServerError))
        );
        assert_eq!(harvester.offset(), 5);
        assert_eq!(harvester.pages(), 1);
    }

    #[tokio::test]
    async fn transport_failure_counts_as_server_error() {
        let fetcher = MockFetcher::with_responses(vec![Err(AppError::Timeout(30))]);
        let mut harvester = SearchHarvester::new(fetcher, "notes", 5, 10);

        let batch = harvester.next_batch().await.unwrap();
        assert_eq!(batch.server_errors, 1);
        assert!(harvester.next_batch().await.is_none());
    }

    #[tokio::test]
    async fn malformed_listing_is_skipped() {
        let body = json!({"results": [listing(1), {"trackName": "no id"}, listing(3)]});
        let fetcher = MockFetcher::with_responses(vec![Ok(RawResponse::new(
            SEARCH_URL,
            200,
            body.to_string(),
        ))]);
        let mut harvester = SearchHarvester::new(fetcher, "notes", 5, 1);

        let batch = harvester.next_batch().await.unwrap();
        assert_eq!(batch.items.len(), 2);
        assert_eq!(batch.data_errors, 1);
        assert_eq!(harvester.offset(), 3);
    }
}
