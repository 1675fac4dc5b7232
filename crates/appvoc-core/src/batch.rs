use std::time::Duration;

use crate::models::RawResponse;
use crate::validator::Outcome;

/// One page or chunk produced by a harvester. Never persisted.
#[derive(Debug, Clone)]
pub struct Batch<T> {
    pub items: Vec<T>,
    pub requests: u64,
    pub size_bytes: u64,
    /// Summed latency of the responses that contributed to this batch.
    pub latency: Duration,
    pub data_errors: u64,
    pub client_errors: u64,
    pub server_errors: u64,
}

impl<T> Default for Batch<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            requests: 0,
            size_bytes: 0,
            latency: Duration::ZERO,
            data_errors: 0,
            client_errors: 0,
            server_errors: 0,
        }
    }
}

impl<T> Batch<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Account for one request and its response, if any arrived.
    pub fn record_response(&mut self, response: Option<&RawResponse>) {
        self.requests += 1;
        if let Some(response) = response {
            self.size_bytes += response.size;
            self.latency += response.latency;
        }
    }

    /// Count a validator outcome against this batch.
    pub fn tally(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Valid => {}
            Outcome::DataError => self.data_errors += 1,
            Outcome::ClientError => self.client_errors += 1,
            Outcome::ServerError => self.server_errors += 1,
        }
    }

    pub fn errors(&self) -> u64 {
        self.data_errors + self.client_errors + self.server_errors
    }

    /// A batch is valid when at least one item came through.
    pub fn is_valid(&self) -> bool {
        !self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tally_counts_each_error_kind() {
        let mut batch: Batch<i64> = Batch::new();
        batch.tally(Outcome::Valid);
        batch.tally(Outcome::DataError);
        batch.tally(Outcome::ClientError);
        batch.tally(Outcome::ServerError);
        batch.tally(Outcome::ServerError);

        assert_eq!(batch.data_errors, 1);
        assert_eq!(batch.client_errors, 1);
        assert_eq!(batch.server_errors, 2);
        assert_eq!(batch.errors(), 4);
        assert!(!batch.is_valid());
    }

    #[test]
    fn record_response_sums_size_and_latency() {
        let mut batch: Batch<i64> = Batch::new();
        let a = RawResponse::new("http://a", 200, "12345").with_latency(Duration::from_millis(100));
        let b = RawResponse::new("http://b", 200, "123").with_latency(Duration::from_millis(50));
        batch.record_response(Some(&a));
        batch.record_response(Some(&b));
        batch.record_response(None);

        assert_eq!(batch.requests, 3);
        assert_eq!(batch.size_bytes, 8);
        assert_eq!(batch.latency, Duration::from_millis(150));
    }
}
