use std::sync::Arc;
use std::time::Duration;

use appvoc_core::identity::{Header, HeaderSource, ProxyPool};
use appvoc_core::models::RawResponse;
use appvoc_core::throttle::{RequestTimer, Throttle};
use appvoc_core::traits::BatchFetcher;
use futures::future::join_all;
use tokio::sync::Semaphore;

use crate::fetcher::{build_client, build_url, send};

/// Concurrent fetcher: many GETs at once, at most `max_concurrency` in
/// flight, results in request order.
///
/// One rotated header covers a whole batch; each attempt redraws its proxy.
/// The throttle is shared by every request of every batch.
#[derive(Clone)]
pub struct ConcurrentFetcher<T: Throttle, H: HeaderSource> {
    throttle: T,
    headers: H,
    proxies: ProxyPool,
    semaphore: Arc<Semaphore>,
    timeout: Duration,
    retries: u32,
}

impl<T: Throttle, H: HeaderSource> ConcurrentFetcher<T, H> {
    pub fn new(throttle: T, headers: H, proxies: ProxyPool, max_concurrency: usize) -> Self {
        Self {
            throttle,
            headers,
            proxies,
            semaphore: Arc::new(Semaphore::new(max_concurrency.max(1))),
            timeout: Duration::from_secs(30),
            retries: 3,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Attempts per URL. Zero is treated as one.
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn throttle(&self) -> &T {
        &self.throttle
    }

    async fn fetch_one(&self, url: &str, header: &Header) -> Option<RawResponse> {
        let url = match build_url(url, &[]) {
            Ok(url) => url,
            Err(e) => {
                tracing::warn!(%url, error = %e, "Skipping malformed URL");
                return None;
            }
        };
        let _permit = self.semaphore.clone().acquire_owned().await.ok()?;

        let attempts = self.retries.max(1);
        for attempt in 1..=attempts {
            let client = match build_client(header, self.proxies.pick(), self.timeout) {
                Ok(client) => client,
                Err(e) => {
                    tracing::warn!(%url, error = %e, "Could not build client");
                    return None;
                }
            };

            let timer = RequestTimer::start();
            let result = send(&client, &url, self.timeout).await;
            let latency = timer.stop();
            self.throttle.delay(latency).await;

            match result {
                Ok(response) => return Some(response.with_latency(latency)),
                Err(e) => {
                    tracing::debug!(
                        %url,
                        attempt,
                        transient = e.is_retryable(),
                        error = %e,
                        "Batch request failed"
                    );
                }
            }
        }

        tracing::warn!(%url, attempts, "Retries exhausted");
        None
    }
}

impl<T: Throttle, H: HeaderSource> BatchFetcher for ConcurrentFetcher<T, H> {
    async fn get_batch(&self, urls: &[String], header: Option<&Header>) -> Vec<Option<RawResponse>> {
        let header = header.cloned().unwrap_or_else(|| self.headers.next_header());
        join_all(urls.iter().map(|url| self.fetch_one(url, &header))).await
    }
}
