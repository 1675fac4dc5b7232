use std::str::FromStr;
use std::time::Duration;

use crate::error::AppError;
use crate::throttle::{BurstThrottleConfig, LatencyThrottleConfig};

/// Every tunable of a harvest: pagination, fetch limits, throttling and the
/// controller loop.
#[derive(Debug, Clone)]
pub struct HarvestConfig {
    /// Pages a single search or review harvester may emit per run.
    pub max_pages: u64,
    /// Search results per page.
    pub page_size: u64,
    /// Reviews per window.
    pub review_page_size: u64,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Transport retries for serial requests.
    pub session_retries: u32,
    /// Transport retries for each request of a concurrent batch.
    pub retries: u32,
    pub latency_throttle: LatencyThrottleConfig,
    pub burst_throttle: BurstThrottleConfig,
    pub max_concurrency: usize,
    /// App ids per rating lookup batch.
    pub batch_size: usize,
    /// Consecutive failed batches tolerated before a run is abandoned.
    pub failure_threshold: u32,
    /// Batches between progress reports.
    pub verbose: u64,
    /// Apps need more ratings than this before their reviews are harvested.
    pub min_ratings: i64,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            max_pages: u64::MAX,
            page_size: 200,
            review_page_size: 400,
            timeout: Duration::from_secs(30),
            session_retries: 3,
            retries: 3,
            latency_throttle: LatencyThrottleConfig::default(),
            burst_throttle: BurstThrottleConfig::default(),
            max_concurrency: 10,
            batch_size: 100,
            failure_threshold: 10,
            verbose: 10,
            min_ratings: 20,
        }
    }
}

fn env_parse<T: FromStr>(name: &str) -> Result<Option<T>, AppError> {
    match std::env::var(name) {
        Err(_) => Ok(None),
        Ok(raw) => raw.trim().parse().map(Some).map_err(|_| {
            AppError::ConfigError(format!("Invalid {name} '{raw}': expected a number"))
        }),
    }
}

fn positive<T: PartialOrd + Default>(name: &str, value: T) -> Result<T, AppError> {
    if value > T::default() {
        Ok(value)
    } else {
        Err(AppError::ConfigError(format!("{name} must be greater than zero")))
    }
}

impl HarvestConfig {
    /// Defaults overridden by `APPVOC_*` environment variables.
    ///
    /// - `APPVOC_MAX_PAGES`, `APPVOC_PAGE_SIZE`, `APPVOC_REVIEW_PAGE_SIZE`
    /// - `APPVOC_TIMEOUT_SECS`, `APPVOC_SESSION_RETRIES`, `APPVOC_RETRIES`
    /// - `APPVOC_DELAY_START_SECS`, `APPVOC_DELAY_MIN_SECS`, `APPVOC_DELAY_MAX_SECS`
    /// - `APPVOC_BURNIN_PERIOD`, `APPVOC_BURNIN_RESET`, `APPVOC_BURNIN_RATE`,
    ///   `APPVOC_BURNIN_THRESHOLD_FACTOR`, `APPVOC_WINDOW_SIZE`,
    ///   `APPVOC_COOLDOWN_FACTOR`, `APPVOC_COOLDOWN_PHASE`, `APPVOC_TOLERANCE`,
    ///   `APPVOC_RATE`
    /// - `APPVOC_MAX_CONCURRENCY`, `APPVOC_BATCH_SIZE`,
    ///   `APPVOC_FAILURE_THRESHOLD`, `APPVOC_VERBOSE`, `APPVOC_MIN_RATINGS`
    pub fn from_env() -> Result<Self, AppError> {
        let mut config = Self::default();

        if let Some(v) = env_parse("APPVOC_MAX_PAGES")? {
            config.max_pages = positive("APPVOC_MAX_PAGES", v)?;
        }
        if let Some(v) = env_parse("APPVOC_PAGE_SIZE")? {
            config.page_size = positive("APPVOC_PAGE_SIZE", v)?;
        }
        if let Some(v) = env_parse("APPVOC_REVIEW_PAGE_SIZE")? {
            config.review_page_size = positive("APPVOC_REVIEW_PAGE_SIZE", v)?;
        }
        if let Some(v) = env_parse::<u64>("APPVOC_TIMEOUT_SECS")? {
            config.timeout = Duration::from_secs(positive("APPVOC_TIMEOUT_SECS", v)?);
        }
        if let Some(v) = env_parse("APPVOC_SESSION_RETRIES")? {
            config.session_retries = v;
        }
        if let Some(v) = env_parse("APPVOC_RETRIES")? {
            config.retries = v;
        }

        let latency = &mut config.latency_throttle;
        if let Some(v) = env_parse::<f64>("APPVOC_DELAY_START_SECS")? {
            latency.start_delay = Duration::from_secs_f64(v.max(0.0));
        }
        if let Some(v) = env_parse::<f64>("APPVOC_DELAY_MIN_SECS")? {
            latency.min_delay = Duration::from_secs_f64(v.max(0.0));
        }
        if let Some(v) = env_parse::<f64>("APPVOC_DELAY_MAX_SECS")? {
            latency.max_delay = Duration::from_secs_f64(v.max(0.0));
        }
        if latency.min_delay > latency.max_delay {
            return Err(AppError::ConfigError(
                "APPVOC_DELAY_MIN_SECS must not exceed APPVOC_DELAY_MAX_SECS".into(),
            ));
        }

        let burst = &mut config.burst_throttle;
        if let Some(v) = env_parse("APPVOC_BURNIN_PERIOD")? {
            burst.burnin_period = positive("APPVOC_BURNIN_PERIOD", v)?;
        }
        if let Some(v) = env_parse("APPVOC_BURNIN_RESET")? {
            burst.burnin_reset = positive("APPVOC_BURNIN_RESET", v)?;
        }
        if let Some(v) = env_parse("APPVOC_BURNIN_RATE")? {
            burst.burnin_rate = positive("APPVOC_BURNIN_RATE", v)?;
        }
        if let Some(v) = env_parse("APPVOC_BURNIN_THRESHOLD_FACTOR")? {
            burst.burnin_threshold_factor = v;
        }
        if let Some(v) = env_parse("APPVOC_WINDOW_SIZE")? {
            burst.rolling_window_size = positive("APPVOC_WINDOW_SIZE", v)?;
        }
        if let Some(v) = env_parse("APPVOC_COOLDOWN_FACTOR")? {
            burst.cooldown_factor = positive("APPVOC_COOLDOWN_FACTOR", v)?;
        }
        if let Some(v) = env_parse("APPVOC_COOLDOWN_PHASE")? {
            burst.cooldown_phase = v;
        }
        if let Some(v) = env_parse("APPVOC_TOLERANCE")? {
            burst.tolerance = v;
        }
        if let Some(v) = env_parse("APPVOC_RATE")? {
            burst.rate = positive("APPVOC_RATE", v)?;
        }

        if let Some(v) = env_parse("APPVOC_MAX_CONCURRENCY")? {
            config.max_concurrency = positive("APPVOC_MAX_CONCURRENCY", v)?;
        }
        if let Some(v) = env_parse("APPVOC_BATCH_SIZE")? {
            config.batch_size = positive("APPVOC_BATCH_SIZE", v)?;
        }
        if let Some(v) = env_parse("APPVOC_FAILURE_THRESHOLD")? {
            config.failure_threshold = v;
        }
        if let Some(v) = env_parse("APPVOC_VERBOSE")? {
            config.verbose = positive("APPVOC_VERBOSE", v)?;
        }
        if let Some(v) = env_parse("APPVOC_MIN_RATINGS")? {
            config.min_ratings = v;
        }

        Ok(config)
    }

    pub fn with_max_pages(mut self, max_pages: u64) -> Self {
        self.max_pages = max_pages;
        self
    }

    pub fn with_page_size(mut self, page_size: u64) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_review_page_size(mut self, size: u64) -> Self {
        self.review_page_size = size;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retries(mut self, session_retries: u32, retries: u32) -> Self {
        self.session_retries = session_retries;
        self.retries = retries;
        self
    }

    pub fn with_latency_throttle(mut self, throttle: LatencyThrottleConfig) -> Self {
        self.latency_throttle = throttle;
        self
    }

    pub fn with_burst_throttle(mut self, throttle: BurstThrottleConfig) -> Self {
        self.burst_throttle = throttle;
        self
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    pub fn with_verbose(mut self, verbose: u64) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn with_min_ratings(mut self, min_ratings: i64) -> Self {
        self.min_ratings = min_ratings;
        self
    }
}
