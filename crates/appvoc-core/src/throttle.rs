//! Latency-driven request throttling.
//!
//! Two policies share the [`Throttle`] contract:
//!
//! - [`LatencyThrottle`] for serial sessions. Each delay moves halfway from the
//!   previous delay toward the observed latency, never below that latency, and
//!   is kept within `[min_delay, max_delay]`.
//! - [`BurstThrottle`] for bounded-concurrency fetching. Exponential
//!   inter-arrival delays, a per-epoch burn-in that calibrates a latency
//!   threshold, and a cooldown multiplier while the rolling latency window runs
//!   hot.
//!
//! Callers bracket each attempt with a [`RequestTimer`] and then call
//! [`Throttle::delay`] exactly once per finished attempt, failed attempts
//! included.
//!
//! ```rust,no_run
//! use appvoc_core::throttle::{LatencyThrottle, LatencyThrottleConfig, RequestTimer, Throttle};
//!
//! # async fn run() {
//! let throttle = LatencyThrottle::new(LatencyThrottleConfig::default());
//! let timer = RequestTimer::start();
//! // ... issue the request ...
//! throttle.delay(timer.stop()).await;
//! # }
//! ```

use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Measures the round-trip latency of one request attempt.
#[derive(Debug, Clone, Copy)]
pub struct RequestTimer {
    started: Instant,
}

impl RequestTimer {
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
        }
    }

    /// Stop the timer and return the elapsed latency.
    pub fn stop(self) -> Duration {
        self.started.elapsed()
    }
}

/// A policy that turns observed latency into an inter-request delay.
pub trait Throttle: Send + Sync + Clone {
    /// Compute (and record) the delay that should follow a request which took
    /// `latency`. Does not sleep.
    fn next_delay(&self, latency: Duration) -> Duration;

    /// Compute the delay for `latency` and suspend for it. Returns the delay.
    fn delay(&self, latency: Duration) -> impl Future<Output = Duration> + Send {
        let wait = self.next_delay(latency);
        async move {
            if !wait.is_zero() {
                tokio::time::sleep(wait).await;
            }
            wait
        }
    }
}

// ---------------------------------------------------------------------------
// Reporting
// ---------------------------------------------------------------------------

/// Summary statistics over a window of samples, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SampleStats {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    /// Population standard deviation.
    pub std: f64,
    pub total: f64,
}

impl SampleStats {
    pub fn from_samples(samples: &[f64]) -> Self {
        if samples.is_empty() {
            return Self::default();
        }
        let count = samples.len();
        let total: f64 = samples.iter().sum();
        let mean = total / count as f64;
        let variance = samples.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / count as f64;
        Self {
            count,
            min: samples.iter().copied().fold(f64::INFINITY, f64::min),
            max: samples.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            mean,
            std: variance.sqrt(),
            total,
        }
    }
}

/// Latency and delay statistics emitted every `verbose` requests.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThrottleReport {
    pub requests: u64,
    pub latency: SampleStats,
    pub delay: SampleStats,
}

/// Collects samples between reports.
#[derive(Debug)]
struct SampleLog {
    verbose: u64,
    requests: u64,
    latencies: Vec<f64>,
    delays: Vec<f64>,
    last_report: Option<ThrottleReport>,
}

impl SampleLog {
    fn new(verbose: u64) -> Self {
        Self {
            verbose: verbose.max(1),
            requests: 0,
            latencies: Vec::new(),
            delays: Vec::new(),
            last_report: None,
        }
    }

    fn record(&mut self, throttle: &'static str, latency: f64, delay: f64) {
        self.requests += 1;
        self.latencies.push(latency);
        self.delays.push(delay);

        if self.requests % self.verbose == 0 {
            let report = ThrottleReport {
                requests: self.requests,
                latency: SampleStats::from_samples(&self.latencies),
                delay: SampleStats::from_samples(&self.delays),
            };
            tracing::debug!(
                throttle,
                requests = report.requests,
                latency_min = report.latency.min,
                latency_max = report.latency.max,
                latency_mean = report.latency.mean,
                latency_std = report.latency.std,
                latency_total = report.latency.total,
                delay_min = report.delay.min,
                delay_max = report.delay.max,
                delay_mean = report.delay.mean,
                delay_std = report.delay.std,
                delay_total = report.delay.total,
                "Throttle statistics"
            );
            self.latencies.clear();
            self.delays.clear();
            self.last_report = Some(report);
        }
    }
}

fn lock<'a, T>(mutex: &'a Mutex<T>, throttle: &'static str) -> MutexGuard<'a, T> {
    mutex.lock().unwrap_or_else(|poisoned| {
        tracing::warn!(throttle, "Recovered from poisoned mutex");
        poisoned.into_inner()
    })
}

// ---------------------------------------------------------------------------
// LatencyThrottle
// ---------------------------------------------------------------------------

/// Configuration for the serial latency throttle.
#[derive(Debug, Clone)]
pub struct LatencyThrottleConfig {
    /// Delay assumed before the first request has been observed.
    pub start_delay: Duration,
    /// Politeness floor.
    pub min_delay: Duration,
    /// Liveness ceiling.
    pub max_delay: Duration,
    /// Requests between statistics reports.
    pub verbose: u64,
}

impl Default for LatencyThrottleConfig {
    fn default() -> Self {
        Self {
            start_delay: Duration::from_secs(3),
            min_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            verbose: 50,
        }
    }
}

impl LatencyThrottleConfig {
    pub fn new(start_delay: Duration, min_delay: Duration, max_delay: Duration) -> Self {
        Self {
            start_delay,
            min_delay,
            max_delay,
            ..Default::default()
        }
    }

    pub fn with_verbose(mut self, verbose: u64) -> Self {
        self.verbose = verbose;
        self
    }
}

#[derive(Debug)]
struct LatencyState {
    prior_delay: Duration,
    log: SampleLog,
}

/// Serial throttle converging on the server's response time.
#[derive(Clone)]
pub struct LatencyThrottle {
    config: LatencyThrottleConfig,
    state: Arc<Mutex<LatencyState>>,
}

impl LatencyThrottle {
    pub fn new(config: LatencyThrottleConfig) -> Self {
        let state = LatencyState {
            prior_delay: config.start_delay,
            log: SampleLog::new(config.verbose),
        };
        Self {
            config,
            state: Arc::new(Mutex::new(state)),
        }
    }

    pub fn config(&self) -> &LatencyThrottleConfig {
        &self.config
    }

    /// The most recently computed delay (the start delay before any request).
    pub fn prior_delay(&self) -> Duration {
        lock(&self.state, "latency").prior_delay
    }

    pub fn last_report(&self) -> Option<ThrottleReport> {
        lock(&self.state, "latency").log.last_report
    }
}

impl Throttle for LatencyThrottle {
    fn next_delay(&self, latency: Duration) -> Duration {
        let mut state = lock(&self.state, "latency");

        let averaged = (latency + state.prior_delay) / 2;
        // max/min rather than clamp: a misconfigured floor above the ceiling
        // resolves to the ceiling instead of panicking.
        let delay = latency
            .max(averaged)
            .max(self.config.min_delay)
            .min(self.config.max_delay);

        state.prior_delay = delay;
        state
            .log
            .record("latency", latency.as_secs_f64(), delay.as_secs_f64());
        delay
    }
}

// ---------------------------------------------------------------------------
// BurstThrottle
// ---------------------------------------------------------------------------

/// Configuration for the burst-adaptive throttle.
#[derive(Debug, Clone)]
pub struct BurstThrottleConfig {
    /// Requests per epoch spent calibrating the latency threshold.
    pub burnin_period: u64,
    /// Epoch length in requests. Burn-in restarts at each epoch boundary.
    pub burnin_reset: u64,
    /// Requests per second during burn-in.
    pub burnin_rate: f64,
    /// Standard deviations above the burn-in mean that count as "slow".
    pub burnin_threshold_factor: f64,
    pub rolling_window_size: usize,
    /// Delay multiplier applied while cooling down.
    pub cooldown_factor: f64,
    /// Consecutive requests a cooldown lasts.
    pub cooldown_phase: u32,
    /// Fraction of the rolling window above threshold that is tolerated.
    pub tolerance: f64,
    /// Requests per second after burn-in.
    pub rate: f64,
    pub verbose: u64,
    /// Fixed RNG seed for reproducible delays.
    pub seed: Option<u64>,
}

impl Default for BurstThrottleConfig {
    fn default() -> Self {
        Self {
            burnin_period: 50,
            burnin_reset: 1000,
            burnin_rate: 1.0,
            burnin_threshold_factor: 2.0,
            rolling_window_size: 25,
            cooldown_factor: 2.0,
            cooldown_phase: 25,
            tolerance: 0.8,
            rate: 1.0,
            verbose: 50,
            seed: None,
        }
    }
}

impl BurstThrottleConfig {
    pub fn with_burnin(mut self, period: u64, reset: u64, rate: f64, threshold_factor: f64) -> Self {
        self.burnin_period = period;
        self.burnin_reset = reset;
        self.burnin_rate = rate;
        self.burnin_threshold_factor = threshold_factor;
        self
    }

    pub fn with_window(mut self, size: usize, tolerance: f64) -> Self {
        self.rolling_window_size = size;
        self.tolerance = tolerance;
        self
    }

    pub fn with_cooldown(mut self, factor: f64, phase: u32) -> Self {
        self.cooldown_factor = factor;
        self.cooldown_phase = phase;
        self
    }

    pub fn with_rate(mut self, rate: f64) -> Self {
        self.rate = rate;
        self
    }

    pub fn with_verbose(mut self, verbose: u64) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

/// Latency statistics computed at the end of a burn-in phase.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BurnIn {
    pub mean: f64,
    pub std: f64,
    pub threshold: f64,
}

#[derive(Debug)]
struct BurstState {
    counter: u64,
    burnin_samples: Vec<f64>,
    burnin: Option<BurnIn>,
    window: VecDeque<f64>,
    cooldown_remaining: u32,
    rng: StdRng,
    log: SampleLog,
}

impl BurstState {
    fn reset_epoch(&mut self) {
        self.burnin_samples.clear();
        self.burnin = None;
    }

    /// Draw an exponential inter-arrival time (seconds) by inverse transform.
    fn exponential(&mut self, rate: f64) -> f64 {
        if rate <= 0.0 || !rate.is_finite() {
            return 0.0;
        }
        let u: f64 = self.rng.random();
        -(1.0 - u).ln() / rate
    }

    fn push_latency(&mut self, latency: f64, capacity: usize) {
        if self.window.len() == capacity {
            self.window.pop_front();
        }
        self.window.push_back(latency);
    }

    fn running_hot(&self, tolerance: f64, capacity: usize) -> bool {
        let Some(burnin) = self.burnin else {
            return false;
        };
        let slow = self
            .window
            .iter()
            .filter(|latency| **latency > burnin.threshold)
            .count();
        slow as f64 > tolerance * capacity as f64
    }
}

/// Throttle for concurrent fetching. Shared by all in-flight tasks.
#[derive(Clone)]
pub struct BurstThrottle {
    config: BurstThrottleConfig,
    state: Arc<Mutex<BurstState>>,
}

impl BurstThrottle {
    pub fn new(mut config: BurstThrottleConfig) -> Self {
        config.burnin_reset = config.burnin_reset.max(1);
        config.rolling_window_size = config.rolling_window_size.max(1);

        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let state = BurstState {
            counter: 0,
            burnin_samples: Vec::with_capacity(config.burnin_period as usize),
            burnin: None,
            window: VecDeque::with_capacity(config.rolling_window_size),
            cooldown_remaining: 0,
            rng,
            log: SampleLog::new(config.verbose),
        };
        Self {
            config,
            state: Arc::new(Mutex::new(state)),
        }
    }

    pub fn config(&self) -> &BurstThrottleConfig {
        &self.config
    }

    /// Statistics of the current epoch's completed burn-in, if any.
    pub fn burnin(&self) -> Option<BurnIn> {
        lock(&self.state, "burst").burnin
    }

    pub fn is_cooling_down(&self) -> bool {
        lock(&self.state, "burst").cooldown_remaining > 0
    }

    /// Requests observed so far.
    pub fn requests(&self) -> u64 {
        lock(&self.state, "burst").counter
    }

    pub fn last_report(&self) -> Option<ThrottleReport> {
        lock(&self.state, "burst").log.last_report
    }
}

impl Throttle for BurstThrottle {
    fn next_delay(&self, latency: Duration) -> Duration {
        let cfg = &self.config;
        let latency = latency.as_secs_f64();
        let mut state = lock(&self.state, "burst");

        let position = state.counter % cfg.burnin_reset;
        if position == 0 {
            state.reset_epoch();
        }

        let delay = if position < cfg.burnin_period {
            if state.burnin_samples.is_empty() {
                tracing::debug!(request = state.counter, "Starting burn-in phase");
            }
            state.burnin_samples.push(latency);
            if state.burnin_samples.len() as u64 == cfg.burnin_period {
                let stats = SampleStats::from_samples(&state.burnin_samples);
                let burnin = BurnIn {
                    mean: stats.mean,
                    std: stats.std,
                    threshold: stats.mean + cfg.burnin_threshold_factor * stats.std,
                };
                tracing::debug!(
                    mean = burnin.mean,
                    std = burnin.std,
                    threshold = burnin.threshold,
                    "Burn-in phase complete"
                );
                state.burnin = Some(burnin);
            }
            state.exponential(cfg.burnin_rate)
        } else {
            state.push_latency(latency, cfg.rolling_window_size);
            let base = state.exponential(cfg.rate);

            if state.cooldown_remaining > 0 {
                state.cooldown_remaining -= 1;
                if state.cooldown_remaining == 0 {
                    tracing::debug!(request = state.counter, "Ending cooldown phase");
                }
                base * cfg.cooldown_factor
            } else if cfg.cooldown_phase > 0
                && state.running_hot(cfg.tolerance, cfg.rolling_window_size)
            {
                tracing::debug!(
                    request = state.counter,
                    factor = cfg.cooldown_factor,
                    phase = cfg.cooldown_phase,
                    "Latency running hot, starting cooldown phase"
                );
                state.cooldown_remaining = cfg.cooldown_phase - 1;
                base * cfg.cooldown_factor
            } else {
                base
            }
        };

        state.counter += 1;
        state.log.record("burst", latency, delay);

        if delay.is_finite() && delay > 0.0 {
            Duration::from_secs_f64(delay)
        } else {
            Duration::ZERO
        }
    }
}
