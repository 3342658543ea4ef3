//! Orchestrator configuration constants

use std::time::Duration;

/// Nominal upstream cap on requests per second.
pub const REQUESTS_PER_SECOND_CAP: u64 = 100;

/// Nominal upstream cap on requests per hour.
pub const REQUESTS_PER_HOUR_CAP: u64 = 36_000;

/// Share of each nominal cap the orchestrator allows itself to use.
/// Leaves headroom for clock skew between our windows and the upstream's.
pub const SAFETY_COEFFICIENT: f64 = 0.9;

/// Number of workers the per-second budget is split across.
pub const DEFAULT_WORKER_COUNT: u64 = 4;

/// Delay each lane waits before every dispatch.
pub const DEFAULT_DISPATCH_DELAY: Duration = Duration::from_millis(40);

/// Attempts per fetch, including the first one.
pub const MAX_ATTEMPTS: u32 = 3;

/// Initial backoff between retries in milliseconds (0 disables backoff;
/// the fresh slot already paces retries).
pub const INITIAL_BACKOFF_MS: u64 = 0;

/// Maximum backoff delay in milliseconds.
pub const MAX_BACKOFF_MS: u64 = 30_000;

/// Upper bound on forward season probes per discovery.
/// Seasons advance a few times a year; hitting this means the upstream kept
/// answering for seasons that cannot exist yet.
pub const MAX_FORWARD_SEASON_PROBES: u32 = 32;

/// Upper bound on backward season probes per discovery.
pub const MAX_BACKWARD_SEASON_PROBES: u32 = 8;

/// Lowest season number ever probed.
pub const MIN_SEASON: i32 = 1;

/// Season the current-or-last fallback chain starts from when the dedicated
/// current season probe fails.
pub const KNOWN_RECENT_SEASON: i32 = 56;

/// How often the live quota watchdog checks for missing feedback.
pub const QUOTA_WATCHDOG_PERIOD: Duration = Duration::from_secs(3600);

/// How long past its `reset` an observation may go unreplaced before the
/// watchdog refills on its own.
pub const QUOTA_STALE_AFTER: Duration = Duration::from_secs(60);

/// Apply [`SAFETY_COEFFICIENT`] to a nominal cap, never dropping below 1.
pub fn safe_cap(nominal: u64, coefficient: f64) -> u64 {
    ((nominal as f64 * coefficient).floor() as u64).max(1)
}

/// Calculate exponential backoff delay for the given retry (0-based)
pub fn calculate_backoff(initial_ms: u64, retry: u32) -> Duration {
    if initial_ms == 0 {
        return Duration::ZERO;
    }
    let factor = 2u64.checked_pow(retry).unwrap_or(u64::MAX);
    let delay_ms = initial_ms.saturating_mul(factor).min(MAX_BACKOFF_MS);
    Duration::from_millis(delay_ms)
}

/// Tunables for one orchestrator instance
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Nominal per-second cap
    pub requests_per_second: u64,
    /// Nominal per-hour cap
    pub requests_per_hour: u64,
    /// Share of each cap actually used
    pub safety_coefficient: f64,
    /// Workers the per-second budget is split across
    pub worker_count: u64,
    /// Delay before each dispatch within a lane
    pub dispatch_delay: Duration,
    /// Attempts per fetch, including the first
    pub max_attempts: u32,
    /// Initial retry backoff in milliseconds
    pub initial_backoff_ms: u64,
    /// Forward season probe cap
    pub max_forward_season_probes: u32,
    /// Backward season probe cap
    pub max_backward_season_probes: u32,
    /// Lowest season ever probed
    pub min_season: i32,
    /// Seed for the current-or-last fallback chain
    pub known_recent_season: i32,
    /// Live quota watchdog period
    pub quota_watchdog_period: Duration,
    /// Staleness threshold for the live quota watchdog
    pub quota_stale_after: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            requests_per_second: REQUESTS_PER_SECOND_CAP,
            requests_per_hour: REQUESTS_PER_HOUR_CAP,
            safety_coefficient: SAFETY_COEFFICIENT,
            worker_count: DEFAULT_WORKER_COUNT,
            dispatch_delay: DEFAULT_DISPATCH_DELAY,
            max_attempts: MAX_ATTEMPTS,
            initial_backoff_ms: INITIAL_BACKOFF_MS,
            max_forward_season_probes: MAX_FORWARD_SEASON_PROBES,
            max_backward_season_probes: MAX_BACKWARD_SEASON_PROBES,
            min_season: MIN_SEASON,
            known_recent_season: KNOWN_RECENT_SEASON,
            quota_watchdog_period: QUOTA_WATCHDOG_PERIOD,
            quota_stale_after: QUOTA_STALE_AFTER,
        }
    }
}

impl OrchestratorConfig {
    /// Set the nominal per-second and per-hour caps
    pub fn with_caps(mut self, per_second: u64, per_hour: u64) -> Self {
        self.requests_per_second = per_second;
        self.requests_per_hour = per_hour;
        self
    }

    /// Set the safety coefficient (clamped to `0.0..=1.0`)
    pub fn with_safety_coefficient(mut self, coefficient: f64) -> Self {
        self.safety_coefficient = coefficient.clamp(0.0, 1.0);
        self
    }

    /// Set the worker count (at least 1)
    pub fn with_worker_count(mut self, workers: u64) -> Self {
        self.worker_count = workers.max(1);
        self
    }

    /// Set the inter-dispatch delay
    pub fn with_dispatch_delay(mut self, delay: Duration) -> Self {
        self.dispatch_delay = delay;
        self
    }

    /// Set attempts per fetch (at least 1)
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Set the initial retry backoff
    pub fn with_initial_backoff_ms(mut self, backoff_ms: u64) -> Self {
        self.initial_backoff_ms = backoff_ms;
        self
    }

    /// Set the seed season for the current-or-last fallback
    pub fn with_known_recent_season(mut self, season: i32) -> Self {
        self.known_recent_season = season;
        self
    }

    /// Set forward and backward season probe caps
    pub fn with_season_probe_caps(mut self, forward: u32, backward: u32) -> Self {
        self.max_forward_season_probes = forward;
        self.max_backward_season_probes = backward;
        self
    }

    /// Per-second cap after the safety coefficient
    pub fn safe_requests_per_second(&self) -> u64 {
        safe_cap(self.requests_per_second, self.safety_coefficient)
    }

    /// Per-hour cap after the safety coefficient
    pub fn safe_requests_per_hour(&self) -> u64 {
        safe_cap(self.requests_per_hour, self.safety_coefficient)
    }

    /// Number of parallel lanes: safe per-second cap split across workers
    pub fn concurrency_width(&self) -> usize {
        (self.safe_requests_per_second() / self.worker_count.max(1)).max(1) as usize
    }
}
