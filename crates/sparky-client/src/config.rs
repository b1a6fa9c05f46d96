//! Engine configuration.

use std::collections::BTreeSet;
use std::time::Duration;

use sparky_core::{ValidationError, ValidationResult};
use tokio::sync::Semaphore;
use url::Url;

/// Default API root.
pub const DEFAULT_API_URL: &str = "https://api.ciscospark.com/v1/";

/// Longest accepted dispatch spacing on either lane.
pub const MAX_SPACING: Duration = Duration::from_secs(24 * 60 * 60);

/// Throttling parameters for one scheduler lane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaneConfig {
    /// Maximum exchanges in flight at once.
    pub max_concurrent: usize,
    /// Minimum time between two dispatches.
    pub min_spacing: Duration,
    /// Maximum number of calls waiting for dispatch.
    pub queue_size: usize,
}

impl LaneConfig {
    /// Creates a lane config.
    pub fn new(max_concurrent: usize, min_spacing: Duration, queue_size: usize) -> Self {
        Self {
            max_concurrent,
            min_spacing,
            queue_size,
        }
    }
}

/// Request engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// API root, always ending in `/`.
    pub api_url: String,
    /// Bearer token sent with every request.
    pub token: Option<String>,
    /// Concurrency of each lane.
    pub max_concurrent: usize,
    /// Spacing between dispatches on the primary lane.
    pub min_time: Duration,
    /// Spacing between dispatches on the retry lane.
    pub requeue_min_time: Duration,
    /// How many times a call may enter the retry lane.
    pub requeue_max_retry: u32,
    /// Status codes treated as transient.
    pub requeue_codes: BTreeSet<u16>,
    /// Timeout of one HTTP exchange.
    pub request_timeout: Duration,
    /// Backlog of the primary lane, expressed as time to drain it.
    pub queue_depth_time: Duration,
    /// Backlog of the retry lane, expressed as time to drain it.
    pub requeue_depth_time: Duration,
    /// Page size requested for collection reads.
    pub max_page_items: usize,
    /// Explicit primary backlog size, overriding `queue_depth_time`.
    pub primary_queue_size: Option<usize>,
    /// Explicit retry backlog size, overriding `requeue_depth_time`.
    pub retry_queue_size: Option<usize>,
    /// Buffer of the lifecycle event channel.
    pub event_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let min_time = Duration::from_millis(600);
        let queue_depth_time = Duration::from_secs(20);
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            token: None,
            max_concurrent: 3,
            min_time,
            requeue_min_time: min_time * 10,
            requeue_max_retry: 3,
            requeue_codes: BTreeSet::from([429, 500, 503]),
            request_timeout: Duration::from_secs(5),
            queue_depth_time,
            requeue_depth_time: queue_depth_time * 2,
            max_page_items: 500,
            primary_queue_size: None,
            retry_queue_size: None,
            event_capacity: 256,
        }
    }
}

impl EngineConfig {
    /// Creates a config with the given token and default limits.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
            ..Default::default()
        }
    }

    /// Builder: set the API root.
    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        let mut url = url.into();
        if !url.ends_with('/') {
            url.push('/');
        }
        self.api_url = url;
        self
    }

    /// Builder: set lane concurrency.
    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent = max;
        self
    }

    /// Builder: set primary spacing. The retry spacing follows at ten times.
    pub fn with_min_time(mut self, min_time: Duration) -> Self {
        self.min_time = min_time;
        self.requeue_min_time = min_time.saturating_mul(10);
        self
    }

    /// Builder: set retry spacing independently.
    pub fn with_requeue_min_time(mut self, min_time: Duration) -> Self {
        self.requeue_min_time = min_time;
        self
    }

    /// Builder: set the retry bound.
    pub fn with_requeue_max_retry(mut self, retries: u32) -> Self {
        self.requeue_max_retry = retries;
        self
    }

    /// Builder: set the transient status codes.
    pub fn with_requeue_codes(mut self, codes: impl IntoIterator<Item = u16>) -> Self {
        self.requeue_codes = codes.into_iter().collect();
        self
    }

    /// Builder: set the per-exchange timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Builder: set explicit backlog sizes for both lanes.
    pub fn with_queue_sizes(mut self, primary: usize, retry: usize) -> Self {
        self.primary_queue_size = Some(primary);
        self.retry_queue_size = Some(retry);
        self
    }

    /// Builder: set the collection page size.
    pub fn with_max_page_items(mut self, items: usize) -> Self {
        self.max_page_items = items;
        self
    }

    /// Returns true if `status` is retried through the retry lane.
    pub fn is_requeue_code(&self, status: u16) -> bool {
        self.requeue_codes.contains(&status)
    }

    /// Throttling of fresh traffic.
    pub fn primary_lane(&self) -> LaneConfig {
        let queue_size = self
            .primary_queue_size
            .unwrap_or_else(|| queue_size_for(self.queue_depth_time, self.min_time));
        LaneConfig::new(self.max_concurrent, self.min_time, queue_size)
    }

    /// Throttling of retried traffic.
    pub fn retry_lane(&self) -> LaneConfig {
        let queue_size = self
            .retry_queue_size
            .unwrap_or_else(|| queue_size_for(self.requeue_depth_time, self.requeue_min_time));
        LaneConfig::new(self.max_concurrent, self.requeue_min_time, queue_size)
    }

    /// Checks that the config can drive an engine.
    pub fn validate(&self) -> ValidationResult<()> {
        match self.token.as_deref() {
            Some(token) if !token.is_empty() => {}
            _ => return Err(ValidationError::MissingToken),
        }
        if self.max_concurrent == 0 {
            return Err(ValidationError::config("max_concurrent must be at least 1"));
        }
        if self.max_concurrent > Semaphore::MAX_PERMITS {
            return Err(ValidationError::config(format!(
                "max_concurrent must be at most {}",
                Semaphore::MAX_PERMITS
            )));
        }
        if self.min_time > MAX_SPACING || self.requeue_min_time > MAX_SPACING {
            return Err(ValidationError::config(format!(
                "dispatch spacing must be at most {}s",
                MAX_SPACING.as_secs()
            )));
        }
        if self.primary_lane().queue_size == 0 || self.retry_lane().queue_size == 0 {
            return Err(ValidationError::config("queue sizes must be at least 1"));
        }
        if self.event_capacity == 0 {
            return Err(ValidationError::config("event_capacity must be at least 1"));
        }
        Url::parse(&self.api_url)
            .map_err(|e| ValidationError::config(format!("api_url {:?}: {e}", self.api_url)))?;
        Ok(())
    }
}

/// Number of calls a lane can drain within `depth` at one per `spacing`.
fn queue_size_for(depth: Duration, spacing: Duration) -> usize {
    if spacing.is_zero() {
        return usize::MAX;
    }
    let size = depth.as_millis() / spacing.as_millis().max(1);
    usize::try_from(size).unwrap_or(usize::MAX).max(1)
}
