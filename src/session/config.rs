use std::time::Duration;

use bon::Builder;

use super::retry::BackoffPolicy;
use crate::Result;
use crate::error::Error;

const DEFAULT_MAX_RETRIES: u32 = 6;
const DEFAULT_RETRY_DELAY_DURATION: Duration = Duration::from_millis(800);
const DEFAULT_MAX_DELAY_DURATION: Duration = Duration::from_millis(8000);
const DEFAULT_HEARTBEAT_INTERVAL_DURATION: Duration = Duration::from_secs(20);
const DEFAULT_CONNECT_TIMEOUT_DURATION: Duration = Duration::from_secs(10);

/// Configuration for a session connection.
///
/// ```
/// use std::time::Duration;
///
/// use session_client::session::Config;
///
/// let config = Config::builder()
///     .max_retries(3)
///     .retry_delay(Duration::from_millis(250))
///     .build();
///
/// assert_eq!(config.max_retries, 3);
/// assert_eq!(config.max_delay, Duration::from_secs(8));
/// ```
#[non_exhaustive]
#[derive(Debug, Clone, Builder)]
pub struct Config {
    /// Maximum number of consecutive reconnect attempts before the session is
    /// declared disconnected. Zero disables reconnection entirely.
    #[builder(default = DEFAULT_MAX_RETRIES)]
    pub max_retries: u32,
    /// Delay before the first reconnect attempt
    #[builder(default = DEFAULT_RETRY_DELAY_DURATION)]
    pub retry_delay: Duration,
    /// Ceiling applied to every computed reconnect delay
    #[builder(default = DEFAULT_MAX_DELAY_DURATION)]
    pub max_delay: Duration,
    /// Interval between heartbeat pings while connected
    #[builder(default = DEFAULT_HEARTBEAT_INTERVAL_DURATION)]
    pub heartbeat_interval: Duration,
    /// Close the transport when nothing has been received for this long.
    /// `None` leaves dead-peer detection entirely to the transport.
    pub heartbeat_timeout: Option<Duration>,
    /// Maximum time a single open attempt may take before it counts as failed
    #[builder(default = DEFAULT_CONNECT_TIMEOUT_DURATION)]
    pub connect_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl Config {
    /// Backoff policy derived from `retry_delay` and `max_delay`.
    #[must_use]
    pub fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy::new(self.retry_delay, self.max_delay)
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.heartbeat_interval.is_zero() {
            return Err(Error::validation("heartbeat_interval must be non-zero"));
        }
        if self.connect_timeout.is_zero() {
            return Err(Error::validation("connect_timeout must be non-zero"));
        }
        if self.heartbeat_timeout.is_some_and(|timeout| timeout.is_zero()) {
            return Err(Error::validation("heartbeat_timeout must be non-zero"));
        }

        Ok(())
    }
}
