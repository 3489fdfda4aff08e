use std::future;
use std::time::Duration;

use chrono::Utc;
use tokio::time::{Instant, Interval, MissedTickBehavior, interval_at};

/// Periodic liveness ping while a transport is open.
///
/// The monitor only produces ping payloads on a fixed cadence; the connection
/// driver sends them. It never waits for a reply and never decides that the
/// connection is dead.
#[derive(Debug)]
pub(crate) struct Heartbeat {
    period: Duration,
    ticker: Option<Interval>,
}

impl Heartbeat {
    pub(crate) const fn new(period: Duration) -> Self {
        Self {
            period,
            ticker: None,
        }
    }

    /// Start ticking. The first ping is due one full period from now.
    /// Calling this while already running keeps the existing cadence.
    pub(crate) fn start(&mut self) {
        if self.ticker.is_some() {
            return;
        }

        let mut ticker = interval_at(Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.ticker = Some(ticker);
    }

    pub(crate) fn stop(&mut self) {
        self.ticker = None;
    }

    pub(crate) const fn is_running(&self) -> bool {
        self.ticker.is_some()
    }

    /// Wait for the next ping and return its payload. Pends forever when stopped.
    ///
    /// Cancel-safe: dropping the future before it completes does not skip a tick.
    pub(crate) async fn tick(&mut self) -> String {
        match self.ticker.as_mut() {
            Some(ticker) => {
                ticker.tick().await;
                ping_payload()
            }
            None => future::pending().await,
        }
    }
}

/// Milliseconds since the Unix epoch, as text.
fn ping_payload() -> String {
    Utc::now().timestamp_millis().to_string()
}
