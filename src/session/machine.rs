//! Connection state machine.
//!
//! [`Machine::handle`] is a pure transition function: it consumes one [`Event`]
//! reported by the driver and returns the [`Action`]s the driver must carry out.
//! It owns the retry counter and the reconnect flag; it owns no I/O.

use std::time::{Duration, Instant};

use backoff::backoff::Backoff as _;

use super::retry::Retry;

/// Connection state tracking.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// First open attempt in progress
    Connecting,
    /// Transport open
    Connected {
        /// When the current incarnation was established
        since: Instant,
    },
    /// Waiting for, or performing, a re-open after the transport was lost
    Reconnecting {
        /// Consecutive reconnect attempt number, starting at 1
        attempt: u32,
    },
    /// Terminal. Either closed by its owner or out of retries.
    Disconnected,
}

impl ConnectionState {
    /// Check if the connection is currently active.
    #[must_use]
    pub const fn is_connected(self) -> bool {
        matches!(self, Self::Connected { .. })
    }

    /// Anything but [`ConnectionState::Disconnected`]. Suits a single "live" indicator.
    #[must_use]
    pub const fn is_live(self) -> bool {
        !self.is_terminal()
    }

    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Disconnected)
    }
}

/// Something that happened to the connection.
#[derive(Debug)]
pub(crate) enum Event {
    Opened,
    OpenFailed,
    Frame(String),
    TransportError,
    Closed,
    CloseRequested,
}

/// Something the driver must do in response to an [`Event`].
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Action {
    /// Publish a new state
    Notify(ConnectionState),
    StartHeartbeat,
    StopHeartbeat,
    /// Parse the frame and hand it to the message callback
    Deliver(String),
    /// Arm the reconnect timer
    ScheduleReopen(Duration),
    /// Disarm the reconnect timer if armed
    CancelReopen,
    CloseTransport,
}

#[derive(Debug)]
pub(crate) struct Machine {
    state: ConnectionState,
    should_reconnect: bool,
    retry: Retry,
}

impl Machine {
    pub(crate) const fn new(retry: Retry) -> Self {
        Self {
            state: ConnectionState::Connecting,
            should_reconnect: true,
            retry,
        }
    }

    /// Actions for entering the initial state.
    pub(crate) fn start(&self) -> Vec<Action> {
        vec![Action::Notify(self.state)]
    }

    pub(crate) const fn state(&self) -> ConnectionState {
        self.state
    }

    #[cfg(test)]
    pub(crate) const fn retry_attempts(&self) -> u32 {
        self.retry.attempts()
    }

    pub(crate) fn handle(&mut self, event: Event) -> Vec<Action> {
        match (self.state, event) {
            (_, Event::CloseRequested) => self.shutdown(),
            // Owner closed while an open was in flight
            (ConnectionState::Disconnected, Event::Opened) => vec![Action::CloseTransport],
            (ConnectionState::Disconnected, _) => Vec::new(),
            (ConnectionState::Connecting | ConnectionState::Reconnecting { .. }, Event::Opened) => {
                self.retry.reset();
                self.state = ConnectionState::Connected {
                    since: Instant::now(),
                };
                vec![Action::Notify(self.state), Action::StartHeartbeat]
            }
            (ConnectionState::Connected { .. }, Event::Frame(text)) => vec![Action::Deliver(text)],
            (_, Event::OpenFailed | Event::Closed) => self.transport_lost(),
            (_, Event::Frame(_) | Event::TransportError)
            | (ConnectionState::Connected { .. }, Event::Opened) => Vec::new(),
        }
    }

    fn transport_lost(&mut self) -> Vec<Action> {
        let mut actions = vec![Action::StopHeartbeat];

        if self.should_reconnect
            && let Some(delay) = self.retry.next_backoff()
        {
            self.state = ConnectionState::Reconnecting {
                attempt: self.retry.attempts(),
            };
            actions.push(Action::ScheduleReopen(delay));
        } else {
            self.state = ConnectionState::Disconnected;
        }

        actions.push(Action::Notify(self.state));
        actions
    }

    fn shutdown(&mut self) -> Vec<Action> {
        self.should_reconnect = false;

        if self.state.is_terminal() {
            return Vec::new();
        }

        self.state = ConnectionState::Disconnected;
        vec![
            Action::CancelReopen,
            Action::StopHeartbeat,
            Action::CloseTransport,
            Action::Notify(self.state),
        ]
    }
}
