use std::mem;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, Sleep, error::Elapsed, sleep, timeout};
use tokio_util::sync::CancellationToken;
use url::Url;

use super::config::Config;
use super::error::SessionError;
use super::heartbeat::Heartbeat;
use super::machine::{Action, ConnectionState, Event, Machine};
use super::retry::Retry;
use super::transport::{Connector, Transport, TransportEvent};
use crate::Result;
use crate::error::{Error, Kind};

/// Upper bound on the graceful close handshake.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);
/// Upper bound on a single outbound write. A write that takes longer means the
/// peer stopped reading and the transport is treated as lost.
const SEND_TIMEOUT: Duration = Duration::from_secs(10);

pub(crate) type MessageCallback<M> = Box<dyn FnMut(M) + Send>;
pub(crate) type StatusCallback = Box<dyn FnMut(ConnectionState) + Send>;

/// Caller-supplied observers.
pub(crate) struct Callbacks<M> {
    pub(crate) on_message: MessageCallback<M>,
    pub(crate) on_status: StatusCallback,
}

/// Channels shared with the [`SessionHandle`](super::SessionHandle).
pub(crate) struct Links {
    pub(crate) outbound_rx: mpsc::UnboundedReceiver<String>,
    pub(crate) state_tx: watch::Sender<ConnectionState>,
    /// Cancelled by the owner to close the session
    pub(crate) cancel: CancellationToken,
    /// Cancelled by the driver once every resource is released
    pub(crate) done: CancellationToken,
}

/// What the driver currently holds. At most one transport and at most one
/// reconnect timer exist, and never both.
enum Phase<T> {
    Opening,
    Waiting(Pin<Box<Sleep>>),
    Live(T),
    Idle,
}

enum Step<T> {
    Event(Event),
    Opened(std::result::Result<Result<T>, Elapsed>),
    Transport(TransportEvent),
    Reopen,
    Outbound(String),
    Heartbeat(String),
}

/// Drives one session: executes the [`Machine`]'s actions against a real
/// transport, the heartbeat and the reconnect timer.
pub(crate) struct Connection<C: Connector, M> {
    endpoint: Url,
    config: Config,
    connector: Arc<C>,
    machine: Machine,
    heartbeat: Heartbeat,
    phase: Phase<C::Transport>,
    /// Last time anything arrived on the live transport
    last_inbound: Instant,
    links: Links,
    callbacks: Callbacks<M>,
}

impl<C, M> Connection<C, M>
where
    C: Connector,
    M: DeserializeOwned + Send + 'static,
{
    pub(crate) fn new(
        endpoint: Url,
        config: Config,
        connector: Arc<C>,
        links: Links,
        callbacks: Callbacks<M>,
    ) -> Self {
        let machine = Machine::new(Retry::new(config.backoff(), config.max_retries));
        let heartbeat = Heartbeat::new(config.heartbeat_interval);

        Self {
            endpoint,
            config,
            connector,
            machine,
            heartbeat,
            phase: Phase::Opening,
            last_inbound: Instant::now(),
            links,
            callbacks,
        }
    }

    /// Main loop. Returns once the machine reaches its terminal state.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(level = "debug", skip_all, fields(endpoint = %self.endpoint))
    )]
    pub(crate) async fn run(mut self) {
        let _done = self.links.done.clone().drop_guard();

        let actions = self.machine.start();
        self.apply(actions).await;

        while !self.machine.state().is_terminal() {
            match self.next_step().await {
                Step::Event(event) => self.dispatch(event).await,
                Step::Opened(result) => self.on_opened(result).await,
                Step::Transport(event) => self.on_transport_event(event).await,
                Step::Reopen => self.phase = Phase::Opening,
                Step::Outbound(text) => {
                    if let Err(e) = self.send(text).await {
                        #[cfg(feature = "tracing")]
                        tracing::warn!(error = %e, "Failed to send outbound frame");
                        #[cfg(not(feature = "tracing"))]
                        let _ = &e;
                    }
                }
                Step::Heartbeat(ping) => self.on_heartbeat(ping).await,
            }
        }

        #[cfg(feature = "tracing")]
        tracing::debug!("Session driver finished");
    }

    /// Wait for whatever the current phase can produce next. The owner's close
    /// request always wins over every other branch.
    async fn next_step(&mut self) -> Step<C::Transport> {
        let cancel = self.links.cancel.clone();

        match &mut self.phase {
            Phase::Opening => {
                let open = timeout(
                    self.config.connect_timeout,
                    self.connector.open(&self.endpoint),
                );
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => Step::Event(Event::CloseRequested),
                    result = open => Step::Opened(result),
                }
            }
            Phase::Waiting(delay) => {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => Step::Event(Event::CloseRequested),
                    () = delay.as_mut() => Step::Reopen,
                }
            }
            Phase::Live(transport) => {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => Step::Event(Event::CloseRequested),
                    event = transport.recv() => Step::Transport(event),
                    Some(text) = self.links.outbound_rx.recv() => Step::Outbound(text),
                    ping = self.heartbeat.tick() => Step::Heartbeat(ping),
                }
            }
            Phase::Idle => {
                cancel.cancelled().await;
                Step::Event(Event::CloseRequested)
            }
        }
    }

    async fn dispatch(&mut self, event: Event) {
        let actions = self.machine.handle(event);
        self.apply(actions).await;
    }

    async fn apply(&mut self, actions: Vec<Action>) {
        for action in actions {
            match action {
                Action::Notify(state) => self.notify(state),
                Action::StartHeartbeat => {
                    self.last_inbound = Instant::now();
                    self.heartbeat.start();
                }
                Action::StopHeartbeat => self.heartbeat.stop(),
                Action::Deliver(text) => self.deliver(&text),
                Action::ScheduleReopen(delay) => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(?delay, "Scheduling reconnect");
                    self.phase = Phase::Waiting(Box::pin(sleep(delay)));
                }
                Action::CancelReopen => {
                    if matches!(self.phase, Phase::Waiting(_)) {
                        self.phase = Phase::Idle;
                    }
                }
                Action::CloseTransport => self.close_transport().await,
            }
        }
    }

    async fn on_opened(&mut self, result: std::result::Result<Result<C::Transport>, Elapsed>) {
        let event = match result {
            Ok(Ok(transport)) => {
                self.phase = Phase::Live(transport);
                Event::Opened
            }
            Ok(Err(e)) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(error = %e, "Unable to connect");
                #[cfg(not(feature = "tracing"))]
                let _ = &e;
                self.phase = Phase::Idle;
                Event::OpenFailed
            }
            Err(_elapsed) => {
                let e = SessionError::Timeout;
                #[cfg(feature = "tracing")]
                tracing::warn!(
                    error = %e,
                    timeout = ?self.config.connect_timeout,
                    "Unable to connect"
                );
                #[cfg(not(feature = "tracing"))]
                let _ = &e;
                self.phase = Phase::Idle;
                Event::OpenFailed
            }
        };

        self.dispatch(event).await;
    }

    async fn on_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Text(text) => {
                self.last_inbound = Instant::now();
                #[cfg(feature = "tracing")]
                tracing::trace!(%text, "Received session frame");
                self.dispatch(Event::Frame(text)).await;
            }
            TransportEvent::Control => self.last_inbound = Instant::now(),
            TransportEvent::Error(e) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(error = %e, "Session transport error");
                #[cfg(not(feature = "tracing"))]
                let _ = &e;
                self.dispatch(Event::TransportError).await;
            }
            TransportEvent::Closed => {
                #[cfg(feature = "tracing")]
                tracing::debug!("Session transport closed");
                self.end_incarnation();
                self.dispatch(Event::Closed).await;
            }
        }
    }

    async fn on_heartbeat(&mut self, ping: String) {
        if let Some(limit) = self.config.heartbeat_timeout
            && self.last_inbound.elapsed() >= limit
        {
            #[cfg(feature = "tracing")]
            tracing::warn!(
                ?limit,
                "No inbound traffic within heartbeat timeout, dropping transport"
            );
            self.close_transport().await;
            self.end_incarnation();
            self.dispatch(Event::Closed).await;
            return;
        }

        if let Err(e) = self.send(ping).await {
            #[cfg(feature = "tracing")]
            tracing::debug!(error = %e, "Heartbeat send failed");
            #[cfg(not(feature = "tracing"))]
            let _ = &e;
        }
    }

    /// Write one frame to the live transport.
    ///
    /// The write races the owner's close request and is bounded by
    /// [`SEND_TIMEOUT`], or by `heartbeat_timeout` when that is shorter. A close
    /// request interrupts it and shuts the session down; an expired write drops
    /// the transport and takes the reconnect path.
    async fn send(&mut self, text: String) -> Result<()> {
        let limit = self.send_timeout();
        let cancel = self.links.cancel.clone();
        let Phase::Live(transport) = &mut self.phase else {
            return Err(SessionError::NotConnected.into());
        };

        let written = tokio::select! {
            biased;
            () = cancel.cancelled() => None,
            result = timeout(limit, transport.send(text)) => Some(result),
        };

        match written {
            Some(Ok(result)) => result,
            Some(Err(_elapsed)) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(?limit, "Outbound write stalled, dropping transport");
                self.close_transport().await;
                self.end_incarnation();
                self.dispatch(Event::Closed).await;
                Err(SessionError::Timeout.into())
            }
            None => {
                self.dispatch(Event::CloseRequested).await;
                Err(SessionError::ConnectionClosed.into())
            }
        }
    }

    fn send_timeout(&self) -> Duration {
        self.config
            .heartbeat_timeout
            .map_or(SEND_TIMEOUT, |limit| limit.min(SEND_TIMEOUT))
    }

    fn notify(&mut self, state: ConnectionState) {
        #[cfg(feature = "tracing")]
        tracing::debug!(?state, "Session state changed");

        _ = self.links.state_tx.send(state);

        if !self.links.cancel.is_cancelled() {
            (self.callbacks.on_status)(state);
        }
    }

    fn deliver(&mut self, text: &str) {
        if self.links.cancel.is_cancelled() {
            return;
        }

        match serde_json::from_str::<M>(text) {
            Ok(message) => (self.callbacks.on_message)(message),
            Err(e) => {
                let error = Error::with_source(Kind::Transport, SessionError::MessageParse(e));
                #[cfg(feature = "tracing")]
                tracing::warn!(%text, error = %error, "Dropping malformed session frame");
                #[cfg(not(feature = "tracing"))]
                let _ = &error;
            }
        }
    }

    async fn close_transport(&mut self) {
        let Phase::Live(mut transport) = mem::replace(&mut self.phase, Phase::Idle) else {
            return;
        };

        match timeout(CLOSE_TIMEOUT, transport.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                #[cfg(feature = "tracing")]
                tracing::debug!(error = %e, "Error while closing session transport");
                #[cfg(not(feature = "tracing"))]
                let _ = &e;
            }
            Err(_elapsed) => {
                #[cfg(feature = "tracing")]
                tracing::debug!("Close handshake timed out");
            }
        }
    }

    /// Forget the current transport along with anything queued for it.
    fn end_incarnation(&mut self) {
        if matches!(self.phase, Phase::Live(_)) {
            self.phase = Phase::Idle;
        }
        while self.links.outbound_rx.try_recv().is_ok() {}
    }
}
