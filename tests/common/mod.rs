#![allow(
    clippy::unwrap_used,
    clippy::missing_panics_doc,
    reason = "Do not need additional syntax for setting up tests"
)]
#![allow(
    unused,
    reason = "Not every test file exercises every helper"
)]

use std::collections::VecDeque;
use std::future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use session_client::Result;
use session_client::session::{
    Client, Config, ConnectionState, Connector, SessionError, SessionHandle, Transport,
    TransportEvent,
};
use tokio::sync::mpsc;
use tokio::time::{Instant, timeout};
use tokio_tungstenite::tungstenite;
use url::Url;

/// Upper bound for any single wait. Paused-clock tests auto-advance to it
/// instead of hanging when an expected event never happens.
pub const WAIT: Duration = Duration::from_secs(3600);

/// What the next `open` call does.
#[derive(Debug, Clone, Copy)]
pub enum Outcome {
    Accept,
    Refuse,
    /// Never completes
    Hang,
    /// Accepts, but no write ever completes
    StallSend,
    /// Accepts, but the close handshake never completes
    StallClose,
}

/// What the fake server pushes to the client.
#[derive(Debug)]
pub enum Inbound {
    Text(String),
    Error,
    Close,
}

/// Server side of one accepted [`MockTransport`].
pub struct Peer {
    inbound: mpsc::UnboundedSender<Inbound>,
    sent: mpsc::UnboundedReceiver<String>,
    closed: Arc<AtomicBool>,
}

impl Peer {
    pub fn push(&self, text: &str) {
        drop(self.inbound.send(Inbound::Text(text.to_owned())));
    }

    pub fn push_json(&self, value: &Value) {
        self.push(&value.to_string());
    }

    pub fn fail(&self) {
        drop(self.inbound.send(Inbound::Error));
    }

    pub fn drop_connection(&self) {
        drop(self.inbound.send(Inbound::Close));
    }

    /// Whether the client closed this transport itself.
    pub fn closed_by_client(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Next frame the client sent, with the time it arrived.
    pub async fn next_sent(&mut self) -> (Instant, String) {
        let text = timeout(WAIT, self.sent.recv()).await.unwrap().unwrap();
        (Instant::now(), text)
    }

    /// Frames sent so far without waiting, `None` once the client dropped the transport.
    pub fn try_sent(&mut self) -> Option<String> {
        self.sent.try_recv().ok()
    }

    /// Resolves once the client has released the transport.
    pub async fn wait_released(&mut self) {
        loop {
            match timeout(WAIT, self.sent.recv()).await.unwrap() {
                Some(_) => {}
                None => return,
            }
        }
    }
}

pub struct MockTransport {
    inbound: mpsc::UnboundedReceiver<Inbound>,
    sent: mpsc::UnboundedSender<String>,
    closed: Arc<AtomicBool>,
    outcome: Outcome,
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, text: String) -> Result<()> {
        if matches!(self.outcome, Outcome::StallSend) {
            return future::pending().await;
        }
        self.sent
            .send(text)
            .map_err(|_e| SessionError::ConnectionClosed)?;
        Ok(())
    }

    async fn recv(&mut self) -> TransportEvent {
        match self.inbound.recv().await {
            Some(Inbound::Text(text)) => TransportEvent::Text(text),
            Some(Inbound::Error) => TransportEvent::Error(
                SessionError::Connection(tungstenite::Error::ConnectionClosed).into(),
            ),
            Some(Inbound::Close) | None => TransportEvent::Closed,
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        if matches!(self.outcome, Outcome::StallClose) {
            return future::pending().await;
        }
        Ok(())
    }
}

struct Script {
    outcomes: VecDeque<Outcome>,
    attempts: Vec<Instant>,
}

/// In-memory [`Connector`] following a script of open outcomes. Once the
/// script runs out every further open is refused.
#[derive(Clone)]
pub struct MockConnector {
    script: Arc<Mutex<Script>>,
    peers: mpsc::UnboundedSender<Peer>,
}

impl MockConnector {
    pub fn new<I: IntoIterator<Item = Outcome>>(
        outcomes: I,
    ) -> (Self, mpsc::UnboundedReceiver<Peer>) {
        let (peers, peers_rx) = mpsc::unbounded_channel();
        let script = Script {
            outcomes: outcomes.into_iter().collect(),
            attempts: Vec::new(),
        };

        (
            Self {
                script: Arc::new(Mutex::new(script)),
                peers,
            },
            peers_rx,
        )
    }

    /// When each open attempt started.
    pub fn attempts(&self) -> Vec<Instant> {
        self.script.lock().unwrap().attempts.clone()
    }
}

#[async_trait]
impl Connector for MockConnector {
    type Transport = MockTransport;

    async fn open(&self, _endpoint: &Url) -> Result<MockTransport> {
        let outcome = {
            let mut script = self.script.lock().unwrap();
            script.attempts.push(Instant::now());
            script.outcomes.pop_front().unwrap_or(Outcome::Refuse)
        };

        match outcome {
            Outcome::Refuse => {
                Err(SessionError::Connection(tungstenite::Error::ConnectionClosed).into())
            }
            Outcome::Hang => future::pending().await,
            Outcome::Accept | Outcome::StallSend | Outcome::StallClose => {
                let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
                let (sent_tx, sent_rx) = mpsc::unbounded_channel();
                let closed = Arc::new(AtomicBool::new(false));

                drop(self.peers.send(Peer {
                    inbound: inbound_tx,
                    sent: sent_rx,
                    closed: Arc::clone(&closed),
                }));

                Ok(MockTransport {
                    inbound: inbound_rx,
                    sent: sent_tx,
                    closed,
                    outcome,
                })
            }
        }
    }
}

/// A session over a [`MockConnector`] with its callbacks recorded.
pub struct Harness {
    pub handle: SessionHandle,
    pub connector: MockConnector,
    pub peers: mpsc::UnboundedReceiver<Peer>,
    pub messages: mpsc::UnboundedReceiver<Value>,
    pub states: mpsc::UnboundedReceiver<(Instant, ConnectionState)>,
}

impl Harness {
    pub fn start<I: IntoIterator<Item = Outcome>>(outcomes: I, config: Config) -> Self {
        let (connector, peers) = MockConnector::new(outcomes);
        let client =
            Client::with_connector("http://studio.test", config, connector.clone()).unwrap();

        let (message_tx, messages) = mpsc::unbounded_channel();
        let (state_tx, states) = mpsc::unbounded_channel();
        let handle = client
            .connect(
                "session-1",
                move |message: Value| drop(message_tx.send(message)),
                move |state| drop(state_tx.send((Instant::now(), state))),
            )
            .unwrap();

        Self {
            handle,
            connector,
            peers,
            messages,
            states,
        }
    }

    pub async fn next_state(&mut self) -> ConnectionState {
        self.next_state_at().await.1
    }

    pub async fn next_state_at(&mut self) -> (Instant, ConnectionState) {
        timeout(WAIT, self.states.recv()).await.unwrap().unwrap()
    }

    /// Skip `Connecting` and wait for `Connected`.
    pub async fn connected(&mut self) -> (Instant, Peer) {
        assert_eq!(self.next_state().await, ConnectionState::Connecting);
        let (at, state) = self.next_state_at().await;
        assert!(state.is_connected(), "expected connected, got {state:?}");
        (at, self.next_peer().await)
    }

    pub async fn next_peer(&mut self) -> Peer {
        timeout(WAIT, self.peers.recv()).await.unwrap().unwrap()
    }

    pub async fn next_message(&mut self) -> Value {
        timeout(WAIT, self.messages.recv()).await.unwrap().unwrap()
    }
}

/// `actual` is `expected` give or take clock granularity.
pub fn assert_elapsed(actual: Duration, expected: Duration) {
    assert!(
        actual >= expected && actual < expected + Duration::from_millis(5),
        "expected ~{expected:?}, got {actual:?}"
    );
}
