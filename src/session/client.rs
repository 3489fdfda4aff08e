use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use url::Url;

use super::config::Config;
use super::connection::{Callbacks, Connection, Links};
use super::error::SessionError;
use super::machine::ConnectionState;
use super::transport::{Connector, WsConnector};
use crate::Result;
use crate::error::Error;

/// Entry point for opening realtime sessions against one backend host.
///
/// Each call to [`Client::connect`] spawns an independent connection task that
/// reconnects with exponential backoff and keeps the transport alive with
/// heartbeats. Sessions share nothing but the [`Connector`].
///
/// # Examples
///
/// ```rust, no_run
/// use serde_json::Value;
/// use session_client::session::{Client, Config};
///
/// #[tokio::main]
/// async fn main() -> session_client::Result<()> {
///     let client = Client::new("https://studio.example.com", Config::default())?;
///
///     let handle = client.connect(
///         "3f2a9c",
///         |message: Value| println!("{message}"),
///         |state| println!("state: {state:?}"),
///     )?;
///
///     // ... later, on teardown
///     handle.close();
///     handle.closed().await;
///
///     Ok(())
/// }
/// ```
pub struct Client<C: Connector = WsConnector> {
    inner: Arc<ClientInner<C>>,
}

impl<C: Connector> Clone for Client<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct ClientInner<C> {
    /// Scheme and authority every session URL is built on (`ws://` or `wss://`)
    host: Url,
    config: Config,
    connector: Arc<C>,
}

impl Client<WsConnector> {
    /// Create a client for `host`.
    ///
    /// `host` is the base URL of the hosting application. `https` and `wss` hosts
    /// produce `wss://` session URLs, `http` and `ws` hosts produce `ws://`. Any
    /// path, query or fragment on `host` is ignored.
    pub fn new(host: &str, config: Config) -> Result<Self> {
        Self::with_connector(host, config, WsConnector)
    }
}

impl<C: Connector> Client<C> {
    /// Create a client that opens its transports through `connector`.
    pub fn with_connector(host: &str, config: Config, connector: C) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            inner: Arc::new(ClientInner {
                host: socket_base(host)?,
                config,
                connector: Arc::new(connector),
            }),
        })
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// The address a session connects to: `{ws|wss}://{host}/ws/{session_id}/session`.
    ///
    /// `session_id` is percent-encoded as a single path segment.
    pub fn session_url(&self, session_id: &str) -> Result<Url> {
        if session_id.is_empty() {
            return Err(Error::validation("session id must not be empty"));
        }
        if matches!(session_id, "." | "..") {
            return Err(Error::validation(format!(
                "session id `{session_id}` is not a valid path segment"
            )));
        }

        let mut url = self.inner.host.clone();
        url.path_segments_mut()
            .map_err(|()| Error::validation("host cannot carry a path"))?
            .clear()
            .extend(["ws", session_id, "session"]);

        Ok(url)
    }

    /// Open a session and start connecting immediately.
    ///
    /// `on_message` receives one deserialized value per well-formed inbound text
    /// frame, in the order the transport delivered them. Frames that do not parse
    /// as `M` are logged and dropped. `on_status` observes every state change.
    /// Both callbacks run on the session's task, one at a time, and may call
    /// [`SessionHandle::close`].
    ///
    /// Must be called from within a Tokio runtime.
    pub fn connect<M, F, S>(
        &self,
        session_id: &str,
        on_message: F,
        on_status: S,
    ) -> Result<SessionHandle>
    where
        M: DeserializeOwned + Send + 'static,
        F: FnMut(M) + Send + 'static,
        S: FnMut(ConnectionState) + Send + 'static,
    {
        let endpoint = self.session_url(session_id)?;
        let runtime = tokio::runtime::Handle::try_current()?;

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);
        let cancel = CancellationToken::new();
        let done = CancellationToken::new();

        let connection = Connection::new(
            endpoint.clone(),
            self.inner.config.clone(),
            Arc::clone(&self.inner.connector),
            Links {
                outbound_rx,
                state_tx,
                cancel: cancel.clone(),
                done: done.clone(),
            },
            Callbacks {
                on_message: Box::new(on_message),
                on_status: Box::new(on_status),
            },
        );

        runtime.spawn(connection.run());

        Ok(SessionHandle {
            session_id: session_id.to_owned(),
            endpoint,
            cancel,
            done,
            state_rx,
            outbound_tx,
        })
    }
}

/// Open a session against `host` with a default [`WsConnector`].
///
/// Shorthand for [`Client::new`] followed by [`Client::connect`].
pub fn connect<M, F, S>(
    host: &str,
    session_id: &str,
    on_message: F,
    on_status: S,
    config: Config,
) -> Result<SessionHandle>
where
    M: DeserializeOwned + Send + 'static,
    F: FnMut(M) + Send + 'static,
    S: FnMut(ConnectionState) + Send + 'static,
{
    Client::new(host, config)?.connect(session_id, on_message, on_status)
}

/// Owner's handle to one running session.
///
/// Closing is idempotent and also happens when the handle is dropped. Once
/// [`close`](Self::close) returns, no reconnect is scheduled and no callback is
/// invoked again; [`closed`](Self::closed) resolves when the transport and both
/// timers have been released.
#[derive(Debug)]
pub struct SessionHandle {
    session_id: String,
    endpoint: Url,
    cancel: CancellationToken,
    done: CancellationToken,
    state_rx: watch::Receiver<ConnectionState>,
    outbound_tx: mpsc::UnboundedSender<String>,
}

impl SessionHandle {
    /// Stop the session. Safe to call repeatedly, after a terminal disconnect,
    /// and from inside either callback.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Wait until the session task has released every resource. Resolves after
    /// [`close`](Self::close) or after retries are exhausted.
    pub async fn closed(&self) {
        self.done.cancelled().await;
    }

    /// Get the current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Whether a transport is open right now.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Subscribe to connection state changes.
    #[must_use]
    pub fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    #[must_use]
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Serialize `request` as JSON and send it on the live transport.
    pub fn send<R: Serialize>(&self, request: &R) -> Result<()> {
        let json = serde_json::to_string(request)?;
        self.send_text(json)
    }

    /// Send a raw text frame on the live transport.
    ///
    /// Fails with [`SessionError::NotConnected`] while no transport is open.
    /// Text accepted here but not yet written when the transport drops is
    /// discarded, never replayed on the next incarnation.
    pub fn send_text<T: Into<String>>(&self, text: T) -> Result<()> {
        if self.is_closed() {
            return Err(SessionError::ConnectionClosed.into());
        }
        if !self.is_connected() {
            return Err(SessionError::NotConnected.into());
        }

        self.outbound_tx
            .send(text.into())
            .map_err(|_e| SessionError::ConnectionClosed)?;
        Ok(())
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Normalize `host` to a bare `ws://` or `wss://` origin.
fn socket_base(host: &str) -> Result<Url> {
    let mut url = Url::parse(host)?;

    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(Error::validation(format!(
                "unsupported host scheme `{other}`"
            )));
        }
    };
    url.set_scheme(scheme)
        .map_err(|()| Error::validation(format!("cannot switch `{host}` to {scheme}")))?;

    if url.host_str().is_none() {
        return Err(Error::validation(format!("`{host}` has no host")));
    }

    url.set_path("");
    url.set_query(None);
    url.set_fragment(None);

    Ok(url)
}
