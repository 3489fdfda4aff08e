//! Transport abstraction for the connection driver.
//!
//! The driver never touches a socket directly. It opens transports through a
//! [`Connector`] and consumes them through [`Transport`], which keeps the state
//! machine testable against an in-memory transport. [`WsConnector`] is the
//! production implementation on top of `tokio-tungstenite`.

use async_trait::async_trait;
use futures::{SinkExt as _, StreamExt as _};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use url::Url;

use super::error::SessionError;
use crate::Result;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Something observed on an open transport.
#[non_exhaustive]
#[derive(Debug)]
pub enum TransportEvent {
    /// A UTF-8 text frame
    Text(String),
    /// Any other frame (binary, ping, pong). Counts as liveness only.
    Control,
    /// A transport-level error. The transport reports [`TransportEvent::Closed`] afterwards.
    Error(crate::error::Error),
    /// The transport is gone. No further events follow.
    Closed,
}

/// One open, full-duplex connection.
#[async_trait]
pub trait Transport: Send + 'static {
    /// Send a text frame.
    async fn send(&mut self, text: String) -> Result<()>;

    /// Wait for the next event.
    ///
    /// Must be cancel-safe: the driver polls it inside `tokio::select!` and may
    /// drop the future at any await point without losing a frame.
    async fn recv(&mut self) -> TransportEvent;

    /// Close the connection, performing a graceful shutdown where supported.
    async fn close(&mut self) -> Result<()>;
}

/// Opens transports to a session endpoint.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Transport: Transport;

    async fn open(&self, endpoint: &Url) -> Result<Self::Transport>;
}

/// [`Connector`] backed by `tokio-tungstenite`.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    type Transport = WsTransport;

    async fn open(&self, endpoint: &Url) -> Result<WsTransport> {
        let (stream, _) = connect_async(endpoint.as_str())
            .await
            .map_err(SessionError::Connection)?;

        Ok(WsTransport {
            stream,
            failed: false,
        })
    }
}

/// A WebSocket opened by [`WsConnector`].
pub struct WsTransport {
    stream: WsStream,
    /// Set once the stream yielded an error; the next `recv` reports closure.
    failed: bool,
}

#[async_trait]
impl Transport for WsTransport {
    async fn send(&mut self, text: String) -> Result<()> {
        self.stream
            .send(Message::Text(text.into()))
            .await
            .map_err(SessionError::Connection)?;
        Ok(())
    }

    async fn recv(&mut self) -> TransportEvent {
        if self.failed {
            return TransportEvent::Closed;
        }

        match self.stream.next().await {
            Some(Ok(Message::Text(text))) => TransportEvent::Text(text.as_str().to_owned()),
            Some(Ok(Message::Close(_))) | None => TransportEvent::Closed,
            Some(Ok(_)) => TransportEvent::Control,
            Some(Err(e)) => {
                self.failed = true;
                TransportEvent::Error(SessionError::Connection(e).into())
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.stream
            .close(None)
            .await
            .map_err(SessionError::Connection)?;
        Ok(())
    }
}
