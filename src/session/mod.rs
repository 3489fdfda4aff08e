//! Resilient realtime session connections.
//!
//! A session is one long-lived WebSocket to `{ws|wss}://{host}/ws/{session_id}/session`
//! that survives network drops, proxy idle timeouts and backend restarts.
//!
//! # Architecture
//!
//! - [`BackoffPolicy`] / [`Retry`]: reconnect delay `min(max_delay, retry_delay * 1.5^attempt)`
//!   bounded by `max_retries`
//! - `Heartbeat`: text ping every `heartbeat_interval` while connected
//! - `Machine`: the transition table `Connecting -> Connected -> Reconnecting -> Disconnected`
//! - `Connection`: the per-session task executing the machine against a [`Transport`]
//! - [`Client`] / [`SessionHandle`]: public entry point and owner handle
//!
//! # Example
//!
//! ```rust, no_run
//! use serde_json::Value;
//! use session_client::session::{Config, ConnectionState};
//!
//! #[tokio::main]
//! async fn main() -> session_client::Result<()> {
//!     let handle = session_client::connect(
//!         "https://studio.example.com",
//!         "3f2a9c",
//!         |message: Value| println!("{message}"),
//!         |state: ConnectionState| {
//!             if state.is_terminal() {
//!                 eprintln!("connection lost, reload to retry");
//!             }
//!         },
//!         Config::default(),
//!     )?;
//!
//!     handle.closed().await;
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
mod connection;
pub mod error;
mod heartbeat;
pub mod machine;
pub mod retry;
pub mod transport;

pub use client::{Client, SessionHandle, connect};
pub use config::Config;
pub use machine::ConnectionState;
pub use retry::{BackoffPolicy, Retry};
#[expect(
    clippy::module_name_repetitions,
    reason = "SessionError includes module name for clarity when used outside this module"
)]
pub use error::SessionError;
pub use transport::{Connector, Transport, TransportEvent, WsConnector, WsTransport};
