//! Joins a realtime session and logs everything it receives.
//!
//! Run with tracing enabled:
//! ```sh
//! RUST_LOG=info,session_client=debug cargo run --example session --features tracing -- <host> <session-id>
//! ```
//!
//! Stops on Ctrl-C, or on its own once the session runs out of retries.

use serde_json::Value;
use session_client::{Config, connect};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut args = std::env::args().skip(1);
    let host = args
        .next()
        .unwrap_or_else(|| "http://127.0.0.1:8000".to_owned());
    let session_id = args.next().unwrap_or_else(|| "demo".to_owned());

    let handle = connect(
        &host,
        &session_id,
        |message: Value| info!(%message, "Session message"),
        |state| info!(?state, "Session state"),
        Config::default(),
    )?;
    info!(endpoint = %handle.endpoint(), "Connecting");

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                warn!(error = %e, "Unable to listen for Ctrl-C");
            }
            handle.close();
        }
        () = handle.closed() => warn!("Session gave up reconnecting"),
    }

    handle.closed().await;
    info!(state = ?handle.state(), "Session finished");

    Ok(())
}
