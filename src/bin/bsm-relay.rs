//! Standalone relay for `anywhere` sessions.
//!
//! `BSM_RELAY_BIND` sets the listen address, `BSM_LOG` the log filter.

use std::net::SocketAddr;

use bsm_link::core::{ENV_LOG, ENV_RELAY_BIND};
use bsm_link::server::{RelayServer, RelayServerBuilder};
use bsm_link::{Error, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env(ENV_LOG).unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut builder = RelayServerBuilder::new();
    if let Ok(raw) = std::env::var(ENV_RELAY_BIND) {
        let addr: SocketAddr = raw
            .trim()
            .parse()
            .map_err(|e| Error::Config(format!("{ENV_RELAY_BIND}={raw}: {e}")))?;
        builder = builder.bind_addr(addr);
    }

    let server = RelayServer::bind(builder.build()).await?;
    let shutdown = server.shutdown_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, shutting down");
            shutdown.cancel();
        }
    });

    server.run().await?;
    Ok(())
}
