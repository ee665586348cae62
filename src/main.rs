use anyhow::Result;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{EnvFilter, fmt};

use tara_nli::config::Config;
use tara_nli::relay::{AnthropicUpstream, router};

#[tokio::main]
async fn main() -> Result<()> {
    // Log to stderr so stdout stays free for anything piping the process.
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = Config::load();
    tracing::info!(
        bind = %config.relay.bind,
        path = %config.relay.path,
        "Starting Claude relay"
    );

    let upstream = Arc::new(AnthropicUpstream::new(config.claude.endpoint.clone())?);
    let app = router(&config, upstream);

    let listener = TcpListener::bind(&config.relay.bind).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
