use std::env;
use std::net::SocketAddr;

use mock_backend::MockConfig;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let addr: SocketAddr = env::var("MOCK_ADDR")
        .unwrap_or_else(|_| "127.0.0.1:5000".to_string())
        .parse()?;
    let config = MockConfig::from_env();

    info!(
        format = %config.format,
        depth_scale = config.depth_scale,
        "mock depth backend listening on http://{addr}"
    );
    let listener = tokio::net::TcpListener::bind(addr).await?;
    mock_backend::serve(listener, config).await?;
    Ok(())
}
