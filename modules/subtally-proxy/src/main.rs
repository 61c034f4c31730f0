use std::sync::Arc;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

use subcount_client::SocialCountsClient;
use subtally_common::ProxyConfig;

mod routes;

use routes::{router, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("subtally_proxy=info".parse()?))
        .init();

    let config = ProxyConfig::from_env()?;
    config.log_redacted();

    let upstream = SocialCountsClient::new(&config.upstream_base, config.upstream_timeout)?;
    let app = router(Arc::new(AppState { upstream }));

    let addr = config.addr();
    info!("Subscriber count proxy listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
