use std::sync::Arc;

use anyhow::Context;

use lockgate_api::config::ApiConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    lockgate_observability::init();

    let config = ApiConfig::from_env()?;
    let services = Arc::new(lockgate_api::app::build_services(&config).await?);
    let purge = services
        .challenge_purge
        .clone()
        .spawn(config.challenge_purge_interval);
    let app = lockgate_api::app::build_app(services);

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    let served = axum::serve(listener, app).await;
    purge.shutdown().await;
    served?;
    Ok(())
}
