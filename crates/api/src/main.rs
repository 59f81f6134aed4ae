use std::sync::Arc;

use anyhow::Context;

use retailerp_infra::config::LedgerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    retailerp_observability::init();

    let config = LedgerConfig::from_env().context("invalid configuration")?;
    let bind_addr = config.bind_addr;

    let services = Arc::new(retailerp_api::app::services::build_services(config).await?);
    let app = retailerp_api::app::build_app(Arc::clone(&services));

    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    services.shutdown();
    tracing::info!("shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}
