use std::net::SocketAddr;

use anyhow::Context;

use xadmin_api::config::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env().context("invalid configuration")?;
    xadmin_observability::init_with(config.log_format, "info");

    if config.uses_dev_secret() {
        tracing::warn!("XADMIN_SECRET_KEY not set; using insecure dev default");
    }

    let app = xadmin_api::app::build_app(&config).await?;

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .await.context("server error")?;
    Ok(())
}
