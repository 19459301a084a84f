mod api;
mod middleware;
mod resolver;
mod service;

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use crate::api::{build_app, default_rate_limit_state, AppState};
use crate::service::SearchService;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Arc::new(shopfilter_core::AppConfig::from_env()?);
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let elastic = shopfilter_elastic::ElasticClient::new(
        &config.elastic_url,
        config.elastic_username.clone(),
        config.elastic_password.clone(),
    )?;

    let service = SearchService::new(elastic, &config);
    service.start_sweepers();

    let app = build_app(
        AppState {
            config: Arc::clone(&config),
            service: service.clone(),
        },
        default_rate_limit_state(),
    );

    tracing::info!(addr = %config.bind_addr, "starting storefront query service");
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    service.stop_sweepers();
    Ok(())
}

/// Resolves once the process is asked to stop: SIGTERM (the orchestrator's
/// signal of choice) or ctrl-c.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).expect("SIGTERM handler installs");
        tokio::select! {
            _ = sigterm.recv() => tracing::info!("SIGTERM received, draining"),
            _ = tokio::signal::ctrl_c() => tracing::info!("ctrl-c received, draining"),
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("ctrl-c received, draining");
    }
}
