use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use nmos_query_core::subscriptions::SubscriptionConfig;
use nmos_query_core::{ChangeWatcher, FanOutEngine, QueryService, RegistryAdapter, SubscriptionRegistry};
use nmos_query_server::config::DEFAULT_CONFIG_PATH;
use nmos_query_server::{app, source_id, AppState, Config, RegistryConfig};
use nmos_query_storage_etcd::EtcdRegistry;
use nmos_query_storage_sled::SledRegistry;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
    let config = Config::load(&config_path)?;
    info!(?config, "starting query service");

    let adapter: Arc<dyn RegistryAdapter> = match &config.registry {
        RegistryConfig::Etcd { host, port } => Arc::new(EtcdRegistry::new(host, *port)?),
        RegistryConfig::Sled { path, poll_interval_secs, replay_window_secs } => Arc::new(
            SledRegistry::open(path)?
                .with_poll_interval(Duration::from_secs(*poll_interval_secs))
                .with_replay_window(Duration::from_secs(*replay_window_secs)),
        ),
    };

    let subscriptions = SubscriptionRegistry::new(SubscriptionConfig::new(config.ws_base(), source_id()));
    let query = QueryService::new(adapter.clone());
    let watcher = ChangeWatcher::spawn(adapter, FanOutEngine::new(subscriptions.clone()), subscriptions.clone());

    let mdns = if config.enable_mdns {
        match nmos_query_server::mdns::advertise(&config) {
            Ok(daemon) => Some(daemon),
            Err(err) => {
                warn!(%err, "mDNS advertisement failed, continuing without");
                None
            }
        }
    } else {
        None
    };

    let state = AppState::new(query, subscriptions, config.enabled_versions());
    let listener = tokio::net::TcpListener::bind(config.bind).await?;
    info!("listening on {}", listener.local_addr()?);
    // The watcher must stop first: detaching every subscription closes the
    // grain queues, which is what lets open WebSocket sessions finish and
    // the server drain.
    axum::serve(listener, app(state))
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            info!("shutting down");
            watcher.shutdown().await;
        })
        .await?;

    if let Some(daemon) = mdns {
        let _ = daemon.shutdown();
    }
    info!("stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = term.recv() => {}
                }
            }
            Err(_) => {
                let _ = ctrl_c.await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
    }
}
