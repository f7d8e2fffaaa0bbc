#![deny(unused_must_use)]

use std::net::SocketAddr;
use std::sync::Arc;

use prometheus::Registry;
use sparrow::config::{Config, LoaderKind};
use sparrow::loader::{file::FileLoader, http::HttpLoader, Loader};
use sparrow::reconciler::Reconciler;
use sparrow::state::AppState;
use sparrow::store::ResultStore;
use sparrow::{capabilities, http as sparrow_http};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load_or_default();
    init_tracing(&config);

    tracing::info!("starting sparrow");

    let icmp_available = capabilities::has_net_raw();
    if !icmp_available {
        tracing::warn!("CAP_NET_RAW unavailable: ICMP traceroute and DNS reverse-lookup checks relying on raw sockets will be degraded");
    }

    let registry = Registry::new_custom(Some(config.metrics.namespace.clone()), None)?;
    let store = ResultStore::new();
    let shutdown = CancellationToken::new();
    let reconciler = Reconciler::new(registry.clone(), store.clone(), icmp_available, shutdown.clone());

    let (runtime_tx, runtime_rx) = tokio::sync::mpsc::channel(4);
    let reconciler_task = tokio::spawn(reconciler.clone().drive(runtime_rx));

    let loader: Arc<dyn Loader> = match config.loader.kind {
        LoaderKind::File => Arc::new(FileLoader::new(config.loader.file.clone(), config.loader.poll_interval)),
        LoaderKind::Http => {
            let url = config
                .loader
                .url
                .clone()
                .ok_or("loader.kind is \"http\" but loader.url is not set")?;
            Arc::new(HttpLoader::new(url, config.loader.poll_interval))
        }
    };
    let loader_for_task = loader.clone();
    let loader_task = tokio::spawn(async move {
        if let Err(e) = loader_for_task.run(runtime_tx).await {
            tracing::error!(error = %e, "loader exited with error");
        }
    });

    let state = AppState { store, registry, reconciler };
    let app = sparrow_http::router(state);
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "listening");

    let server_shutdown = shutdown.clone();
    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
        server_shutdown.cancelled().await;
    });

    tokio::select! {
        result = server => {
            if let Err(e) = result {
                tracing::error!(error = %e, "http server exited with error");
            }
        }
        _ = wait_for_shutdown_signal() => {
            tracing::info!("shutdown signal received");
            shutdown.cancel();
        }
    }

    loader.shutdown();
    let _ = loader_task.await;
    let _ = reconciler_task.await;

    tracing::info!("sparrow stopped");
    Ok(())
}

fn init_tracing(config: &Config) {
    if let Some(ref filter_directive) = config.logging.filter {
        use tracing_subscriber::EnvFilter;
        match EnvFilter::try_new(filter_directive) {
            Ok(env_filter) => {
                tracing_subscriber::fmt().with_env_filter(env_filter).init();
                return;
            }
            Err(e) => {
                eprintln!("Warning: invalid logging.filter '{filter_directive}': {e}. Falling back to logging.level.");
            }
        }
    }

    let level = match config.logging.level.to_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "warn" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    };
    tracing_subscriber::fmt().with_max_level(level).init();
}

async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
