use anyhow::{Context, Result};
use axum_server::tls_rustls::RustlsConfig;
use lib_nest::core::listener;
use lib_nest::{Bridge, MemoryStore, ReadingEncoder};
use std::sync::Arc;
use tokio::signal;

mod nest_logic;
use nest_logic::{config, downstream, logger, state};

#[tokio::main]
async fn main() -> Result<()> {
    // Explicitly install the default crypto provider for rustls
    let _ = rustls::crypto::ring::default_provider().install_default();

    let settings = config::load_config()?;
    let log_file = logger::setup_logging(&settings.log_dir, &settings.log_level)?;
    for line in settings.summary() {
        log::info!("{}", line);
    }
    log::info!(param = log_file.display().to_string(); "Logging to file");

    let tls = match &settings.tls {
        Some(paths) => Some(
            RustlsConfig::from_pem_file(&paths.cert, &paths.key)
                .await
                .with_context(|| format!("Failed to load TLS material from {:?} and {:?}", paths.cert, paths.key))?,
        ),
        None => {
            log::info!("TLS not configured, serving plain HTTP only.");
            None
        }
    };

    let store = Arc::new(MemoryStore::new());
    let encoder = ReadingEncoder::new(settings.wire_format, settings.separator.clone(), settings.aux_fields.clone());
    let bridge = Arc::new(Bridge::new(encoder, store.clone()));

    let (readings_tx, readings_rx) = tokio::sync::mpsc::channel(settings.channel_capacity);
    let (shutdown_tx, _) = tokio::sync::broadcast::channel(1);
    let app_state = state::AppState::new(
        bridge.clone(),
        readings_tx,
        log_file,
        settings.log_page_limit,
    );

    let listener_handle = tokio::spawn(listener::run(bridge, store, readings_rx, shutdown_tx.subscribe()));

    let mut downstream_handle = tokio::spawn(downstream::run(
        settings.clone(),
        app_state,
        tls,
        shutdown_tx.subscribe(),
    ));

    // Wait for shutdown signal, or for the servers to give up on their own
    let early_exit = tokio::select! {
        _ = signal::ctrl_c() => {
            log::info!("Ctrl-C received, initiating shutdown.");
            None
        }
        served = &mut downstream_handle => {
            log::error!("Downstream server exited before shutdown was requested.");
            Some(served)
        }
        _ = async {
            #[cfg(unix)]
            {
                match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                    Ok(mut term_signal) => {
                        term_signal.recv().await;
                        log::info!("SIGTERM received, initiating shutdown.");
                    }
                    Err(e) => {
                        log::warn!("Cannot listen for SIGTERM: {}", e);
                        std::future::pending::<()>().await;
                    }
                }
            }
            #[cfg(not(unix))]
            {
                std::future::pending::<()>().await;
            }
        } => None,
    };

    // Send shutdown signal to all components
    let _ = shutdown_tx.send(());

    let served = match early_exit {
        Some(served) => served,
        None => downstream_handle.await,
    };
    let stats = listener_handle.await?;
    log::info!(
        "Listener stopped: {} ingested, {} failed, {} lost",
        stats.ingested,
        stats.failed,
        stats.lost
    );

    if let Err(e) = served? {
        log::error!("Downstream server stopped with error: {:#}", e);
        return Err(e);
    }

    log::info!("Shutdown complete.");
    Ok(())
}
