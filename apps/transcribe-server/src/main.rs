use anyhow::Result;
use clap::Parser;
use prometheus::Registry;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info};
use transcription_queue::{QueueManager, QueueMetrics, RoomHub};

use transcribe_server::config::Config;
use transcribe_server::{build_engine, observability, routes, AppState};

#[tokio::main]
async fn main() -> Result<()> {
	dotenvy::dotenv().ok();

	let config = Config::parse();
	config.validate().map_err(anyhow::Error::msg)?;

	observability::init_tracing(&config)?;
	info!(
		engine = ?config.engine,
		storage_dir = %config.queue.storage_dir.display(),
		models_dir = %config.models_dir.display(),
		"starting transcribe-server"
	);

	let registry = Registry::new();
	let hub = Arc::new(RoomHub::new(config.room_capacity));
	let engine = build_engine(&config)?;
	let metrics = QueueMetrics::new(&registry)?;

	let manager = Arc::new(QueueManager::open(&config.queue, hub.clone(), engine, metrics)?);
	manager.start()?;

	let app = routes::router(AppState::new(Arc::clone(&manager), hub, registry));
	let addr = config.bind_addr();
	let listener = TcpListener::bind(&addr).await?;
	info!(%addr, "listening");

	axum::serve(listener, app).with_graceful_shutdown(wait_for_shutdown_signal()).await?;

	info!("http server stopped, waiting for the transcription worker");
	tokio::task::spawn_blocking(move || manager.shutdown()).await?;
	info!("shutdown complete");
	Ok(())
}

async fn wait_for_shutdown_signal() {
	let ctrl_c = async {
		if let Err(e) = signal::ctrl_c().await {
			error!(error = %e, "failed to listen for Ctrl+C");
			std::future::pending::<()>().await;
		}
	};

	#[cfg(unix)]
	let terminate = async {
		match signal::unix::signal(signal::unix::SignalKind::terminate()) {
			Ok(mut sigterm) => {
				sigterm.recv().await;
			}
			Err(e) => {
				error!(error = %e, "failed to install SIGTERM handler");
				std::future::pending::<()>().await;
			}
		}
	};

	#[cfg(not(unix))]
	let terminate = std::future::pending::<()>();

	tokio::select! {
		() = ctrl_c => {},
		() = terminate => {},
	}

	info!("shutdown signal received (SIGTERM/SIGINT)");
}
