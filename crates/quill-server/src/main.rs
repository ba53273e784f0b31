// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Quill collector binary.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use quill_config::LoggingConfig;
use quill_server::{create_router, AppState};
use quill_server_db::SqliteLogRepository;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Quill server - central collector for audit records.
#[derive(Parser, Debug)]
#[command(name = "quill-server", about = "Quill audit log collector", version)]
struct Args {
	/// Path to a TOML config file (defaults to /etc/quill/quill.toml)
	#[arg(short, long, env = "QUILL_CONFIG")]
	config: Option<PathBuf>,

	#[command(subcommand)]
	command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
	/// Show version information
	Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	let args = Args::parse();

	if let Some(Command::Version) = args.command {
		println!("quill-server {}", env!("CARGO_PKG_VERSION"));
		return Ok(());
	}

	dotenvy::dotenv().ok();

	let config = match args.config {
		Some(path) => quill_config::load_config_with_file(path)?,
		None => quill_config::load_config()?,
	};
	init_tracing(&config.logging);

	let collector = &config.collector;
	tracing::info!(
		addr = %collector.socket_addr(),
		database = %collector.database_url,
		"starting quill-server"
	);

	let pool = quill_server_db::create_pool(&collector.database_url)
		.await
		.context("failed to open database")?;
	quill_server_db::run_migrations(&pool)
		.await
		.context("failed to run migrations")?;

	let repo = Arc::new(SqliteLogRepository::new(pool.clone()));
	let state = Arc::new(AppState::new(repo));
	let app = create_router(state);

	let listener = tokio::net::TcpListener::bind(collector.socket_addr())
		.await
		.with_context(|| format!("failed to bind {}", collector.socket_addr()))?;
	tracing::info!(addr = %collector.socket_addr(), "server listening");

	axum::serve(listener, app)
		.with_graceful_shutdown(shutdown_signal())
		.await?;

	pool.close().await;
	tracing::info!("Server stopped");
	Ok(())
}

fn init_tracing(logging: &LoggingConfig) {
	let filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
	let registry = tracing_subscriber::registry().with(filter);
	if logging.json {
		registry.with(tracing_subscriber::fmt::layer().json()).init();
	} else {
		registry.with(tracing_subscriber::fmt::layer()).init();
	}
}

async fn shutdown_signal() {
	let ctrl_c = async {
		if let Err(e) = tokio::signal::ctrl_c().await {
			tracing::error!(error = %e, "Failed to listen for ctrl-c");
		}
	};

	#[cfg(unix)]
	let terminate = async {
		match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
			Ok(mut signal) => {
				signal.recv().await;
			}
			Err(e) => {
				tracing::error!(error = %e, "Failed to install SIGTERM handler");
				std::future::pending::<()>().await;
			}
		}
	};

	#[cfg(not(unix))]
	let terminate = std::future::pending::<()>();

	tokio::select! {
		_ = ctrl_c => {},
		_ = terminate => {},
	}

	tracing::info!("Shutdown signal received");
}
