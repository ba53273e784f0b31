// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Quill agent binary.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use quill_agent::{create_router, Agent, AgentSettings, HttpCollectorClient};
use quill_agent_outbox::Outbox;
use quill_config::LoggingConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Quill agent - buffers audit records locally and ships them to the collector.
#[derive(Parser, Debug)]
#[command(name = "quill-agent", about = "Quill audit log agent", version)]
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
		println!("quill-agent {}", env!("CARGO_PKG_VERSION"));
		return Ok(());
	}

	dotenvy::dotenv().ok();

	let config = match args.config {
		Some(path) => quill_config::load_config_with_file(path)?,
		None => quill_config::load_config()?,
	};
	init_tracing(&config.logging);

	let agent_config = &config.agent;
	tracing::info!(
		addr = %agent_config.socket_addr(),
		collector_url = %agent_config.collector_url,
		outbox = %agent_config.outbox_path.display(),
		"starting quill-agent"
	);

	let outbox = Arc::new(
		Outbox::open(&agent_config.outbox_path)
			.await
			.context("failed to open outbox")?,
	);
	let client = Arc::new(HttpCollectorClient::new(
		&agent_config.collector_url,
		agent_config.request_timeout(),
	)?);
	if !client.is_server_reachable().await {
		tracing::warn!(
			collector_url = %agent_config.collector_url,
			"Collector is not reachable yet, records will stay buffered until it is"
		);
	}

	let agent = Arc::new(Agent::new(
		outbox,
		client,
		AgentSettings::from(agent_config),
	));
	agent.start().await;

	let app = create_router(agent.clone());
	let listener = tokio::net::TcpListener::bind(agent_config.socket_addr())
		.await
		.with_context(|| format!("failed to bind {}", agent_config.socket_addr()))?;
	tracing::info!(addr = %agent_config.socket_addr(), "agent listening");

	axum::serve(listener, app)
		.with_graceful_shutdown(shutdown_signal())
		.await?;

	agent.shutdown().await;
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
