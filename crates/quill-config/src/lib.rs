// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Centralized configuration management for the Quill agent and collector.
//!
//! This crate provides:
//! - Layered configuration from multiple sources (defaults, TOML file, environment)
//! - Type-safe configuration with validation
//! - Consistent environment variable naming (`QUILL_AGENT_*`, `QUILL_COLLECTOR_*`, `QUILL_LOG_*`)
//!
//! # Usage
//!
//! ```ignore
//! use quill_config::load_config;
//!
//! let config = load_config()?;
//! println!("Collector listening on {}", config.collector.socket_addr());
//! ```

pub mod error;
pub mod layer;
pub mod sections;
pub mod sources;

pub use error::ConfigError;
pub use layer::QuillConfigLayer;
pub use sections::*;
pub use sources::{ConfigSource, DefaultsSource, EnvSource, Precedence, TomlSource};

use tracing::{debug, info};

/// Fully resolved configuration.
#[derive(Debug, Clone, Default)]
pub struct QuillConfig {
	pub agent: AgentConfig,
	pub collector: CollectorConfig,
	pub logging: LoggingConfig,
}

/// Load configuration from all sources with standard precedence.
///
/// Precedence (highest to lowest):
/// 1. Environment variables (`QUILL_*`)
/// 2. Config file (`/etc/quill/quill.toml`)
/// 3. Built-in defaults
pub fn load_config() -> Result<QuillConfig, ConfigError> {
	let sources: Vec<Box<dyn ConfigSource>> = vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::system()),
		Box::new(EnvSource),
	];
	load_from_sources(sources)
}

/// Load configuration with a custom config file path.
pub fn load_config_with_file(
	config_path: impl Into<std::path::PathBuf>,
) -> Result<QuillConfig, ConfigError> {
	let sources: Vec<Box<dyn ConfigSource>> = vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::new(config_path)),
		Box::new(EnvSource),
	];
	load_from_sources(sources)
}

/// Merge the given sources in precedence order and finalize.
pub fn load_from_sources(
	mut sources: Vec<Box<dyn ConfigSource>>,
) -> Result<QuillConfig, ConfigError> {
	sources.sort_by_key(|s| s.precedence());

	let mut merged = QuillConfigLayer::default();
	for source in sources {
		debug!(source = source.name(), "loading configuration source");
		let layer = source.load()?;
		merged.merge(layer);
	}

	finalize(merged)
}

/// Finalize configuration layer into resolved config.
fn finalize(layer: QuillConfigLayer) -> Result<QuillConfig, ConfigError> {
	let agent = layer.agent.unwrap_or_default().finalize();
	let collector = layer.collector.unwrap_or_default().finalize();
	let logging = layer.logging.unwrap_or_default().finalize();

	validate_agent(&agent)?;

	info!(
		collector_url = %agent.collector_url,
		outbox = %agent.outbox_path.display(),
		dispatch_mode = %agent.dispatch_mode,
		flush_interval_secs = agent.flush_interval_secs,
		max_batch_size = agent.max_batch_size,
		max_batch_bytes = agent.max_batch_bytes,
		database = %collector.database_url,
		"Quill configuration loaded"
	);

	Ok(QuillConfig {
		agent,
		collector,
		logging,
	})
}

fn validate_agent(agent: &AgentConfig) -> Result<(), ConfigError> {
	if agent.max_batch_size == 0 {
		return Err(ConfigError::Validation(
			"agent.max_batch_size must be at least 1".to_string(),
		));
	}
	if agent.max_batch_bytes == 0 {
		return Err(ConfigError::Validation(
			"agent.max_batch_bytes must be at least 1".to_string(),
		));
	}
	if agent.flush_interval_secs == 0 {
		return Err(ConfigError::Validation(
			"agent.flush_interval_secs must be at least 1".to_string(),
		));
	}
	if agent.request_timeout_secs == 0 {
		return Err(ConfigError::Validation(
			"agent.request_timeout_secs must be at least 1".to_string(),
		));
	}
	if !agent.collector_url.starts_with("http://") && !agent.collector_url.starts_with("https://")
	{
		return Err(ConfigError::InvalidValue {
			key: "agent.collector_url".to_string(),
			message: format!("'{}' is not an http(s) URL", agent.collector_url),
		});
	}

	Ok(())
}
