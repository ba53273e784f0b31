// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration sources: environment variables and TOML files.

use std::path::PathBuf;

use tracing::{debug, trace};

use crate::error::ConfigError;
use crate::layer::QuillConfigLayer;
use crate::sections::{AgentConfigLayer, CollectorConfigLayer, DispatchMode, LoggingConfigLayer};

/// Source precedence levels (higher = overrides lower).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
	Defaults = 10,
	ConfigFile = 20,
	Environment = 50,
}

/// Trait for configuration sources.
pub trait ConfigSource: Send + Sync {
	fn name(&self) -> &'static str;
	fn precedence(&self) -> Precedence;
	fn load(&self) -> Result<QuillConfigLayer, ConfigError>;
}

/// Built-in defaults source.
pub struct DefaultsSource;

impl ConfigSource for DefaultsSource {
	fn name(&self) -> &'static str {
		"defaults"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Defaults
	}

	fn load(&self) -> Result<QuillConfigLayer, ConfigError> {
		debug!("loading defaults");
		Ok(QuillConfigLayer::default())
	}
}

/// TOML file configuration source.
pub struct TomlSource {
	path: PathBuf,
}

impl TomlSource {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}

	pub fn system() -> Self {
		Self::new("/etc/quill/quill.toml")
	}
}

impl ConfigSource for TomlSource {
	fn name(&self) -> &'static str {
		"toml-config"
	}

	fn precedence(&self) -> Precedence {
		Precedence::ConfigFile
	}

	fn load(&self) -> Result<QuillConfigLayer, ConfigError> {
		if !self.path.exists() {
			debug!(path = %self.path.display(), "config file not found, skipping");
			return Ok(QuillConfigLayer::default());
		}

		debug!(path = %self.path.display(), "loading config file");
		let content = std::fs::read_to_string(&self.path).map_err(|e| ConfigError::FileRead {
			path: self.path.clone(),
			source: e,
		})?;

		let layer: QuillConfigLayer =
			toml::from_str(&content).map_err(|e| ConfigError::TomlParse {
				path: self.path.clone(),
				source: e,
			})?;

		trace!("parsed config layer from TOML");
		Ok(layer)
	}
}

/// Environment variable source.
///
/// Convention: QUILL_<SECTION>_<FIELD>
pub struct EnvSource;

impl ConfigSource for EnvSource {
	fn name(&self) -> &'static str {
		"environment"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Environment
	}

	fn load(&self) -> Result<QuillConfigLayer, ConfigError> {
		debug!("loading environment variables");
		Ok(QuillConfigLayer {
			agent: Some(load_agent_from_env()?),
			collector: Some(load_collector_from_env()?),
			logging: Some(load_logging_from_env()),
		})
	}
}

fn env_var(name: &str) -> Option<String> {
	std::env::var(name).ok().filter(|s| !s.is_empty())
}

fn env_bool(name: &str) -> Option<bool> {
	env_var(name).map(|v| v.eq_ignore_ascii_case("true") || v == "1")
}

fn env_parse<T: std::str::FromStr>(name: &str, kind: &str) -> Result<Option<T>, ConfigError> {
	match env_var(name) {
		Some(v) => v.parse().map(Some).map_err(|_| ConfigError::InvalidValue {
			key: name.to_string(),
			message: format!("invalid {kind} value '{v}'"),
		}),
		None => Ok(None),
	}
}

fn load_agent_from_env() -> Result<AgentConfigLayer, ConfigError> {
	let dispatch_mode = match env_var("QUILL_AGENT_DISPATCH_MODE") {
		Some(v) => Some(v.parse::<DispatchMode>().map_err(|message| {
			ConfigError::InvalidValue {
				key: "QUILL_AGENT_DISPATCH_MODE".to_string(),
				message,
			}
		})?),
		None => None,
	};

	Ok(AgentConfigLayer {
		outbox_path: env_var("QUILL_AGENT_OUTBOX_PATH").map(PathBuf::from),
		collector_url: env_var("QUILL_AGENT_COLLECTOR_URL"),
		flush_interval_secs: env_parse("QUILL_AGENT_FLUSH_INTERVAL_SECS", "u64")?,
		request_timeout_secs: env_parse("QUILL_AGENT_REQUEST_TIMEOUT_SECS", "u64")?,
		dispatch_mode,
		max_batch_size: env_parse("QUILL_AGENT_MAX_BATCH_SIZE", "usize")?,
		max_batch_bytes: env_parse("QUILL_AGENT_MAX_BATCH_BYTES", "usize")?,
		host: env_var("QUILL_AGENT_HOST"),
		port: env_parse("QUILL_AGENT_PORT", "u16")?,
	})
}

fn load_collector_from_env() -> Result<CollectorConfigLayer, ConfigError> {
	Ok(CollectorConfigLayer {
		host: env_var("QUILL_COLLECTOR_HOST"),
		port: env_parse("QUILL_COLLECTOR_PORT", "u16")?,
		database_url: env_var("QUILL_COLLECTOR_DATABASE_URL"),
	})
}

fn load_logging_from_env() -> LoggingConfigLayer {
	LoggingConfigLayer {
		level: env_var("QUILL_LOG_LEVEL"),
		json: env_bool("QUILL_LOG_JSON"),
	}
}
