// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Edge agent configuration.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_FLUSH_INTERVAL_SECS: u64 = 5;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_MAX_BATCH_SIZE: usize = 1000;
/// Well under the collector's request body limit.
pub const DEFAULT_MAX_BATCH_BYTES: usize = 8 * 1024 * 1024;
pub const DEFAULT_AGENT_PORT: u16 = 4092;

/// How buffered records are sent to the collector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchMode {
	/// One request per flush chunk carrying many records.
	#[default]
	Batch,
	/// One request per record.
	Individual,
}

impl fmt::Display for DispatchMode {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			DispatchMode::Batch => write!(f, "batch"),
			DispatchMode::Individual => write!(f, "individual"),
		}
	}
}

impl FromStr for DispatchMode {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.trim().to_lowercase().as_str() {
			"batch" => Ok(DispatchMode::Batch),
			"individual" | "single" => Ok(DispatchMode::Individual),
			other => Err(format!("unknown dispatch mode '{other}'")),
		}
	}
}

/// Agent configuration (runtime, fully resolved).
#[derive(Debug, Clone)]
pub struct AgentConfig {
	pub outbox_path: PathBuf,
	pub collector_url: String,
	pub flush_interval_secs: u64,
	pub request_timeout_secs: u64,
	pub dispatch_mode: DispatchMode,
	pub max_batch_size: usize,
	/// Upper bound on the encoded size of one batch request.
	pub max_batch_bytes: usize,
	pub host: String,
	pub port: u16,
}

impl AgentConfig {
	pub fn flush_interval(&self) -> Duration {
		Duration::from_secs(self.flush_interval_secs)
	}

	pub fn request_timeout(&self) -> Duration {
		Duration::from_secs(self.request_timeout_secs)
	}

	pub fn socket_addr(&self) -> String {
		format!("{}:{}", self.host, self.port)
	}
}

impl Default for AgentConfig {
	fn default() -> Self {
		AgentConfigLayer::default().finalize()
	}
}

/// Agent configuration layer (partial, for merging).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AgentConfigLayer {
	#[serde(default)]
	pub outbox_path: Option<PathBuf>,
	#[serde(default)]
	pub collector_url: Option<String>,
	#[serde(default)]
	pub flush_interval_secs: Option<u64>,
	#[serde(default)]
	pub request_timeout_secs: Option<u64>,
	#[serde(default)]
	pub dispatch_mode: Option<DispatchMode>,
	#[serde(default)]
	pub max_batch_size: Option<usize>,
	#[serde(default)]
	pub max_batch_bytes: Option<usize>,
	#[serde(default)]
	pub host: Option<String>,
	#[serde(default)]
	pub port: Option<u16>,
}

impl AgentConfigLayer {
	pub fn merge(&mut self, other: AgentConfigLayer) {
		if other.outbox_path.is_some() {
			self.outbox_path = other.outbox_path;
		}
		if other.collector_url.is_some() {
			self.collector_url = other.collector_url;
		}
		if other.flush_interval_secs.is_some() {
			self.flush_interval_secs = other.flush_interval_secs;
		}
		if other.request_timeout_secs.is_some() {
			self.request_timeout_secs = other.request_timeout_secs;
		}
		if other.dispatch_mode.is_some() {
			self.dispatch_mode = other.dispatch_mode;
		}
		if other.max_batch_size.is_some() {
			self.max_batch_size = other.max_batch_size;
		}
		if other.max_batch_bytes.is_some() {
			self.max_batch_bytes = other.max_batch_bytes;
		}
		if other.host.is_some() {
			self.host = other.host;
		}
		if other.port.is_some() {
			self.port = other.port;
		}
	}

	pub fn finalize(self) -> AgentConfig {
		AgentConfig {
			outbox_path: self
				.outbox_path
				.unwrap_or_else(|| PathBuf::from("./quill-outbox.db")),
			collector_url: self
				.collector_url
				.unwrap_or_else(|| "http://127.0.0.1:4093".to_string()),
			flush_interval_secs: self
				.flush_interval_secs
				.unwrap_or(DEFAULT_FLUSH_INTERVAL_SECS),
			request_timeout_secs: self
				.request_timeout_secs
				.unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
			dispatch_mode: self.dispatch_mode.unwrap_or_default(),
			max_batch_size: self.max_batch_size.unwrap_or(DEFAULT_MAX_BATCH_SIZE),
			max_batch_bytes: self.max_batch_bytes.unwrap_or(DEFAULT_MAX_BATCH_BYTES),
			host: self.host.unwrap_or_else(|| "0.0.0.0".to_string()),
			port: self.port.unwrap_or(DEFAULT_AGENT_PORT),
		}
	}
}
