// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Collector configuration.

use serde::Deserialize;

pub const DEFAULT_COLLECTOR_PORT: u16 = 4093;

/// Collector configuration (runtime, fully resolved).
#[derive(Debug, Clone)]
pub struct CollectorConfig {
	pub host: String,
	pub port: u16,
	pub database_url: String,
}

impl CollectorConfig {
	pub fn socket_addr(&self) -> String {
		format!("{}:{}", self.host, self.port)
	}
}

impl Default for CollectorConfig {
	fn default() -> Self {
		CollectorConfigLayer::default().finalize()
	}
}

/// Collector configuration layer (partial, for merging).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CollectorConfigLayer {
	#[serde(default)]
	pub host: Option<String>,
	#[serde(default)]
	pub port: Option<u16>,
	#[serde(default)]
	pub database_url: Option<String>,
}

impl CollectorConfigLayer {
	pub fn merge(&mut self, other: CollectorConfigLayer) {
		if other.host.is_some() {
			self.host = other.host;
		}
		if other.port.is_some() {
			self.port = other.port;
		}
		if other.database_url.is_some() {
			self.database_url = other.database_url;
		}
	}

	pub fn finalize(self) -> CollectorConfig {
		CollectorConfig {
			host: self.host.unwrap_or_else(|| "0.0.0.0".to_string()),
			port: self.port.unwrap_or(DEFAULT_COLLECTOR_PORT),
			database_url: self
				.database_url
				.unwrap_or_else(|| "sqlite:./quill.db".to_string()),
		}
	}
}
