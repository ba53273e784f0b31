// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Wire types for the Quill HTTP APIs.
//!
//! `agent` holds the inbound logging call served by the agent. `logs` holds
//! the ingestion and listing calls served by the collector.

pub mod agent;
pub mod logs;

use serde::{Deserialize, Serialize};

pub use agent::{AgentHealthResponse, LogRequest, LogResponse};
pub use logs::{
	BatchPersistLogRequest, BatchPersistLogResponse, ListLogsQuery, ListLogsResponse,
	PersistLogRequest, PersistLogResponse, WireLog,
};

/// Route paths shared by clients and servers.
pub mod routes {
	pub const HEALTH: &str = "/health";
	pub const AGENT_LOG: &str = "/api/v1/log";
	pub const LOGS: &str = "/api/v1/logs";
	pub const LOGS_BATCH: &str = "/api/v1/logs/batch";
}

/// Error body returned by both services.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiErrorResponse {
	pub error: String,
	pub message: String,
}

impl ApiErrorResponse {
	pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
		Self {
			error: error.into(),
			message: message.into(),
		}
	}
}
