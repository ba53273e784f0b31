// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Structured log submission accepted by the agent.
///
/// The agent assigns the record id unless `id` is supplied.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LogRequest {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub id: Option<String>,
	pub service_name: String,
	pub operation: String,
	#[serde(default)]
	pub actor_id: String,
	#[serde(default)]
	pub actor_type: String,
	#[serde(default)]
	pub affected_resources: Vec<String>,
	#[serde(default)]
	pub metadata: serde_json::Map<String, serde_json::Value>,
	#[serde(default)]
	pub integrity_hash: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogResponse {
	pub success: bool,
	pub id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentHealthResponse {
	pub status: String,
	pub buffered: u64,
	pub accepting: bool,
}
