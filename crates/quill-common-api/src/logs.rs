// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use chrono::{DateTime, Utc};
use quill_common_core::{CodecError, DispatchResult, ErrorReason, LogRecord, PersistOutcome};
use serde::{Deserialize, Serialize};

/// A log record as carried between agent and collector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireLog {
	pub id: String,
	pub timestamp: DateTime<Utc>,
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
}

impl From<&LogRecord> for WireLog {
	fn from(record: &LogRecord) -> Self {
		Self {
			id: record.id.to_string(),
			timestamp: record.timestamp,
			service_name: record.service_name.clone(),
			operation: record.operation.clone(),
			actor_id: record.actor_id.clone(),
			actor_type: record.actor_type.clone(),
			affected_resources: record.affected_resources.clone(),
			metadata: record.metadata.clone(),
			integrity_hash: record.integrity_hash.clone(),
		}
	}
}

impl TryFrom<WireLog> for LogRecord {
	type Error = CodecError;

	fn try_from(wire: WireLog) -> Result<Self, Self::Error> {
		Ok(LogRecord {
			id: wire.id.parse()?,
			timestamp: wire.timestamp,
			service_name: wire.service_name,
			operation: wire.operation,
			actor_id: wire.actor_id,
			actor_type: wire.actor_type,
			affected_resources: wire.affected_resources,
			metadata: wire.metadata,
			integrity_hash: wire.integrity_hash,
		})
	}
}

/// Single-record ingestion request. A missing `log` is rejected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersistLogRequest {
	#[serde(default)]
	pub log: Option<WireLog>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistLogResponse {
	pub id: String,
	pub success: bool,
	pub outcome: PersistOutcome,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub reason: Option<ErrorReason>,
}

impl PersistLogResponse {
	pub fn new(id: impl Into<String>, outcome: PersistOutcome) -> Self {
		Self {
			id: id.into(),
			success: matches!(outcome, PersistOutcome::Persisted),
			reason: outcome.reason(),
			outcome,
		}
	}

	pub fn into_result(self) -> DispatchResult {
		DispatchResult {
			id: self.id,
			success: self.success,
			reason: self.reason,
		}
	}
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchPersistLogRequest {
	#[serde(default)]
	pub logs: Vec<WireLog>,
}

/// One result per submitted record, in submission order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchPersistLogResponse {
	pub results: Vec<DispatchResult>,
}

/// Filter and cursor for listing persisted logs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListLogsQuery {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub service_name: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub operation: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub actor_id: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub actor_type: Option<String>,
	/// Comma-separated list matched against the full resource list.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub affected_resources: Option<String>,
	/// JSON object; every key must match the stored metadata.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub metadata: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub cursor_timestamp: Option<DateTime<Utc>>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub cursor_id: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub limit: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireCursor {
	pub timestamp: DateTime<Utc>,
	pub id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListLogsResponse {
	pub logs: Vec<WireLog>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub next_cursor: Option<WireCursor>,
}
