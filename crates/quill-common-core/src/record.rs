// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CodecError;

/// Identifier of a log record, assigned once by the writer.
///
/// The id is the only identity used for deduplication, both in the agent's
/// outbox and in the collector's storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub Uuid);

impl RecordId {
	pub fn new() -> Self {
		Self(Uuid::new_v4())
	}

	/// Canonical hyphenated form, used as the outbox key.
	pub fn as_key(&self) -> String {
		self.0.hyphenated().to_string()
	}
}

impl Default for RecordId {
	fn default() -> Self {
		Self::new()
	}
}

impl fmt::Display for RecordId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl FromStr for RecordId {
	type Err = CodecError;

	fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
		Uuid::parse_str(s.trim())
			.map(Self)
			.map_err(|e| CodecError::InvalidId(format!("{s}: {e}")))
	}
}

impl From<Uuid> for RecordId {
	fn from(id: Uuid) -> Self {
		Self(id)
	}
}

/// A single audit log record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
	pub id: RecordId,
	pub timestamp: DateTime<Utc>,
	pub service_name: String,
	pub operation: String,
	pub actor_id: String,
	pub actor_type: String,
	#[serde(default)]
	pub affected_resources: Vec<String>,
	#[serde(default)]
	pub metadata: serde_json::Map<String, serde_json::Value>,
	#[serde(default)]
	pub integrity_hash: String,
}

impl LogRecord {
	/// Create a builder for a record describing `operation` on `service_name`.
	pub fn builder(service_name: impl Into<String>, operation: impl Into<String>) -> LogRecordBuilder {
		LogRecordBuilder::new(service_name, operation)
	}
}

/// Builder for constructing log records with a fluent API.
#[derive(Debug, Clone)]
pub struct LogRecordBuilder {
	id: Option<RecordId>,
	timestamp: Option<DateTime<Utc>>,
	service_name: String,
	operation: String,
	actor_id: String,
	actor_type: String,
	affected_resources: Vec<String>,
	metadata: serde_json::Map<String, serde_json::Value>,
	integrity_hash: String,
}

impl LogRecordBuilder {
	pub fn new(service_name: impl Into<String>, operation: impl Into<String>) -> Self {
		Self {
			id: None,
			timestamp: None,
			service_name: service_name.into(),
			operation: operation.into(),
			actor_id: String::new(),
			actor_type: String::new(),
			affected_resources: Vec::new(),
			metadata: serde_json::Map::new(),
			integrity_hash: String::new(),
		}
	}

	/// Use an externally supplied id instead of generating one.
	pub fn id(mut self, id: RecordId) -> Self {
		self.id = Some(id);
		self
	}

	/// Set the event time. Defaults to now.
	pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
		self.timestamp = Some(timestamp);
		self
	}

	/// Set who performed the operation.
	pub fn actor(mut self, actor_id: impl Into<String>, actor_type: impl Into<String>) -> Self {
		self.actor_id = actor_id.into();
		self.actor_type = actor_type.into();
		self
	}

	/// Append one affected resource.
	pub fn resource(mut self, resource: impl Into<String>) -> Self {
		self.affected_resources.push(resource.into());
		self
	}

	pub fn resources<I, S>(mut self, resources: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.affected_resources = resources.into_iter().map(Into::into).collect();
		self
	}

	/// Insert one metadata entry.
	pub fn meta(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
		self.metadata.insert(key.into(), value);
		self
	}

	pub fn metadata(mut self, metadata: serde_json::Map<String, serde_json::Value>) -> Self {
		self.metadata = metadata;
		self
	}

	pub fn integrity_hash(mut self, hash: impl Into<String>) -> Self {
		self.integrity_hash = hash.into();
		self
	}

	pub fn build(self) -> LogRecord {
		LogRecord {
			id: self.id.unwrap_or_default(),
			timestamp: self.timestamp.unwrap_or_else(Utc::now),
			service_name: self.service_name,
			operation: self.operation,
			actor_id: self.actor_id,
			actor_type: self.actor_type,
			affected_resources: self.affected_resources,
			metadata: self.metadata,
			integrity_hash: self.integrity_hash,
		}
	}
}
