// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Persistence outcomes and the per-record results reported back to agents.
//!
//! The collector classifies every write into a [`PersistOutcome`]. That tag
//! travels on the wire, so an agent never has to infer "already stored" from
//! transport status codes.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CodecError;
use crate::record::RecordId;

/// Stable numeric discriminants for error reasons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ErrorCode {
	AlreadyPersisted = 1001,
	InvalidErrorFormat = 1002,
	ValidationFailed = 1003,
	StorageUnavailable = 1004,
}

impl ErrorCode {
	pub fn as_u32(self) -> u32 {
		self as u32
	}

	pub fn from_u32(code: u32) -> Option<Self> {
		match code {
			1001 => Some(Self::AlreadyPersisted),
			1002 => Some(Self::InvalidErrorFormat),
			1003 => Some(Self::ValidationFailed),
			1004 => Some(Self::StorageUnavailable),
			_ => None,
		}
	}

	pub fn default_message(self) -> &'static str {
		match self {
			Self::AlreadyPersisted => "Already Persisted",
			Self::InvalidErrorFormat => "Invalid Error Format",
			Self::ValidationFailed => "Validation Failed",
			Self::StorageUnavailable => "Storage Unavailable",
		}
	}
}

/// Error attached to a non-successful [`DispatchResult`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReason {
	pub code: u32,
	pub message: String,
}

impl ErrorReason {
	pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
		Self {
			code: code.as_u32(),
			message: message.into(),
		}
	}

	pub fn already_persisted() -> Self {
		Self::new(
			ErrorCode::AlreadyPersisted,
			ErrorCode::AlreadyPersisted.default_message(),
		)
	}

	pub fn error_code(&self) -> Option<ErrorCode> {
		ErrorCode::from_u32(self.code)
	}

	pub fn is(&self, code: ErrorCode) -> bool {
		self.code == code.as_u32()
	}

	/// Parse the `[ERROR] [<code>] <message>` form produced by `Display`.
	pub fn parse(s: &str) -> Result<Self, CodecError> {
		let invalid = || CodecError::InvalidErrorFormat(s.to_string());

		let rest = s.strip_prefix("[ERROR] [").ok_or_else(invalid)?;
		let (code, message) = rest.split_once("] ").ok_or_else(invalid)?;
		let code = code.parse::<u32>().map_err(|_| invalid())?;

		Ok(Self {
			code,
			message: message.to_string(),
		})
	}
}

impl fmt::Display for ErrorReason {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "[ERROR] [{}] {}", self.code, self.message)
	}
}

/// Outcome of one persistence attempt for one record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PersistOutcome {
	/// First durable write of this id.
	Persisted,
	/// The id was already stored. Counts as delivered.
	AlreadyPersisted,
	ValidationError { message: String },
	InfrastructureError { message: String },
}

impl PersistOutcome {
	pub fn validation(message: impl Into<String>) -> Self {
		Self::ValidationError {
			message: message.into(),
		}
	}

	pub fn infrastructure(message: impl Into<String>) -> Self {
		Self::InfrastructureError {
			message: message.into(),
		}
	}

	/// True when the record is durably stored and may leave the outbox.
	pub fn is_acknowledged(&self) -> bool {
		matches!(self, Self::Persisted | Self::AlreadyPersisted)
	}

	pub fn as_str(&self) -> &'static str {
		match self {
			Self::Persisted => "persisted",
			Self::AlreadyPersisted => "already_persisted",
			Self::ValidationError { .. } => "validation_error",
			Self::InfrastructureError { .. } => "infrastructure_error",
		}
	}

	pub fn reason(&self) -> Option<ErrorReason> {
		match self {
			Self::Persisted => None,
			Self::AlreadyPersisted => Some(ErrorReason::already_persisted()),
			Self::ValidationError { message } => {
				Some(ErrorReason::new(ErrorCode::ValidationFailed, message.clone()))
			}
			Self::InfrastructureError { message } => Some(ErrorReason::new(
				ErrorCode::StorageUnavailable,
				message.clone(),
			)),
		}
	}
}

impl fmt::Display for PersistOutcome {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::ValidationError { message } | Self::InfrastructureError { message } => {
				write!(f, "{}: {}", self.as_str(), message)
			}
			_ => f.write_str(self.as_str()),
		}
	}
}

/// Per-record result of one delivery attempt, as seen by the agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchResult {
	pub id: String,
	pub success: bool,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub reason: Option<ErrorReason>,
}

impl DispatchResult {
	pub fn from_outcome(id: &RecordId, outcome: &PersistOutcome) -> Self {
		Self {
			id: id.to_string(),
			success: matches!(outcome, PersistOutcome::Persisted),
			reason: outcome.reason(),
		}
	}

	pub fn success(id: &RecordId) -> Self {
		Self::from_outcome(id, &PersistOutcome::Persisted)
	}

	/// Successful, or rejected only because the id was already stored.
	pub fn is_acknowledged(&self) -> bool {
		self.success
			|| self
				.reason
				.as_ref()
				.is_some_and(|r| r.is(ErrorCode::AlreadyPersisted))
	}

	pub fn is_already_persisted(&self) -> bool {
		!self.success
			&& self
				.reason
				.as_ref()
				.is_some_and(|r| r.is(ErrorCode::AlreadyPersisted))
	}

	pub fn record_id(&self) -> Option<RecordId> {
		self.id.parse().ok()
	}

	/// Rebuild the tagged outcome from the flattened wire shape.
	pub fn outcome(&self) -> PersistOutcome {
		if self.success {
			return PersistOutcome::Persisted;
		}
		match &self.reason {
			Some(r) if r.is(ErrorCode::AlreadyPersisted) => PersistOutcome::AlreadyPersisted,
			Some(r) if r.is(ErrorCode::StorageUnavailable) => {
				PersistOutcome::infrastructure(r.message.clone())
			}
			Some(r) => PersistOutcome::validation(r.message.clone()),
			None => PersistOutcome::validation("rejected without reason"),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_acknowledged_outcomes() {
		assert!(PersistOutcome::Persisted.is_acknowledged());
		assert!(PersistOutcome::AlreadyPersisted.is_acknowledged());
		assert!(!PersistOutcome::validation("bad").is_acknowledged());
		assert!(!PersistOutcome::infrastructure("down").is_acknowledged());
	}

	#[test]
	fn test_outcome_serializes_with_status_tag() {
		let json = serde_json::to_value(PersistOutcome::AlreadyPersisted).unwrap();
		assert_eq!(json, serde_json::json!({"status": "already_persisted"}));

		let json = serde_json::to_value(PersistOutcome::validation("missing payload")).unwrap();
		assert_eq!(
			json,
			serde_json::json!({"status": "validation_error", "message": "missing payload"})
		);
	}

	#[test]
	fn test_already_persisted_result_is_acknowledged_but_not_success() {
		let id = RecordId::new();
		let result = DispatchResult::from_outcome(&id, &PersistOutcome::AlreadyPersisted);
		assert!(!result.success);
		assert!(result.is_acknowledged());
		assert!(result.is_already_persisted());
		assert_eq!(result.reason.as_ref().unwrap().code, 1001);
		assert_eq!(result.outcome(), PersistOutcome::AlreadyPersisted);
	}

	#[test]
	fn test_validation_result_is_not_acknowledged() {
		let id = RecordId::new();
		let result = DispatchResult::from_outcome(&id, &PersistOutcome::validation("bad id"));
		assert!(!result.is_acknowledged());
		assert_eq!(
			result.reason.as_ref().unwrap().error_code(),
			Some(ErrorCode::ValidationFailed)
		);
		assert_eq!(result.outcome(), PersistOutcome::validation("bad id"));
	}

	#[test]
	fn test_success_result_omits_reason() {
		let id = RecordId::new();
		let json = serde_json::to_value(DispatchResult::success(&id)).unwrap();
		assert_eq!(json, serde_json::json!({"id": id.to_string(), "success": true}));
	}

	#[test]
	fn test_error_reason_display_and_parse() {
		let reason = ErrorReason::already_persisted();
		assert_eq!(reason.to_string(), "[ERROR] [1001] Already Persisted");
		assert_eq!(ErrorReason::parse(&reason.to_string()).unwrap(), reason);
	}

	#[test]
	fn test_error_reason_parse_rejects_malformed() {
		for input in ["", "oops", "[ERROR] 1001 x", "[ERROR] [abc] x", "[WARN] [1] x"] {
			let result = ErrorReason::parse(input);
			assert!(
				matches!(result, Err(CodecError::InvalidErrorFormat(_))),
				"input {input:?} should be rejected"
			);
		}
	}

	#[test]
	fn test_error_code_roundtrip() {
		for code in [
			ErrorCode::AlreadyPersisted,
			ErrorCode::InvalidErrorFormat,
			ErrorCode::ValidationFailed,
			ErrorCode::StorageUnavailable,
		] {
			assert_eq!(ErrorCode::from_u32(code.as_u32()), Some(code));
		}
		assert_eq!(ErrorCode::from_u32(42), None);
	}
}
