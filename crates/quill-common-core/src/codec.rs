// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Byte encoding for records stored in the agent outbox.

use crate::error::Result;
use crate::record::LogRecord;

/// Serialize a record into the outbox value format.
pub fn encode(record: &LogRecord) -> Result<Vec<u8>> {
	Ok(serde_json::to_vec(record)?)
}

/// Deserialize a record previously produced by [`encode`].
pub fn decode(bytes: &[u8]) -> Result<LogRecord> {
	Ok(serde_json::from_slice(bytes)?)
}
