// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use thiserror::Error;

/// Errors produced while encoding or decoding records.
#[derive(Debug, Error)]
pub enum CodecError {
	#[error("serialization error: {0}")]
	Serialization(#[from] serde_json::Error),

	#[error("invalid record id: {0}")]
	InvalidId(String),

	#[error("invalid error format: {0}")]
	InvalidErrorFormat(String),
}

pub type Result<T> = std::result::Result<T, CodecError>;
