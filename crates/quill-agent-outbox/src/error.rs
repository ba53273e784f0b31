// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use quill_common_core::CodecError;

#[derive(Debug, thiserror::Error)]
pub enum OutboxError {
	#[error("Outbox storage error: {0}")]
	Sqlx(#[from] sqlx::Error),

	#[error("Outbox codec error: {0}")]
	Codec(#[from] CodecError),

	#[error("Invalid outbox path: {0}")]
	InvalidPath(String),

	#[error("Outbox is closed")]
	Closed,
}

pub type Result<T> = std::result::Result<T, OutboxError>;
