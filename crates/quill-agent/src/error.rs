// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use quill_agent_outbox::OutboxError;
use thiserror::Error;

use crate::client::ClientError;

#[derive(Debug, Error)]
pub enum AgentError {
	#[error("outbox error: {0}")]
	Outbox(#[from] OutboxError),

	#[error("collector client error: {0}")]
	Client(#[from] ClientError),

	#[error("agent is shutting down")]
	ShuttingDown,

	#[error("invalid request: {0}")]
	InvalidRequest(String),
}

pub type Result<T> = std::result::Result<T, AgentError>;
