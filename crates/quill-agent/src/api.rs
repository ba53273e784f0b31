// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Local HTTP surface of the agent.

use std::sync::Arc;

use axum::{
	extract::State,
	http::StatusCode,
	response::{IntoResponse, Response},
	routing::{get, post},
	Json, Router,
};
use quill_common_api::{routes, AgentHealthResponse, ApiErrorResponse, LogRequest, LogResponse};
use quill_common_core::RecordId;
use tower_http::trace::TraceLayer;
use tracing::instrument;

use crate::agent::{Agent, LogSubmission};
use crate::error::AgentError;

pub fn create_router(agent: Arc<Agent>) -> Router {
	Router::new()
		.route(routes::AGENT_LOG, post(log_handler))
		.route(routes::HEALTH, get(health_handler))
		.layer(TraceLayer::new_for_http())
		.with_state(agent)
}

fn error_response(status: StatusCode, error: &str, message: impl Into<String>) -> Response {
	(status, Json(ApiErrorResponse::new(error, message))).into_response()
}

impl TryFrom<LogRequest> for LogSubmission {
	type Error = AgentError;

	fn try_from(req: LogRequest) -> Result<Self, Self::Error> {
		let id = match req.id {
			Some(raw) => Some(
				raw.parse::<RecordId>()
					.map_err(|e| AgentError::InvalidRequest(e.to_string()))?,
			),
			None => None,
		};
		Ok(Self {
			id,
			timestamp: req.timestamp,
			service_name: req.service_name,
			operation: req.operation,
			actor_id: req.actor_id,
			actor_type: req.actor_type,
			affected_resources: req.affected_resources,
			metadata: req.metadata,
			integrity_hash: req.integrity_hash,
		})
	}
}

#[instrument(skip_all)]
async fn log_handler(State(agent): State<Arc<Agent>>, Json(payload): Json<LogRequest>) -> Response {
	let submission = match LogSubmission::try_from(payload) {
		Ok(s) => s,
		Err(e) => return error_response(StatusCode::BAD_REQUEST, "invalid_request", e.to_string()),
	};

	match agent.log(submission).await {
		Ok(id) => (
			StatusCode::ACCEPTED,
			Json(LogResponse {
				success: true,
				id: id.to_string(),
			}),
		)
			.into_response(),
		Err(AgentError::InvalidRequest(message)) => {
			error_response(StatusCode::BAD_REQUEST, "invalid_request", message)
		}
		Err(AgentError::ShuttingDown) => error_response(
			StatusCode::SERVICE_UNAVAILABLE,
			"shutting_down",
			"agent is shutting down",
		),
		Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, "capture_failed", e.to_string()),
	}
}

async fn health_handler(State(agent): State<Arc<Agent>>) -> Response {
	match agent.buffered().await {
		Ok(buffered) => Json(AgentHealthResponse {
			status: "healthy".to_string(),
			buffered,
			accepting: agent.is_accepting(),
		})
		.into_response(),
		Err(e) => error_response(StatusCode::SERVICE_UNAVAILABLE, "outbox_unavailable", e.to_string()),
	}
}
