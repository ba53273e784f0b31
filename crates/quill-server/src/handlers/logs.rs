// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Ingestion and listing handlers.
//!
//! The persistence outcome travels in the response body as a tagged value.
//! The status code mirrors it (200 persisted, 409 already persisted, 422
//! invalid record, 503 storage unavailable) but clients read the body.

use std::sync::Arc;

use axum::{
	extract::{Query, State},
	http::StatusCode,
	response::IntoResponse,
	Json,
};
use quill_common_api::logs::WireCursor;
use quill_common_api::{
	BatchPersistLogRequest, BatchPersistLogResponse, ListLogsQuery, ListLogsResponse,
	PersistLogRequest, PersistLogResponse, WireLog,
};
use quill_common_core::{DispatchResult, LogRecord, PersistOutcome, RecordId};
use quill_server_db::{DbError, LogCursor, SearchQuery};
use tracing::{error, instrument, warn};

use super::error_response;
use crate::AppState;

fn status_for(outcome: &PersistOutcome) -> StatusCode {
	match outcome {
		PersistOutcome::Persisted => StatusCode::OK,
		PersistOutcome::AlreadyPersisted => StatusCode::CONFLICT,
		PersistOutcome::ValidationError { .. } => StatusCode::UNPROCESSABLE_ENTITY,
		PersistOutcome::InfrastructureError { .. } => StatusCode::SERVICE_UNAVAILABLE,
	}
}

/// Busy or unreachable storage is expected to clear on its own; anything
/// else needs an operator.
fn log_storage_failure(e: &DbError, count: usize, action: &str) {
	if e.is_transient() {
		warn!(error = %e, count, "Storage unavailable, failed to {action}");
	} else {
		error!(error = %e, count, "Storage failure, failed to {action}");
	}
}

fn outcome_response(id: String, outcome: PersistOutcome) -> impl IntoResponse {
	(status_for(&outcome), Json(PersistLogResponse::new(id, outcome)))
}

pub async fn persist_log(
	State(state): State<Arc<AppState>>,
	Json(payload): Json<PersistLogRequest>,
) -> impl IntoResponse {
	persist_log_impl(state, payload).await
}

pub async fn batch_persist_log(
	State(state): State<Arc<AppState>>,
	Json(payload): Json<BatchPersistLogRequest>,
) -> impl IntoResponse {
	batch_persist_impl(state, payload).await
}

pub async fn list_logs(
	State(state): State<Arc<AppState>>,
	Query(query): Query<ListLogsQuery>,
) -> impl IntoResponse {
	list_logs_impl(state, query).await
}

#[instrument(skip(state, payload))]
pub async fn persist_log_impl(
	state: Arc<AppState>,
	payload: PersistLogRequest,
) -> impl IntoResponse {
	let Some(wire) = payload.log else {
		return error_response(
			StatusCode::BAD_REQUEST,
			"missing_log",
			"Request must contain a log",
		)
		.into_response();
	};

	let wire_id = wire.id.clone();
	let record = match LogRecord::try_from(wire) {
		Ok(record) => record,
		Err(e) => {
			return outcome_response(wire_id, PersistOutcome::validation(e.to_string()))
				.into_response();
		}
	};

	match state.persistence.persist_log(&record).await {
		Ok(outcome) => outcome_response(record.id.to_string(), outcome).into_response(),
		Err(e) => {
			log_storage_failure(&e, 1, "persist log");
			outcome_response(
				record.id.to_string(),
				PersistOutcome::infrastructure("storage unavailable"),
			)
			.into_response()
		}
	}
}

#[instrument(skip(state, payload), fields(count = payload.logs.len()))]
pub async fn batch_persist_impl(
	state: Arc<AppState>,
	payload: BatchPersistLogRequest,
) -> impl IntoResponse {
	let mut results: Vec<Option<DispatchResult>> = vec![None; payload.logs.len()];
	let mut positions = Vec::with_capacity(payload.logs.len());
	let mut records = Vec::with_capacity(payload.logs.len());

	for (index, wire) in payload.logs.into_iter().enumerate() {
		let wire_id = wire.id.clone();
		match LogRecord::try_from(wire) {
			Ok(record) => {
				positions.push(index);
				records.push(record);
			}
			Err(e) => {
				results[index] = Some(DispatchResult {
					id: wire_id,
					success: false,
					reason: PersistOutcome::validation(e.to_string()).reason(),
				});
			}
		}
	}

	if !records.is_empty() {
		match state.persistence.batch_persist_log(&records).await {
			Ok(outcomes) => {
				for ((index, record), outcome) in positions.iter().zip(&records).zip(outcomes) {
					results[*index] = Some(DispatchResult::from_outcome(&record.id, &outcome));
				}
			}
			Err(e) => {
				log_storage_failure(&e, records.len(), "persist batch");
				return error_response(
					StatusCode::SERVICE_UNAVAILABLE,
					"storage_unavailable",
					"Failed to persist batch",
				)
				.into_response();
			}
		}
	}

	(
		StatusCode::OK,
		Json(BatchPersistLogResponse {
			results: results.into_iter().flatten().collect(),
		}),
	)
		.into_response()
}

fn search_query_from(query: ListLogsQuery) -> Result<SearchQuery, String> {
	let cursor = match (query.cursor_timestamp, query.cursor_id) {
		(Some(timestamp), Some(id)) => Some(LogCursor {
			timestamp,
			id: id
				.parse::<RecordId>()
				.map_err(|e| format!("cursor_id: {e}"))?,
		}),
		(None, None) => None,
		_ => return Err("cursor_timestamp and cursor_id must be given together".to_string()),
	};

	let affected_resources = query.affected_resources.map(|s| {
		s.split(',')
			.map(str::trim)
			.filter(|r| !r.is_empty())
			.map(String::from)
			.collect()
	});

	let metadata = match query.metadata {
		Some(raw) => match serde_json::from_str::<serde_json::Value>(&raw) {
			Ok(serde_json::Value::Object(map)) => Some(map),
			Ok(_) => return Err("metadata must be a JSON object".to_string()),
			Err(e) => return Err(format!("metadata: {e}")),
		},
		None => None,
	};

	Ok(SearchQuery {
		service_name: query.service_name,
		operation: query.operation,
		actor_id: query.actor_id,
		actor_type: query.actor_type,
		affected_resources,
		metadata,
		cursor,
		limit: query.limit,
	})
}

#[instrument(skip(state))]
pub async fn list_logs_impl(state: Arc<AppState>, query: ListLogsQuery) -> impl IntoResponse {
	let search = match search_query_from(query) {
		Ok(search) => search,
		Err(message) => {
			return error_response(StatusCode::BAD_REQUEST, "invalid_query", &message)
				.into_response();
		}
	};

	match state.persistence.search_logs(&search).await {
		Ok(page) => (
			StatusCode::OK,
			Json(ListLogsResponse {
				logs: page.logs.iter().map(WireLog::from).collect(),
				next_cursor: page.next_cursor.map(|c| WireCursor {
					timestamp: c.timestamp,
					id: c.id.to_string(),
				}),
			}),
		)
			.into_response(),
		Err(DbError::InvalidQuery(message)) => {
			error_response(StatusCode::BAD_REQUEST, "invalid_query", &message).into_response()
		}
		Err(e) => {
			log_storage_failure(&e, 0, "list logs");
			error_response(
				StatusCode::SERVICE_UNAVAILABLE,
				"storage_unavailable",
				"Failed to list logs",
			)
			.into_response()
		}
	}
}
