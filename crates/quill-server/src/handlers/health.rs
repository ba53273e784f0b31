// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

use super::error_response;
use crate::AppState;

pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
	match state.persistence.health_check().await {
		Ok(()) => (StatusCode::OK, Json(json!({ "status": "healthy" }))).into_response(),
		Err(e) => {
			tracing::warn!(error = %e, "Health check failed");
			error_response(
				StatusCode::SERVICE_UNAVAILABLE,
				"storage_unavailable",
				"Storage is unavailable",
			)
			.into_response()
		}
	}
}
