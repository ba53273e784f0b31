// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

pub mod health;
pub mod logs;

use axum::{http::StatusCode, response::IntoResponse, Json};
use quill_common_api::ApiErrorResponse;

pub(crate) fn error_response(status: StatusCode, error: &str, message: &str) -> impl IntoResponse {
	(status, Json(ApiErrorResponse::new(error, message)))
}
