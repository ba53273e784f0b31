// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Quill collector HTTP server.

pub mod handlers;

use std::sync::Arc;

use axum::{
	extract::DefaultBodyLimit,
	routing::{get, post},
	Router,
};
use quill_common_api::routes;
use quill_server_db::LogPersistence;
use tower_http::trace::TraceLayer;

/// Large enough for a full batch of records with generous metadata.
const MAX_BODY_BYTES: usize = 32 * 1024 * 1024;

pub struct AppState {
	pub persistence: Arc<dyn LogPersistence>,
}

impl AppState {
	pub fn new(persistence: Arc<dyn LogPersistence>) -> Self {
		Self { persistence }
	}
}

pub fn create_router(state: Arc<AppState>) -> Router {
	Router::new()
		.route(routes::HEALTH, get(handlers::health::health))
		.route(
			routes::LOGS,
			post(handlers::logs::persist_log).get(handlers::logs::list_logs),
		)
		.route(routes::LOGS_BATCH, post(handlers::logs::batch_persist_log))
		.layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
		.layer(TraceLayer::new_for_http())
		.with_state(state)
}
