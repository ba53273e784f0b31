// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Collector client used by the dispatcher.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use quill_common_api::{
	routes, ApiErrorResponse, BatchPersistLogRequest, BatchPersistLogResponse, PersistLogRequest,
	PersistLogResponse, WireLog,
};
use quill_common_core::{DispatchResult, ErrorCode, ErrorReason, LogRecord};
use reqwest::{Client, StatusCode};
use thiserror::Error;
use tracing::debug;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Error, Debug)]
pub enum ClientError {
	#[error("HTTP error: {0}")]
	Http(#[from] reqwest::Error),

	#[error("server returned error: {status} - {body}")]
	ServerError { status: u16, body: String },

	#[error("invalid response: {0}")]
	InvalidResponse(String),

	#[error("client is closed")]
	Closed,
}

impl ClientError {
	/// Whether retrying the same request later could succeed.
	pub fn is_transient(&self) -> bool {
		match self {
			ClientError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
			ClientError::ServerError { status, .. } => {
				*status >= 500 || *status == 429 || *status == 408
			}
			ClientError::InvalidResponse(_) | ClientError::Closed => false,
		}
	}
}

pub type Result<T> = std::result::Result<T, ClientError>;

/// Remote ingestion endpoint as seen by the agent.
#[async_trait]
pub trait CollectorClient: Send + Sync {
	/// Deliver one record.
	async fn persist_log(&self, record: &LogRecord) -> Result<DispatchResult>;

	/// Deliver many records in one call. Results are correlated by id.
	async fn batch_persist_log(&self, records: &[LogRecord]) -> Result<Vec<DispatchResult>>;

	/// Release the connection. Later calls fail with [`ClientError::Closed`].
	async fn close(&self) {}
}

/// HTTP client for the collector's ingestion API.
pub struct HttpCollectorClient {
	client: Client,
	base_url: String,
	closed: AtomicBool,
}

impl HttpCollectorClient {
	pub fn new(base_url: &str, request_timeout: Duration) -> Result<Self> {
		let client = Client::builder()
			.timeout(request_timeout)
			.connect_timeout(CONNECT_TIMEOUT.min(request_timeout))
			.build()?;

		Ok(Self {
			client,
			base_url: base_url.trim_end_matches('/').to_string(),
			closed: AtomicBool::new(false),
		})
	}

	pub fn base_url(&self) -> &str {
		&self.base_url
	}

	fn check_closed(&self) -> Result<()> {
		if self.closed.load(Ordering::SeqCst) {
			return Err(ClientError::Closed);
		}
		Ok(())
	}

	fn url(&self, path: &str) -> String {
		format!("{}{}", self.base_url, path)
	}

	pub async fn is_server_reachable(&self) -> bool {
		match self
			.client
			.get(self.url(routes::HEALTH))
			.timeout(HEALTH_TIMEOUT)
			.send()
			.await
		{
			Ok(resp) => resp.status().is_success(),
			Err(_) => false,
		}
	}
}

#[async_trait]
impl CollectorClient for HttpCollectorClient {
	async fn persist_log(&self, record: &LogRecord) -> Result<DispatchResult> {
		self.check_closed()?;

		let body = PersistLogRequest {
			log: Some(WireLog::from(record)),
		};
		let response = self
			.client
			.post(self.url(routes::LOGS))
			.json(&body)
			.send()
			.await?;
		let status = response.status();

		match status {
			s if s.is_success()
				|| s == StatusCode::CONFLICT
				|| s == StatusCode::UNPROCESSABLE_ENTITY =>
			{
				let reply: PersistLogResponse = response
					.json()
					.await
					.map_err(|e| ClientError::InvalidResponse(e.to_string()))?;
				if reply.id != record.id.to_string() {
					return Err(ClientError::InvalidResponse(format!(
						"reply for {} does not match record {}",
						reply.id, record.id
					)));
				}
				debug!(record_id = %record.id, outcome = %reply.outcome, "collector replied");
				Ok(reply.into_result())
			}
			StatusCode::BAD_REQUEST => {
				let message = response
					.json::<ApiErrorResponse>()
					.await
					.map(|e| e.message)
					.unwrap_or_else(|_| "bad request".to_string());
				Ok(DispatchResult {
					id: record.id.to_string(),
					success: false,
					reason: Some(ErrorReason::new(ErrorCode::ValidationFailed, message)),
				})
			}
			_ => {
				let body = response.text().await.unwrap_or_default();
				Err(ClientError::ServerError {
					status: status.as_u16(),
					body,
				})
			}
		}
	}

	async fn batch_persist_log(&self, records: &[LogRecord]) -> Result<Vec<DispatchResult>> {
		self.check_closed()?;
		if records.is_empty() {
			return Ok(Vec::new());
		}

		let body = BatchPersistLogRequest {
			logs: records.iter().map(WireLog::from).collect(),
		};
		let response = self
			.client
			.post(self.url(routes::LOGS_BATCH))
			.json(&body)
			.send()
			.await?;
		let status = response.status();

		if !status.is_success() {
			let body = response.text().await.unwrap_or_default();
			return Err(ClientError::ServerError {
				status: status.as_u16(),
				body,
			});
		}

		let reply: BatchPersistLogResponse = response
			.json()
			.await
			.map_err(|e| ClientError::InvalidResponse(e.to_string()))?;
		Ok(reply.results)
	}

	async fn close(&self) {
		if !self.closed.swap(true, Ordering::SeqCst) {
			debug!(base_url = %self.base_url, "collector client closed");
		}
	}
}
