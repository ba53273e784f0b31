// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The agent facade: capture into the outbox, periodic flushing, and the
//! ordered shutdown sequence.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use quill_agent_outbox::Outbox;
use quill_common_core::{LogRecord, RecordId};
use quill_config::{AgentConfig, DispatchMode};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::client::CollectorClient;
use crate::dispatch::Dispatcher;
use crate::error::{AgentError, Result};
use crate::flush::{FlushOrchestrator, FlushReport};

/// Runtime knobs for an [`Agent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgentSettings {
	pub flush_interval: Duration,
	pub request_timeout: Duration,
	pub dispatch_mode: DispatchMode,
	pub max_batch_size: usize,
	pub max_batch_bytes: usize,
}

impl Default for AgentSettings {
	fn default() -> Self {
		Self::from(&AgentConfig::default())
	}
}

impl From<&AgentConfig> for AgentSettings {
	fn from(config: &AgentConfig) -> Self {
		Self {
			flush_interval: config.flush_interval(),
			request_timeout: config.request_timeout(),
			dispatch_mode: config.dispatch_mode,
			max_batch_size: config.max_batch_size,
			max_batch_bytes: config.max_batch_bytes,
		}
	}
}

/// One audit event as handed to [`Agent::log`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LogSubmission {
	pub id: Option<RecordId>,
	pub timestamp: Option<DateTime<Utc>>,
	pub service_name: String,
	pub operation: String,
	pub actor_id: String,
	pub actor_type: String,
	pub affected_resources: Vec<String>,
	pub metadata: serde_json::Map<String, serde_json::Value>,
	pub integrity_hash: String,
}

impl LogSubmission {
	pub fn new(service_name: impl Into<String>, operation: impl Into<String>) -> Self {
		Self {
			service_name: service_name.into(),
			operation: operation.into(),
			..Default::default()
		}
	}

	fn into_record(self) -> LogRecord {
		let mut builder = LogRecord::builder(self.service_name, self.operation)
			.actor(self.actor_id, self.actor_type)
			.resources(self.affected_resources)
			.metadata(self.metadata)
			.integrity_hash(self.integrity_hash);
		if let Some(id) = self.id {
			builder = builder.id(id);
		}
		if let Some(timestamp) = self.timestamp {
			builder = builder.timestamp(timestamp);
		}
		builder.build()
	}
}

pub struct Agent {
	outbox: Arc<Outbox>,
	client: Arc<dyn CollectorClient>,
	orchestrator: Arc<FlushOrchestrator>,
	flush_interval: Duration,
	accepting: AtomicBool,
	shut_down: AtomicBool,
	shutdown_tx: watch::Sender<bool>,
	flush_task: Mutex<Option<JoinHandle<()>>>,
}

impl Agent {
	pub fn new(outbox: Arc<Outbox>, client: Arc<dyn CollectorClient>, settings: AgentSettings) -> Self {
		let dispatcher = Dispatcher::new(
			settings.dispatch_mode,
			settings.max_batch_size,
			client.clone(),
			outbox.clone(),
		)
		.with_max_batch_bytes(settings.max_batch_bytes);
		let orchestrator = Arc::new(FlushOrchestrator::new(
			outbox.clone(),
			dispatcher,
			settings.request_timeout,
		));
		let (shutdown_tx, _) = watch::channel(false);

		Self {
			outbox,
			client,
			orchestrator,
			flush_interval: settings.flush_interval,
			accepting: AtomicBool::new(true),
			shut_down: AtomicBool::new(false),
			shutdown_tx,
			flush_task: Mutex::new(None),
		}
	}

	/// Capture one event. Returns once the record is durable in the outbox.
	///
	/// Delivery to the collector happens later and never blocks the caller.
	pub async fn log(&self, submission: LogSubmission) -> Result<RecordId> {
		if !self.is_accepting() {
			return Err(AgentError::ShuttingDown);
		}
		if submission.service_name.trim().is_empty() {
			return Err(AgentError::InvalidRequest("service_name is required".to_string()));
		}
		if submission.operation.trim().is_empty() {
			return Err(AgentError::InvalidRequest("operation is required".to_string()));
		}

		let record = submission.into_record();
		let id = record.id;
		if let Err(e) = self.outbox.put(&record).await {
			error!(record_id = %id, error = %e, "Failed to capture audit record");
			return Err(e.into());
		}
		debug!(record_id = %id, operation = %record.operation, "audit record captured");
		Ok(id)
	}

	/// Start the periodic flush loop. Calling it again is a no-op.
	pub async fn start(&self) {
		let mut task = self.flush_task.lock().await;
		if task.is_some() || self.shut_down.load(Ordering::SeqCst) {
			return;
		}

		let orchestrator = self.orchestrator.clone();
		let interval = self.flush_interval;
		let shutdown_rx = self.shutdown_tx.subscribe();
		*task = Some(tokio::spawn(async move {
			orchestrator.run(interval, shutdown_rx).await;
		}));
	}

	/// Run a flush cycle now, waiting for any cycle in flight.
	pub async fn flush_now(&self) -> FlushReport {
		self.orchestrator.flush().await
	}

	pub async fn buffered(&self) -> Result<u64> {
		Ok(self.outbox.len().await?)
	}

	pub fn is_accepting(&self) -> bool {
		self.accepting.load(Ordering::SeqCst)
	}

	/// Stop accepting, stop the timer, flush once more, then release the
	/// collector client and the outbox, in that order.
	///
	/// Only the first call does anything; later calls return `None`.
	pub async fn shutdown(&self) -> Option<FlushReport> {
		if self.shut_down.swap(true, Ordering::SeqCst) {
			return None;
		}
		info!("Agent shutting down");
		self.accepting.store(false, Ordering::SeqCst);

		let _ = self.shutdown_tx.send(true);
		if let Some(handle) = self.flush_task.lock().await.take() {
			if let Err(e) = handle.await {
				warn!(error = %e, "Flush loop ended abnormally");
			}
		}

		let report = self.orchestrator.flush().await;
		match report {
			FlushReport::Completed(summary) if summary.retained() > 0 => {
				warn!(
					retained = summary.retained(),
					"Records still buffered at shutdown, they will be sent on next start"
				);
			}
			FlushReport::TimedOut | FlushReport::Failed => {
				warn!("Final flush did not complete, remaining records stay buffered");
			}
			_ => {}
		}

		self.client.close().await;
		self.outbox.close().await;
		info!("Agent stopped");
		Some(report)
	}
}
