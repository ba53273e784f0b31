// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Flush orchestration.
//!
//! A flush takes a snapshot of the outbox and hands it to the dispatcher.
//! Cycles never overlap: the periodic timer skips a tick while a cycle is in
//! flight, and an explicit flush waits for the running cycle to finish.

use std::sync::Arc;
use std::time::Duration;

use quill_agent_outbox::Outbox;
use tokio::sync::{watch, Mutex};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::dispatch::{DispatchSummary, Dispatcher};

/// What a single flush cycle did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushReport {
	/// Nothing was buffered.
	Empty,
	Completed(DispatchSummary),
	/// Another cycle was already running.
	Skipped,
	/// The cycle hit its deadline. Unacknowledged records stay buffered.
	TimedOut,
	/// The outbox could not be read.
	Failed,
}

pub struct FlushOrchestrator {
	outbox: Arc<Outbox>,
	dispatcher: Dispatcher,
	flush_lock: Mutex<()>,
	cycle_timeout: Duration,
}

impl FlushOrchestrator {
	pub fn new(outbox: Arc<Outbox>, dispatcher: Dispatcher, cycle_timeout: Duration) -> Self {
		Self {
			outbox,
			dispatcher,
			flush_lock: Mutex::new(()),
			cycle_timeout,
		}
	}

	/// Run one cycle, waiting for any cycle already in flight.
	pub async fn flush(&self) -> FlushReport {
		let _guard = self.flush_lock.lock().await;
		self.flush_locked().await
	}

	/// Run one cycle unless another is in flight.
	pub async fn try_flush(&self) -> FlushReport {
		match self.flush_lock.try_lock() {
			Ok(_guard) => self.flush_locked().await,
			Err(_) => {
				debug!("flush already in progress, skipping");
				FlushReport::Skipped
			}
		}
	}

	async fn flush_locked(&self) -> FlushReport {
		let entries = match self.outbox.snapshot().await {
			Ok(entries) => entries,
			Err(e) => {
				error!(error = %e, "Failed to read outbox");
				return FlushReport::Failed;
			}
		};
		if entries.is_empty() {
			return FlushReport::Empty;
		}

		let count = entries.len();
		match tokio::time::timeout(self.cycle_timeout, self.dispatcher.dispatch(entries)).await {
			Ok(summary) => {
				debug!(
					count,
					persisted = summary.persisted,
					already_persisted = summary.already_persisted,
					retained = summary.retained(),
					"flush cycle complete"
				);
				FlushReport::Completed(summary)
			}
			Err(_) => {
				warn!(
					count,
					timeout_ms = self.cycle_timeout.as_millis() as u64,
					"Flush cycle exceeded its deadline"
				);
				FlushReport::TimedOut
			}
		}
	}

	/// Flush every `interval` until `shutdown` flips to true.
	///
	/// The final flush on shutdown is left to the caller.
	pub async fn run(&self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
		info!(
			flush_interval_secs = interval.as_secs(),
			dispatch_mode = %self.dispatcher.mode(),
			"Starting flush loop"
		);

		let mut ticker = tokio::time::interval(interval);
		ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
		ticker.tick().await;

		loop {
			tokio::select! {
				_ = ticker.tick() => {
					self.try_flush().await;
				}
				changed = shutdown.changed() => {
					if changed.is_err() || *shutdown.borrow() {
						break;
					}
				}
			}
		}

		info!("Flush loop stopped");
	}
}
