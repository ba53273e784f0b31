// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Dispatch strategies and outbox reconciliation.
//!
//! Both strategies share one rule: an entry leaves the outbox only when the
//! collector reports it persisted or already persisted. Everything else stays
//! buffered for the next flush cycle.

use std::collections::HashMap;
use std::ops::Range;
use std::sync::Arc;

use quill_agent_outbox::{Outbox, OutboxEntry};
use quill_common_core::{DispatchResult, LogRecord, PersistOutcome, RecordId};
use quill_config::{DispatchMode, DEFAULT_MAX_BATCH_BYTES};
use tracing::{debug, error, warn};

use crate::client::{ClientError, CollectorClient};

/// Counters for one dispatch pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSummary {
	pub attempted: usize,
	pub persisted: usize,
	pub already_persisted: usize,
	pub rejected: usize,
	pub failed: usize,
	pub unanswered: usize,
	pub undecodable: usize,
	pub deleted: usize,
}

impl DispatchSummary {
	pub fn acknowledged(&self) -> usize {
		self.persisted + self.already_persisted
	}

	pub fn retained(&self) -> usize {
		self.attempted + self.undecodable - self.deleted
	}
}

pub struct Dispatcher {
	mode: DispatchMode,
	max_batch_size: usize,
	max_batch_bytes: usize,
	client: Arc<dyn CollectorClient>,
	outbox: Arc<Outbox>,
}

impl Dispatcher {
	pub fn new(
		mode: DispatchMode,
		max_batch_size: usize,
		client: Arc<dyn CollectorClient>,
		outbox: Arc<Outbox>,
	) -> Self {
		Self {
			mode,
			max_batch_size: max_batch_size.max(1),
			max_batch_bytes: DEFAULT_MAX_BATCH_BYTES,
			client,
			outbox,
		}
	}

	/// Bound the encoded size of each batch request.
	pub fn with_max_batch_bytes(mut self, max_batch_bytes: usize) -> Self {
		self.max_batch_bytes = max_batch_bytes.max(1);
		self
	}

	pub fn mode(&self) -> DispatchMode {
		self.mode
	}

	/// Send the given outbox entries and delete the acknowledged ones.
	pub async fn dispatch(&self, entries: Vec<OutboxEntry>) -> DispatchSummary {
		let mut summary = DispatchSummary::default();

		let mut records = Vec::with_capacity(entries.len());
		let mut sizes = Vec::with_capacity(entries.len());
		for entry in entries {
			match entry.record() {
				Ok(record) => {
					records.push(record);
					sizes.push(entry.payload.len());
				}
				Err(e) => {
					warn!(record_id = %entry.id, error = %e, "Undecodable outbox entry left in place");
					summary.undecodable += 1;
				}
			}
		}
		summary.attempted = records.len();

		match self.mode {
			DispatchMode::Batch => self.dispatch_batch(&records, &sizes, &mut summary).await,
			DispatchMode::Individual => self.dispatch_individual(&records, &mut summary).await,
		}

		summary
	}

	/// Split records into consecutive chunks bounded by count and encoded
	/// size. A record larger than the byte bound travels alone.
	fn chunk_ranges(&self, sizes: &[usize]) -> Vec<Range<usize>> {
		let mut ranges = Vec::new();
		let mut start = 0;
		let mut bytes = 0;
		for (index, size) in sizes.iter().enumerate() {
			// One byte for the separator between array elements.
			let size = size + 1;
			let count = index - start;
			if count > 0 && (count >= self.max_batch_size || bytes + size > self.max_batch_bytes) {
				ranges.push(start..index);
				start = index;
				bytes = 0;
			}
			bytes += size;
		}
		if start < sizes.len() {
			ranges.push(start..sizes.len());
		}
		ranges
	}

	async fn dispatch_batch(
		&self,
		records: &[LogRecord],
		sizes: &[usize],
		summary: &mut DispatchSummary,
	) {
		for range in self.chunk_ranges(sizes) {
			let chunk = &records[range];
			let results = match self.client.batch_persist_log(chunk).await {
				Ok(results) => results,
				Err(e) if chunk.len() > 1 && is_chunk_rejection(&e) => {
					warn!(
						error = %e,
						count = chunk.len(),
						"Collector rejected batch, sending its records individually"
					);
					self.dispatch_individual(chunk, summary).await;
					continue;
				}
				Err(e) => {
					log_transport_failure(&e, None, chunk.len());
					summary.failed += chunk.len();
					continue;
				}
			};

			let mut by_id: HashMap<RecordId, DispatchResult> = HashMap::with_capacity(results.len());
			for result in results {
				match result.record_id() {
					Some(id) => {
						by_id.insert(id, result);
					}
					None => warn!(id = %result.id, "Ignoring result with unparsable id"),
				}
			}

			for record in chunk {
				match by_id.remove(&record.id) {
					Some(result) => self.reconcile(&record.id, &result, summary).await,
					None => {
						debug!(record_id = %record.id, "No result for record, keeping it buffered");
						summary.unanswered += 1;
					}
				}
			}

			for stray in by_id.keys() {
				warn!(record_id = %stray, "Collector returned a result for a record not in this batch");
			}
		}
	}

	async fn dispatch_individual(&self, records: &[LogRecord], summary: &mut DispatchSummary) {
		for record in records {
			match self.client.persist_log(record).await {
				Ok(result) => self.reconcile(&record.id, &result, summary).await,
				Err(e) => {
					log_transport_failure(&e, Some(&record.id), 1);
					summary.failed += 1;
				}
			}
		}
	}

	async fn reconcile(&self, id: &RecordId, result: &DispatchResult, summary: &mut DispatchSummary) {
		match result.outcome() {
			PersistOutcome::Persisted => summary.persisted += 1,
			PersistOutcome::AlreadyPersisted => {
				debug!(record_id = %id, "Record was already persisted");
				summary.already_persisted += 1;
			}
			PersistOutcome::ValidationError { message } => {
				warn!(record_id = %id, reason = %message, "Collector rejected record, it will be retried");
				summary.rejected += 1;
				return;
			}
			PersistOutcome::InfrastructureError { message } => {
				warn!(record_id = %id, reason = %message, "Collector storage unavailable for record");
				summary.failed += 1;
				return;
			}
		}

		match self.outbox.delete(id).await {
			Ok(()) => {
				debug!(record_id = %id, "Persisted");
				summary.deleted += 1;
			}
			Err(e) => {
				warn!(record_id = %id, error = %e, "Failed to delete acknowledged record, it will be resent");
			}
		}
	}
}

/// The collector answered but refused the request as a whole, so the same
/// chunk would fail again on every cycle.
fn is_chunk_rejection(e: &ClientError) -> bool {
	!e.is_transient() && !matches!(e, ClientError::Closed)
}

fn log_transport_failure(e: &ClientError, record_id: Option<&RecordId>, count: usize) {
	let record_id = record_id.map(|id| id.to_string());
	let record_id = record_id.as_deref();
	if e.is_transient() {
		warn!(error = %e, record_id, count, "Dispatch failed, records stay buffered");
	} else {
		error!(
			error = %e,
			record_id,
			count,
			"Dispatch failed with a non-retryable error, records stay buffered"
		);
	}
}
