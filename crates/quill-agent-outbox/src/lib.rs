// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Durable outbox for audit records that the collector has not yet
//! acknowledged.
//!
//! Records are stored in a local SQLite database keyed by record id. An entry
//! is written once, never modified, and removed only after the collector has
//! confirmed the record is durably stored. Anything still in the outbox after
//! a crash is picked up again by the next flush.

mod error;

use std::path::Path;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use quill_common_core::{codec, LogRecord, RecordId};
use sqlx::sqlite::{
	SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::Row;
use tracing::{debug, warn};

pub use error::{OutboxError, Result};

/// A staged record as read from the outbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboxEntry {
	pub id: RecordId,
	pub payload: Vec<u8>,
}

impl OutboxEntry {
	/// Decode the stored payload.
	pub fn record(&self) -> Result<LogRecord> {
		Ok(codec::decode(&self.payload)?)
	}
}

pub struct Outbox {
	pool: SqlitePool,
	closed: AtomicBool,
}

impl Outbox {
	/// Open (or create) the outbox database at `path`.
	#[tracing::instrument(skip(path), fields(path = %path.as_ref().display()))]
	pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
		let path = path.as_ref();
		if path.as_os_str().is_empty() {
			return Err(OutboxError::InvalidPath("empty path".to_string()));
		}
		if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
			if !parent.exists() {
				return Err(OutboxError::InvalidPath(format!(
					"directory {} does not exist",
					parent.display()
				)));
			}
		}

		let options = SqliteConnectOptions::new()
			.filename(path)
			.journal_mode(SqliteJournalMode::Wal)
			.synchronous(SqliteSynchronous::Full)
			.create_if_missing(true);

		let pool = SqlitePoolOptions::new()
			.max_connections(4)
			.connect_with(options)
			.await?;

		let outbox = Self::from_pool(pool).await?;
		debug!("outbox opened");
		Ok(outbox)
	}

	/// Open a non-persistent outbox backed by an in-memory database.
	pub async fn open_in_memory() -> Result<Self> {
		let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
		let pool = SqlitePoolOptions::new()
			.max_connections(1)
			.idle_timeout(None)
			.max_lifetime(None)
			.connect_with(options)
			.await?;
		Self::from_pool(pool).await
	}

	async fn from_pool(pool: SqlitePool) -> Result<Self> {
		sqlx::query(
			r#"
			CREATE TABLE IF NOT EXISTS outbox (
				seq INTEGER PRIMARY KEY AUTOINCREMENT,
				id TEXT NOT NULL UNIQUE,
				payload BLOB NOT NULL,
				enqueued_at TEXT NOT NULL
			)
			"#,
		)
		.execute(&pool)
		.await?;

		Ok(Self {
			pool,
			closed: AtomicBool::new(false),
		})
	}

	fn check_closed(&self) -> Result<()> {
		if self.closed.load(Ordering::SeqCst) {
			return Err(OutboxError::Closed);
		}
		Ok(())
	}

	/// Stage a record. Either the whole record is stored or nothing is.
	///
	/// Staging an id that is already present is a no-op.
	#[tracing::instrument(skip(self, record), fields(record_id = %record.id))]
	pub async fn put(&self, record: &LogRecord) -> Result<()> {
		self.check_closed()?;
		let payload = codec::encode(record)?;

		let mut tx = self.pool.begin().await?;
		let result = sqlx::query(
			r#"
			INSERT OR IGNORE INTO outbox (id, payload, enqueued_at)
			VALUES (?, ?, ?)
			"#,
		)
		.bind(record.id.as_key())
		.bind(payload)
		.bind(Utc::now().to_rfc3339())
		.execute(&mut *tx)
		.await?;
		tx.commit().await?;

		if result.rows_affected() == 0 {
			debug!("record already staged");
		}
		Ok(())
	}

	/// Remove an acknowledged record. Removing a missing id is not an error.
	#[tracing::instrument(skip(self), fields(record_id = %id))]
	pub async fn delete(&self, id: &RecordId) -> Result<()> {
		self.check_closed()?;
		sqlx::query("DELETE FROM outbox WHERE id = ?")
			.bind(id.as_key())
			.execute(&self.pool)
			.await?;
		Ok(())
	}

	/// Read every staged entry as of this moment, oldest first.
	///
	/// The result is fully materialized, so entries staged or deleted while the
	/// caller works through it neither appear nor disturb iteration.
	pub async fn snapshot(&self) -> Result<Vec<OutboxEntry>> {
		self.check_closed()?;
		let rows = sqlx::query("SELECT id, payload FROM outbox ORDER BY seq ASC")
			.fetch_all(&self.pool)
			.await?;

		let entries = rows
			.into_iter()
			.filter_map(|row| {
				let key: String = row.get("id");
				match key.parse::<RecordId>() {
					Ok(id) => Some(OutboxEntry {
						id,
						payload: row.get("payload"),
					}),
					Err(e) => {
						warn!(key = %key, error = %e, "skipping outbox entry with unreadable id");
						None
					}
				}
			})
			.collect();

		Ok(entries)
	}

	pub async fn contains(&self, id: &RecordId) -> Result<bool> {
		self.check_closed()?;
		let row = sqlx::query("SELECT EXISTS(SELECT 1 FROM outbox WHERE id = ?) AS present")
			.bind(id.as_key())
			.fetch_one(&self.pool)
			.await?;
		let present: i64 = row.get("present");
		Ok(present != 0)
	}

	pub async fn len(&self) -> Result<u64> {
		self.check_closed()?;
		let row = sqlx::query("SELECT COUNT(*) AS cnt FROM outbox")
			.fetch_one(&self.pool)
			.await?;
		let count: i64 = row.get("cnt");
		Ok(count as u64)
	}

	pub async fn is_empty(&self) -> Result<bool> {
		Ok(self.len().await? == 0)
	}

	pub fn is_closed(&self) -> bool {
		self.closed.load(Ordering::SeqCst)
	}

	/// Close the underlying store. Later operations return [`OutboxError::Closed`].
	pub async fn close(&self) {
		if self.closed.swap(true, Ordering::SeqCst) {
			return;
		}
		self.pool.close().await;
		debug!("outbox closed");
	}
}
