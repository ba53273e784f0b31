// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Idempotent storage of audit records keyed by record id.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use quill_common_core::{LogRecord, PersistOutcome, RecordId};
use sqlx::{sqlite::SqlitePool, Row};
use tracing::{debug, warn};

use crate::error::{DbError, Result};

pub const DEFAULT_LIMIT: u32 = 50;
pub const MAX_LIMIT: u32 = 1000;

/// Position after the last record of a page. Exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogCursor {
	pub timestamp: DateTime<Utc>,
	pub id: RecordId,
}

impl LogCursor {
	pub fn after(record: &LogRecord) -> Self {
		Self {
			timestamp: record.timestamp,
			id: record.id,
		}
	}
}

/// Filter over persisted records. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchQuery {
	pub service_name: Option<String>,
	pub operation: Option<String>,
	pub actor_id: Option<String>,
	pub actor_type: Option<String>,
	/// Must equal the stored list, order included.
	pub affected_resources: Option<Vec<String>>,
	/// Every key must be present in the stored metadata with an equal value.
	pub metadata: Option<serde_json::Map<String, serde_json::Value>>,
	pub cursor: Option<LogCursor>,
	pub limit: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LogPage {
	pub logs: Vec<LogRecord>,
	/// Present when more records follow this page.
	pub next_cursor: Option<LogCursor>,
}

#[async_trait]
pub trait LogPersistence: Send + Sync {
	/// Store one record. A second call with the same id reports
	/// [`PersistOutcome::AlreadyPersisted`] and leaves the stored row alone.
	async fn persist_log(&self, record: &LogRecord) -> Result<PersistOutcome>;

	/// Store each record independently. Outcomes are in input order.
	async fn batch_persist_log(&self, records: &[LogRecord]) -> Result<Vec<PersistOutcome>>;

	async fn list_logs(&self, cursor: Option<LogCursor>, limit: Option<u32>) -> Result<LogPage>;

	async fn search_logs(&self, query: &SearchQuery) -> Result<LogPage>;

	async fn count(&self) -> Result<u64>;

	async fn health_check(&self) -> Result<()>;
}

pub struct SqliteLogRepository {
	pool: SqlitePool,
}

/// Fixed-width UTC form so lexical order in SQLite equals time order.
pub(crate) fn format_timestamp(ts: &DateTime<Utc>) -> String {
	ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn validate(record: &LogRecord) -> Option<String> {
	if record.service_name.trim().is_empty() {
		return Some("service_name is required".to_string());
	}
	if record.operation.trim().is_empty() {
		return Some("operation is required".to_string());
	}
	None
}

fn metadata_path(key: &str) -> Result<String> {
	if key.contains('"') {
		return Err(DbError::InvalidQuery(format!(
			"metadata key {key:?} may not contain quotes"
		)));
	}
	Ok(format!("$.\"{key}\""))
}

impl SqliteLogRepository {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}

	pub fn pool(&self) -> &SqlitePool {
		&self.pool
	}

	async fn insert(&self, record: &LogRecord) -> Result<PersistOutcome> {
		if let Some(message) = validate(record) {
			return Ok(PersistOutcome::validation(message));
		}

		let affected_resources = match serde_json::to_string(&record.affected_resources) {
			Ok(s) => s,
			Err(e) => return Ok(PersistOutcome::validation(format!("affected_resources: {e}"))),
		};
		let metadata = match serde_json::to_string(&record.metadata) {
			Ok(s) => s,
			Err(e) => return Ok(PersistOutcome::validation(format!("metadata: {e}"))),
		};

		let result = sqlx::query(
			r#"
			INSERT INTO logs (id, timestamp, service_name, operation, actor_id, actor_type,
				affected_resources, metadata, integrity_hash, created_at)
			VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
			"#,
		)
		.bind(record.id.as_key())
		.bind(format_timestamp(&record.timestamp))
		.bind(&record.service_name)
		.bind(&record.operation)
		.bind(&record.actor_id)
		.bind(&record.actor_type)
		.bind(affected_resources)
		.bind(metadata)
		.bind(&record.integrity_hash)
		.bind(format_timestamp(&Utc::now()))
		.execute(&self.pool)
		.await;

		match result {
			Ok(_) => {
				debug!(record_id = %record.id, "log persisted");
				Ok(PersistOutcome::Persisted)
			}
			Err(sqlx::Error::Database(ref db_err)) if db_err.is_unique_violation() => {
				debug!(record_id = %record.id, "log already persisted");
				Ok(PersistOutcome::AlreadyPersisted)
			}
			Err(e) => {
				warn!(record_id = %record.id, error = %e, "failed to persist log");
				Err(e.into())
			}
		}
	}
}

fn record_from_row(row: &sqlx::sqlite::SqliteRow) -> Option<LogRecord> {
	let id_str: String = row.get("id");
	let id = match id_str.parse::<RecordId>() {
		Ok(id) => id,
		Err(e) => {
			warn!(id = %id_str, error = %e, "skipping stored log with invalid id");
			return None;
		}
	};

	let ts_str: String = row.get("timestamp");
	let timestamp = match DateTime::parse_from_rfc3339(&ts_str) {
		Ok(dt) => dt.with_timezone(&Utc),
		Err(e) => {
			warn!(record_id = %id, error = %e, "skipping stored log with invalid timestamp");
			return None;
		}
	};

	let resources_str: String = row.get("affected_resources");
	let metadata_str: String = row.get("metadata");
	let affected_resources = match serde_json::from_str(&resources_str) {
		Ok(resources) => resources,
		Err(e) => {
			warn!(record_id = %id, error = %e, "skipping stored log with invalid affected_resources");
			return None;
		}
	};
	let metadata = match serde_json::from_str(&metadata_str) {
		Ok(metadata) => metadata,
		Err(e) => {
			warn!(record_id = %id, error = %e, "skipping stored log with invalid metadata");
			return None;
		}
	};

	Some(LogRecord {
		id,
		timestamp,
		service_name: row.get("service_name"),
		operation: row.get("operation"),
		actor_id: row.get("actor_id"),
		actor_type: row.get("actor_type"),
		affected_resources,
		metadata,
		integrity_hash: row.get("integrity_hash"),
	})
}

#[async_trait]
impl LogPersistence for SqliteLogRepository {
	#[tracing::instrument(skip(self, record), fields(record_id = %record.id))]
	async fn persist_log(&self, record: &LogRecord) -> Result<PersistOutcome> {
		self.insert(record).await
	}

	#[tracing::instrument(skip(self, records), fields(count = records.len()))]
	async fn batch_persist_log(&self, records: &[LogRecord]) -> Result<Vec<PersistOutcome>> {
		let mut outcomes = Vec::with_capacity(records.len());
		for record in records {
			outcomes.push(self.insert(record).await?);
		}
		Ok(outcomes)
	}

	async fn list_logs(&self, cursor: Option<LogCursor>, limit: Option<u32>) -> Result<LogPage> {
		self.search_logs(&SearchQuery {
			cursor,
			limit,
			..Default::default()
		})
		.await
	}

	#[tracing::instrument(skip(self, query))]
	async fn search_logs(&self, query: &SearchQuery) -> Result<LogPage> {
		let limit = query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);

		let mut conditions = vec!["1=1".to_string()];
		let mut binds: Vec<String> = Vec::new();

		let exact = [
			("service_name", &query.service_name),
			("operation", &query.operation),
			("actor_id", &query.actor_id),
			("actor_type", &query.actor_type),
		];
		for (column, value) in exact {
			if let Some(v) = value {
				conditions.push(format!("{column} = ?"));
				binds.push(v.clone());
			}
		}

		if let Some(resources) = &query.affected_resources {
			conditions.push("affected_resources = ?".to_string());
			binds.push(serde_json::to_string(resources)?);
		}

		if let Some(metadata) = &query.metadata {
			for (key, value) in metadata {
				let path = metadata_path(key)?;
				if value.is_null() {
					conditions.push("json_type(metadata, ?) = 'null'".to_string());
					binds.push(path);
				} else {
					conditions.push("json_extract(metadata, ?) = json_extract(?, '$')".to_string());
					binds.push(path);
					binds.push(serde_json::to_string(value)?);
				}
			}
		}

		if let Some(cursor) = &query.cursor {
			let ts = format_timestamp(&cursor.timestamp);
			conditions.push("(timestamp < ? OR (timestamp = ? AND id < ?))".to_string());
			binds.push(ts.clone());
			binds.push(ts);
			binds.push(cursor.id.as_key());
		}

		let sql = format!(
			"SELECT id, timestamp, service_name, operation, actor_id, actor_type, \
			 affected_resources, metadata, integrity_hash \
			 FROM logs WHERE {} ORDER BY timestamp DESC, id DESC LIMIT ?",
			conditions.join(" AND ")
		);
		let mut data_query = sqlx::query(&sql);
		for value in &binds {
			data_query = data_query.bind(value);
		}
		data_query = data_query.bind(i64::from(limit) + 1);

		let rows = data_query.fetch_all(&self.pool).await?;
		let has_more = rows.len() > limit as usize;

		let logs: Vec<LogRecord> = rows
			.iter()
			.take(limit as usize)
			.filter_map(record_from_row)
			.collect();
		let next_cursor = if has_more {
			logs.last().map(LogCursor::after)
		} else {
			None
		};

		Ok(LogPage { logs, next_cursor })
	}

	async fn count(&self) -> Result<u64> {
		let row = sqlx::query("SELECT COUNT(*) AS cnt FROM logs")
			.fetch_one(&self.pool)
			.await?;
		let count: i64 = row.get("cnt");
		Ok(count as u64)
	}

	async fn health_check(&self) -> Result<()> {
		sqlx::query("SELECT 1").execute(&self.pool).await?;
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::pool::{create_memory_pool, run_migrations};
	use chrono::{Duration, TimeZone};
	use proptest::prelude::*;
	use serde_json::json;

	async fn make_repo() -> SqliteLogRepository {
		let pool = create_memory_pool().await.unwrap();
		run_migrations(&pool).await.unwrap();
		SqliteLogRepository::new(pool)
	}

	fn base_time() -> DateTime<Utc> {
		Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
	}

	fn record_at(offset_secs: i64) -> LogRecord {
		LogRecord::builder("Auditable", "demo_log_audit")
			.actor("demo_app", "user")
			.resource("logs")
			.timestamp(base_time() + Duration::seconds(offset_secs))
			.build()
	}

	#[tokio::test]
	async fn test_first_persist_then_already_persisted() {
		let repo = make_repo().await;
		let record = record_at(0);

		assert_eq!(
			repo.persist_log(&record).await.unwrap(),
			PersistOutcome::Persisted
		);
		assert_eq!(
			repo.persist_log(&record).await.unwrap(),
			PersistOutcome::AlreadyPersisted
		);
		assert_eq!(repo.count().await.unwrap(), 1);
	}

	#[tokio::test]
	async fn test_duplicate_id_keeps_original_row() {
		let repo = make_repo().await;
		let original = record_at(0);
		let mut altered = original.clone();
		altered.operation = "tampered".to_string();

		repo.persist_log(&original).await.unwrap();
		let outcome = repo.persist_log(&altered).await.unwrap();

		assert_eq!(outcome, PersistOutcome::AlreadyPersisted);
		let page = repo.list_logs(None, None).await.unwrap();
		assert_eq!(page.logs.len(), 1);
		assert_eq!(page.logs[0].operation, "demo_log_audit");
	}

	#[tokio::test]
	async fn test_persisted_record_is_visible_immediately() {
		let repo = make_repo().await;
		let record = record_at(0);

		repo.persist_log(&record).await.unwrap();
		let page = repo.list_logs(None, None).await.unwrap();

		assert_eq!(page.logs, vec![record]);
		assert!(page.next_cursor.is_none());
	}

	#[tokio::test]
	async fn test_empty_service_name_is_validation_error() {
		let repo = make_repo().await;
		let mut record = record_at(0);
		record.service_name = String::new();

		let outcome = repo.persist_log(&record).await.unwrap();

		assert!(matches!(outcome, PersistOutcome::ValidationError { .. }));
		assert_eq!(repo.count().await.unwrap(), 0);
	}

	#[tokio::test]
	async fn test_batch_outcomes_in_input_order() {
		let repo = make_repo().await;
		let existing = record_at(0);
		repo.persist_log(&existing).await.unwrap();
		let fresh = record_at(1);
		let mut invalid = record_at(2);
		invalid.operation = String::new();

		let outcomes = repo
			.batch_persist_log(&[fresh.clone(), existing.clone(), invalid])
			.await
			.unwrap();

		assert_eq!(outcomes.len(), 3);
		assert_eq!(outcomes[0], PersistOutcome::Persisted);
		assert_eq!(outcomes[1], PersistOutcome::AlreadyPersisted);
		assert!(matches!(outcomes[2], PersistOutcome::ValidationError { .. }));
		assert_eq!(repo.count().await.unwrap(), 2);
	}

	#[tokio::test]
	async fn test_batch_with_duplicate_ids_in_same_call() {
		let repo = make_repo().await;
		let record = record_at(0);

		let outcomes = repo
			.batch_persist_log(&[record.clone(), record.clone()])
			.await
			.unwrap();

		assert_eq!(
			outcomes,
			vec![PersistOutcome::Persisted, PersistOutcome::AlreadyPersisted]
		);
	}

	#[tokio::test]
	async fn test_empty_batch() {
		let repo = make_repo().await;
		assert!(repo.batch_persist_log(&[]).await.unwrap().is_empty());
	}

	#[tokio::test]
	async fn test_closed_pool_is_transient_infrastructure_error() {
		let repo = make_repo().await;
		repo.pool().close().await;

		let err = repo.persist_log(&record_at(0)).await.unwrap_err();
		assert!(err.is_transient());
		assert!(repo.batch_persist_log(&[record_at(1)]).await.is_err());
	}

	#[tokio::test]
	async fn test_list_orders_newest_first_and_paginates() {
		let repo = make_repo().await;
		let records: Vec<_> = (0..5).map(record_at).collect();
		for r in &records {
			repo.persist_log(r).await.unwrap();
		}

		let first = repo.list_logs(None, Some(2)).await.unwrap();
		let ids: Vec<_> = first.logs.iter().map(|r| r.id).collect();
		assert_eq!(ids, vec![records[4].id, records[3].id]);
		let cursor = first.next_cursor.unwrap();

		let second = repo.list_logs(Some(cursor), Some(2)).await.unwrap();
		let ids: Vec<_> = second.logs.iter().map(|r| r.id).collect();
		assert_eq!(ids, vec![records[2].id, records[1].id]);

		let third = repo
			.list_logs(second.next_cursor, Some(2))
			.await
			.unwrap();
		assert_eq!(third.logs.len(), 1);
		assert_eq!(third.logs[0].id, records[0].id);
		assert!(third.next_cursor.is_none());
	}

	#[tokio::test]
	async fn test_cursor_breaks_timestamp_ties_by_id() {
		let repo = make_repo().await;
		let mut records: Vec<_> = (0..4).map(|_| record_at(0)).collect();
		for r in &records {
			repo.persist_log(r).await.unwrap();
		}
		records.sort_by(|a, b| b.id.as_key().cmp(&a.id.as_key()));

		let mut seen = Vec::new();
		let mut cursor = None;
		loop {
			let page = repo.list_logs(cursor, Some(1)).await.unwrap();
			seen.extend(page.logs.iter().map(|r| r.id));
			match page.next_cursor {
				Some(next) => cursor = Some(next),
				None => break,
			}
		}

		let expected: Vec<_> = records.iter().map(|r| r.id).collect();
		assert_eq!(seen, expected);
	}

	#[tokio::test]
	async fn test_search_filters() {
		let repo = make_repo().await;
		let login = LogRecord::builder("auth", "login")
			.actor("alice", "user")
			.resources(["session", "user:alice"])
			.meta("ip", json!("10.0.0.1"))
			.meta("attempts", json!(1))
			.timestamp(base_time())
			.build();
		let logout = LogRecord::builder("auth", "logout")
			.actor("bob", "user")
			.resource("session")
			.meta("ip", json!("10.0.0.2"))
			.timestamp(base_time() + Duration::seconds(1))
			.build();
		let deploy = LogRecord::builder("deployer", "deploy")
			.actor("ci", "service")
			.resource("app")
			.timestamp(base_time() + Duration::seconds(2))
			.build();
		for r in [&login, &logout, &deploy] {
			repo.persist_log(r).await.unwrap();
		}

		let ids = |page: LogPage| page.logs.into_iter().map(|r| r.id).collect::<Vec<_>>();

		let by_service = SearchQuery {
			service_name: Some("auth".to_string()),
			..Default::default()
		};
		assert_eq!(
			ids(repo.search_logs(&by_service).await.unwrap()),
			vec![logout.id, login.id]
		);

		let by_actor_type = SearchQuery {
			actor_type: Some("service".to_string()),
			..Default::default()
		};
		assert_eq!(
			ids(repo.search_logs(&by_actor_type).await.unwrap()),
			vec![deploy.id]
		);

		let by_resources = SearchQuery {
			affected_resources: Some(vec!["session".to_string()]),
			..Default::default()
		};
		assert_eq!(
			ids(repo.search_logs(&by_resources).await.unwrap()),
			vec![logout.id]
		);

		let mut meta = serde_json::Map::new();
		meta.insert("ip".to_string(), json!("10.0.0.1"));
		meta.insert("attempts".to_string(), json!(1));
		let by_metadata = SearchQuery {
			metadata: Some(meta),
			..Default::default()
		};
		assert_eq!(
			ids(repo.search_logs(&by_metadata).await.unwrap()),
			vec![login.id]
		);

		let combined = SearchQuery {
			service_name: Some("auth".to_string()),
			actor_id: Some("carol".to_string()),
			..Default::default()
		};
		assert!(repo.search_logs(&combined).await.unwrap().logs.is_empty());
	}

	#[tokio::test]
	async fn test_metadata_key_with_quote_rejected() {
		let repo = make_repo().await;
		let mut meta = serde_json::Map::new();
		meta.insert("bad\"key".to_string(), json!(1));

		let result = repo
			.search_logs(&SearchQuery {
				metadata: Some(meta),
				..Default::default()
			})
			.await;
		assert!(matches!(result, Err(DbError::InvalidQuery(_))));
	}

	#[tokio::test]
	async fn test_row_with_corrupt_json_is_skipped() {
		let repo = make_repo().await;
		let good = record_at(0);
		let corrupt = record_at(1);
		repo.persist_log(&good).await.unwrap();
		repo.persist_log(&corrupt).await.unwrap();
		sqlx::query("UPDATE logs SET metadata = 'not json' WHERE id = ?")
			.bind(corrupt.id.as_key())
			.execute(repo.pool())
			.await
			.unwrap();

		let page = repo.list_logs(None, None).await.unwrap();

		assert_eq!(page.logs, vec![good]);
	}

	#[tokio::test]
	async fn test_limit_is_capped() {
		let repo = make_repo().await;
		for i in 0..3 {
			repo.persist_log(&record_at(i)).await.unwrap();
		}

		let page = repo.list_logs(None, Some(50_000)).await.unwrap();
		assert_eq!(page.logs.len(), 3);
		let page = repo.list_logs(None, Some(0)).await.unwrap();
		assert_eq!(page.logs.len(), 1);
	}

	#[tokio::test]
	async fn test_concurrent_persist_of_same_id_stores_once() {
		let repo = std::sync::Arc::new(make_repo().await);
		let record = record_at(0);

		let tasks = (0..10).map(|_| {
			let repo = repo.clone();
			let record = record.clone();
			tokio::spawn(async move { repo.persist_log(&record).await })
		});
		let outcomes: Vec<_> = futures::future::join_all(tasks)
			.await
			.into_iter()
			.map(|r| r.unwrap().unwrap())
			.collect();

		let persisted = outcomes
			.iter()
			.filter(|o| **o == PersistOutcome::Persisted)
			.count();
		assert_eq!(persisted, 1);
		assert!(outcomes.iter().all(|o| o.is_acknowledged()));
		assert_eq!(repo.count().await.unwrap(), 1);
	}

	proptest! {
		#[test]
		fn prop_timestamp_format_sorts_like_time(a in 0i64..4_000_000_000_000_000, b in 0i64..4_000_000_000_000_000) {
			let ta = Utc.timestamp_micros(a).unwrap();
			let tb = Utc.timestamp_micros(b).unwrap();
			prop_assert_eq!(format_timestamp(&ta).cmp(&format_timestamp(&tb)), ta.cmp(&tb));
		}
	}
}
