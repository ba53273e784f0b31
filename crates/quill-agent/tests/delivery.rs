// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! End-to-end delivery scenarios between the agent and collector storage.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use quill_agent::client::Result as ClientResult;
use quill_agent::{
	Agent, AgentSettings, ClientError, CollectorClient, FlushReport, HttpCollectorClient,
	LogSubmission,
};
use quill_agent_outbox::Outbox;
use quill_common_core::{DispatchResult, LogRecord, RecordId};
use quill_config::{DispatchMode, DEFAULT_MAX_BATCH_BYTES};
use quill_server_db::{create_memory_pool, run_migrations, LogPersistence, SqliteLogRepository};
use serde_json::json;

/// Collector backed directly by the storage layer, with a switch to make it
/// unreachable.
struct InProcessCollector {
	repo: Arc<SqliteLogRepository>,
	reachable: AtomicBool,
	calls: AtomicUsize,
}

impl InProcessCollector {
	async fn new() -> Arc<Self> {
		let pool = create_memory_pool().await.unwrap();
		run_migrations(&pool).await.unwrap();
		Arc::new(Self {
			repo: Arc::new(SqliteLogRepository::new(pool)),
			reachable: AtomicBool::new(true),
			calls: AtomicUsize::new(0),
		})
	}

	fn set_reachable(&self, reachable: bool) {
		self.reachable.store(reachable, Ordering::SeqCst);
	}

	fn check(&self) -> ClientResult<()> {
		self.calls.fetch_add(1, Ordering::SeqCst);
		if !self.reachable.load(Ordering::SeqCst) {
			return Err(ClientError::ServerError {
				status: 503,
				body: "collector unreachable".to_string(),
			});
		}
		Ok(())
	}
}

fn storage_error(e: quill_server_db::DbError) -> ClientError {
	ClientError::ServerError {
		status: 503,
		body: e.to_string(),
	}
}

#[async_trait]
impl CollectorClient for InProcessCollector {
	async fn persist_log(&self, record: &LogRecord) -> ClientResult<DispatchResult> {
		self.check()?;
		let outcome = self.repo.persist_log(record).await.map_err(storage_error)?;
		Ok(DispatchResult::from_outcome(&record.id, &outcome))
	}

	async fn batch_persist_log(&self, records: &[LogRecord]) -> ClientResult<Vec<DispatchResult>> {
		self.check()?;
		let outcomes = self
			.repo
			.batch_persist_log(records)
			.await
			.map_err(storage_error)?;
		Ok(records
			.iter()
			.zip(outcomes)
			.map(|(r, o)| DispatchResult::from_outcome(&r.id, &o))
			.collect())
	}
}

fn settings(mode: DispatchMode) -> AgentSettings {
	AgentSettings {
		flush_interval: Duration::from_secs(3600),
		request_timeout: Duration::from_secs(5),
		dispatch_mode: mode,
		max_batch_size: 2,
		max_batch_bytes: DEFAULT_MAX_BATCH_BYTES,
	}
}

fn auditable() -> LogSubmission {
	let mut metadata = serde_json::Map::new();
	metadata.insert("request_id".to_string(), json!("req-42"));
	LogSubmission {
		actor_id: "demo_app".to_string(),
		actor_type: "user".to_string(),
		affected_resources: vec!["logs".to_string()],
		metadata,
		..LogSubmission::new("Auditable", "demo_log_audit")
	}
}

#[tokio::test]
async fn auditable_record_reaches_collector() {
	for mode in [DispatchMode::Batch, DispatchMode::Individual] {
		let collector = InProcessCollector::new().await;
		let outbox = Arc::new(Outbox::open_in_memory().await.unwrap());
		let agent = Agent::new(outbox.clone(), collector.clone(), settings(mode));

		let id = agent.log(auditable()).await.unwrap();
		let report = agent.flush_now().await;

		assert!(matches!(report, FlushReport::Completed(s) if s.persisted == 1), "mode {mode}");
		assert!(outbox.is_empty().await.unwrap());

		let page = collector.repo.list_logs(None, None).await.unwrap();
		assert_eq!(page.logs.len(), 1);
		let stored = &page.logs[0];
		assert_eq!(stored.id, id);
		assert_eq!(stored.service_name, "Auditable");
		assert_eq!(stored.operation, "demo_log_audit");
		assert_eq!(stored.actor_id, "demo_app");
		assert_eq!(stored.affected_resources, vec!["logs".to_string()]);
		assert_eq!(stored.metadata.get("request_id"), Some(&json!("req-42")));
	}
}

#[tokio::test]
async fn buffered_records_survive_restart() {
	let dir = tempfile::tempdir().unwrap();
	let path = dir.path().join("outbox.db");
	let collector = InProcessCollector::new().await;
	collector.set_reachable(false);

	let mut ids = Vec::new();
	{
		let outbox = Arc::new(Outbox::open(&path).await.unwrap());
		let agent = Agent::new(outbox, collector.clone(), settings(DispatchMode::Batch));
		for _ in 0..3 {
			ids.push(agent.log(auditable()).await.unwrap());
		}
		agent.shutdown().await;
	}
	assert_eq!(collector.repo.count().await.unwrap(), 0);

	collector.set_reachable(true);
	let outbox = Arc::new(Outbox::open(&path).await.unwrap());
	assert_eq!(outbox.len().await.unwrap(), 3);
	let agent = Agent::new(outbox.clone(), collector.clone(), settings(DispatchMode::Batch));
	agent.flush_now().await;

	assert!(outbox.is_empty().await.unwrap());
	let stored: Vec<RecordId> = collector
		.repo
		.list_logs(None, None)
		.await
		.unwrap()
		.logs
		.into_iter()
		.map(|r| r.id)
		.collect();
	for id in ids {
		assert!(stored.contains(&id));
	}
}

#[tokio::test]
async fn lost_acknowledgement_resolves_as_already_persisted() {
	for mode in [DispatchMode::Batch, DispatchMode::Individual] {
		let collector = InProcessCollector::new().await;
		let outbox = Arc::new(Outbox::open_in_memory().await.unwrap());
		let agent = Agent::new(outbox.clone(), collector.clone(), settings(mode));

		let id = agent.log(auditable()).await.unwrap();
		// The collector stored it but the agent never heard back.
		let staged = outbox.snapshot().await.unwrap();
		collector
			.repo
			.persist_log(&staged[0].record().unwrap())
			.await
			.unwrap();

		let report = agent.flush_now().await;

		assert!(
			matches!(report, FlushReport::Completed(s) if s.already_persisted == 1 && s.persisted == 0),
			"mode {mode}"
		);
		assert!(!outbox.contains(&id).await.unwrap());
		assert_eq!(collector.repo.count().await.unwrap(), 1);
	}
}

#[tokio::test]
async fn unreachable_collector_then_recovery() {
	for mode in [DispatchMode::Batch, DispatchMode::Individual] {
		let collector = InProcessCollector::new().await;
		collector.set_reachable(false);
		let outbox = Arc::new(Outbox::open_in_memory().await.unwrap());
		let agent = Agent::new(outbox.clone(), collector.clone(), settings(mode));
		for _ in 0..3 {
			agent.log(auditable()).await.unwrap();
		}

		for _ in 0..3 {
			agent.flush_now().await;
			assert_eq!(agent.buffered().await.unwrap(), 3, "mode {mode}");
		}

		collector.set_reachable(true);
		agent.flush_now().await;

		assert_eq!(agent.buffered().await.unwrap(), 0, "mode {mode}");
		assert_eq!(collector.repo.count().await.unwrap(), 3);
	}
}

#[tokio::test]
async fn rejected_record_stays_while_others_are_delivered() {
	let collector = InProcessCollector::new().await;
	let outbox = Arc::new(Outbox::open_in_memory().await.unwrap());
	let agent = Agent::new(
		outbox.clone(),
		collector.clone(),
		settings(DispatchMode::Batch),
	);

	agent.log(auditable()).await.unwrap();
	let invalid = LogRecord::builder("Auditable", "").build();
	outbox.put(&invalid).await.unwrap();
	agent.log(auditable()).await.unwrap();

	let report = agent.flush_now().await;

	assert!(matches!(report, FlushReport::Completed(s) if s.persisted == 2 && s.rejected == 1));
	assert_eq!(outbox.len().await.unwrap(), 1);
	assert!(outbox.contains(&invalid.id).await.unwrap());
}

#[tokio::test]
async fn duplicate_capture_is_delivered_once() {
	let collector = InProcessCollector::new().await;
	let outbox = Arc::new(Outbox::open_in_memory().await.unwrap());
	let agent = Agent::new(
		outbox.clone(),
		collector.clone(),
		settings(DispatchMode::Individual),
	);
	let id = RecordId::new();

	for _ in 0..2 {
		agent
			.log(LogSubmission {
				id: Some(id),
				..auditable()
			})
			.await
			.unwrap();
	}
	agent.flush_now().await;

	assert_eq!(collector.calls.load(Ordering::SeqCst), 1);
	assert_eq!(collector.repo.count().await.unwrap(), 1);
}

#[tokio::test]
async fn shutdown_delivers_pending_records() {
	let collector = InProcessCollector::new().await;
	let outbox = Arc::new(Outbox::open_in_memory().await.unwrap());
	let agent = Agent::new(
		outbox.clone(),
		collector.clone(),
		settings(DispatchMode::Batch),
	);
	agent.start().await;
	for _ in 0..5 {
		agent.log(auditable()).await.unwrap();
	}

	let report = agent.shutdown().await;

	assert!(matches!(report, Some(FlushReport::Completed(s)) if s.deleted == 5));
	assert_eq!(collector.repo.count().await.unwrap(), 5);
}

async fn spawn_collector() -> (String, Arc<SqliteLogRepository>) {
	let pool = create_memory_pool().await.unwrap();
	run_migrations(&pool).await.unwrap();
	let repo = Arc::new(SqliteLogRepository::new(pool));
	let state = Arc::new(quill_server::AppState::new(repo.clone()));
	let app = quill_server::create_router(state);

	let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
	let addr = listener.local_addr().unwrap();
	tokio::spawn(async move {
		axum::serve(listener, app).await.unwrap();
	});
	(format!("http://{addr}"), repo)
}

#[tokio::test]
async fn delivery_over_http() {
	for mode in [DispatchMode::Batch, DispatchMode::Individual] {
		let (url, repo) = spawn_collector().await;
		let client = Arc::new(HttpCollectorClient::new(&url, Duration::from_secs(5)).unwrap());
		assert!(client.is_server_reachable().await);

		let outbox = Arc::new(Outbox::open_in_memory().await.unwrap());
		let agent = Agent::new(outbox.clone(), client, settings(mode));
		let mut ids = Vec::new();
		for _ in 0..3 {
			ids.push(agent.log(auditable()).await.unwrap());
		}
		// Pretend one acknowledgement was lost before.
		let staged = outbox.snapshot().await.unwrap();
		repo.persist_log(&staged[0].record().unwrap()).await.unwrap();

		let report = agent.flush_now().await;

		assert!(
			matches!(report, FlushReport::Completed(s) if s.persisted == 2 && s.already_persisted == 1),
			"mode {mode}: {report:?}"
		);
		assert!(outbox.is_empty().await.unwrap());
		assert_eq!(repo.count().await.unwrap(), 3);
		agent.shutdown().await;
	}
}

fn bulky(bytes: usize) -> LogSubmission {
	let mut submission = auditable();
	submission
		.metadata
		.insert("payload".to_string(), json!("x".repeat(bytes)));
	submission
}

#[tokio::test]
async fn backlog_larger_than_collector_body_limit_is_delivered() {
	let (url, repo) = spawn_collector().await;
	let client = Arc::new(HttpCollectorClient::new(&url, Duration::from_secs(30)).unwrap());
	let outbox = Arc::new(Outbox::open_in_memory().await.unwrap());
	let agent = Agent::new(
		outbox.clone(),
		client,
		AgentSettings {
			request_timeout: Duration::from_secs(60),
			max_batch_size: 1000,
			..settings(DispatchMode::Batch)
		},
	);
	// About 36 MB in total, more than one collector request may carry.
	for _ in 0..20 {
		agent.log(bulky(1_800_000)).await.unwrap();
	}

	let report = agent.flush_now().await;

	assert!(
		matches!(report, FlushReport::Completed(s) if s.persisted == 20 && s.failed == 0),
		"{report:?}"
	);
	assert!(outbox.is_empty().await.unwrap());
	assert_eq!(repo.count().await.unwrap(), 20);
	agent.shutdown().await;
}
