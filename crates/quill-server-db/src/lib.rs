// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Collector storage.
//!
//! Each audit record is one row keyed by its id. Writing an id that already
//! exists is reported as [`PersistOutcome::AlreadyPersisted`] rather than an
//! error, which is what lets agents resend freely.
//!
//! [`PersistOutcome::AlreadyPersisted`]: quill_common_core::PersistOutcome::AlreadyPersisted

pub mod error;
pub mod logs;
pub mod pool;

pub use error::{DbError, Result};
pub use logs::{LogCursor, LogPage, LogPersistence, SearchQuery, SqliteLogRepository};
pub use pool::{create_memory_pool, create_pool, run_migrations};
