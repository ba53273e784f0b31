// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Core types for the Quill audit log pipeline.
//!
//! This crate is shared by the edge agent and the central collector:
//! - [`LogRecord`] and its identifier [`RecordId`], the unit of audit data
//! - the record codec used for the agent's durable outbox
//! - [`PersistOutcome`], the tagged result of a persistence attempt, carried
//!   unchanged from the collector's storage layer back to the agent
//! - [`DispatchResult`] and [`ErrorReason`], the per-record wire result

pub mod codec;
pub mod error;
pub mod outcome;
pub mod record;

pub use codec::{decode, encode};
pub use error::{CodecError, Result};
pub use outcome::{DispatchResult, ErrorCode, ErrorReason, PersistOutcome};
pub use record::{LogRecord, LogRecordBuilder, RecordId};
