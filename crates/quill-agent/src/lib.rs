// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Quill edge agent.
//!
//! Audit events are written to a local durable outbox first and shipped to
//! the collector by a background flush loop. A record leaves the outbox only
//! after the collector confirms it is stored, so delivery is at-least-once
//! and the collector deduplicates by record id.

pub mod agent;
pub mod api;
pub mod client;
pub mod dispatch;
pub mod error;
pub mod flush;

pub use agent::{Agent, AgentSettings, LogSubmission};
pub use api::create_router;
pub use client::{ClientError, CollectorClient, HttpCollectorClient};
pub use dispatch::{DispatchSummary, Dispatcher};
pub use error::{AgentError, Result};
pub use flush::{FlushOrchestrator, FlushReport};
