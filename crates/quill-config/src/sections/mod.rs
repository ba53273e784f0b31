// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

mod agent;
mod collector;
mod logging;

pub use agent::*;
pub use collector::*;
pub use logging::*;
