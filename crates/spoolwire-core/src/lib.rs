// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Spoolwire — Core types, error definitions, and client configuration shared
// across all crates.

pub mod config;
pub mod error;
pub mod types;

pub use config::ClientConfig;
pub use error::SpoolwireError;
pub use types::*;
