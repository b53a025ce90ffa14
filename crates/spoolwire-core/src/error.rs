// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for Spoolwire.

use thiserror::Error;

use crate::types::StatusCode;

/// Top-level error type for all Spoolwire operations.
#[derive(Debug, Error)]
pub enum SpoolwireError {
    // -- Session --
    #[error("no session context available on this thread")]
    NoContext,

    #[error("allocation failed: {0}")]
    Allocation(String),

    // -- Transport / protocol --
    #[error("transport failure: {0}")]
    Transport(String),

    #[error("server returned {status}: {}", .message.as_deref().unwrap_or("no status message"))]
    Protocol {
        status: StatusCode,
        message: Option<String>,
    },

    #[error("invalid destination name: {0}")]
    InvalidDestination(String),

    // -- Configuration --
    #[error("configuration error: {0}")]
    Config(String),

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SpoolwireError {
    /// Status recorded in the thread's last-error state for this failure.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Protocol { status, .. } => *status,
            Self::Transport(_) | Self::Io(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::InvalidDestination(_) => StatusCode::BAD_REQUEST,
            Self::NoContext | Self::Allocation(_) | Self::Config(_) | Self::Serialization(_) => {
                StatusCode::LOCAL_INTERNAL
            }
        }
    }

    /// Message recorded alongside [`status`](Self::status).
    pub fn status_message(&self) -> Option<String> {
        match self {
            Self::Protocol { message, .. } => message.clone(),
            other => Some(other.to_string()),
        }
    }
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, SpoolwireError>;
