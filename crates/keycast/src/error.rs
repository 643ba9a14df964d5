// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde::{Deserialize, Serialize};
use std::fmt;

/// Failure classes for lifecycle cycles.
///
/// Carried in cycle outcomes and in the `code` field of log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    NoServer,
    Provision,
    Persist,
    Notify,
    Revoke,
    Delete,
    Store,
    Timeout,
    Panicked,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoServer => "NO_SERVER",
            Self::Provision => "PROVISION",
            Self::Persist => "PERSIST",
            Self::Notify => "NOTIFY",
            Self::Revoke => "REVOKE",
            Self::Delete => "DELETE",
            Self::Store => "STORE",
            Self::Timeout => "TIMEOUT",
            Self::Panicked => "PANICKED",
        }
    }

    /// Whether the next natural tick is expected to clear this failure.
    pub fn is_transient(&self) -> bool {
        !matches!(self, Self::Panicked)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified collaborator failure.
#[derive(Debug)]
pub struct CycleError {
    pub code: ErrorCode,
    pub source: anyhow::Error,
}

impl CycleError {
    pub fn new(code: ErrorCode, source: anyhow::Error) -> Self {
        Self { code, source }
    }
}

impl fmt::Display for CycleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {:#}", self.code, self.source)
    }
}

impl std::error::Error for CycleError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[yare::parameterized(
        no_server = { ErrorCode::NoServer, "NO_SERVER" },
        provision = { ErrorCode::Provision, "PROVISION" },
        timeout   = { ErrorCode::Timeout, "TIMEOUT" },
        panicked  = { ErrorCode::Panicked, "PANICKED" },
    )]
    fn code_strings(code: ErrorCode, expected: &str) {
        assert_eq!(code.as_str(), expected);
        assert_eq!(code.to_string(), expected);
    }

    #[test]
    fn cycle_error_display_includes_code_and_chain() {
        let err = CycleError::new(
            ErrorCode::Revoke,
            anyhow::anyhow!("connection reset").context("DELETE /access-keys/3"),
        );
        let msg = err.to_string();
        assert!(msg.starts_with("REVOKE: "), "{msg}");
        assert!(msg.contains("connection reset"), "{msg}");
    }

    #[test]
    fn only_panics_are_not_transient() {
        assert!(ErrorCode::Timeout.is_transient());
        assert!(ErrorCode::Store.is_transient());
        assert!(!ErrorCode::Panicked.is_transient());
    }
}
