// Sentinel Center - Errors
// Copyright (C) 2026 Christos Daggas
// SPDX-License-Identifier: MIT

//! Typed errors for the firewall driver seam.
//!
//! Most of the crate works with `anyhow::Result`. Drivers return
//! [`BackendError`] instead so the facade can tell an unsupported
//! capability apart from a command that ran and failed.

use thiserror::Error;

/// Error returned by a firewall backend driver.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The backend has no notion of this capability (ufw has no zones).
    #[error("operation not supported by the {backend} backend")]
    Unsupported { backend: &'static str },

    /// The backend command ran and exited with a failure status.
    #[error("`{command}` exited with status {code}: {output}")]
    CommandFailed {
        command: String,
        code: i32,
        output: String,
    },

    /// Output could not be understood.
    #[error("unexpected output from {backend}: {detail}")]
    Parse {
        backend: &'static str,
        detail: String,
    },

    /// The command could not be spawned at all.
    #[error(transparent)]
    Launch(#[from] anyhow::Error),
}

impl BackendError {
    /// Whether this error marks a capability the backend lacks.
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Self::Unsupported { .. })
    }
}

pub type BackendResult<T> = std::result::Result<T, BackendError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_is_distinguishable() {
        let err = BackendError::Unsupported { backend: "ufw" };
        assert!(err.is_unsupported());
        assert_eq!(err.to_string(), "operation not supported by the ufw backend");

        let err = BackendError::CommandFailed {
            command: "firewall-cmd --reload".into(),
            code: 1,
            output: "FirewallD is not running".into(),
        };
        assert!(!err.is_unsupported());
    }
}
