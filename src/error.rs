// Copyright 2025 sshjob contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Error types for the invocation engine.
//!
//! Allocation, staging, and execution failures are fatal to their
//! invocation and surface through [`Error`]. Cleanup failures never do;
//! they are collected in [`crate::invocation::CleanupReport`] instead.

use std::time::Duration;

use thiserror::Error;

/// Errors raised by the invocation engine.
#[derive(Debug, Error)]
pub enum Error {
    /// Credential or handshake failure while establishing a session.
    #[error("authentication failed for {user}@{host}: {reason}")]
    Authentication {
        host: String,
        user: String,
        reason: String,
    },

    /// A workspace could not be reserved or entered on the worker node.
    #[error("cannot allocate workspace on {host}: {reason}")]
    WorkspaceAllocation { host: String, reason: String },

    /// An upload or download failed during stage-in.
    #[error("transfer failed for '{path}': {reason}")]
    Transfer { path: String, reason: String },

    /// The remote command reported a non-zero exit status.
    ///
    /// Carries the captured streams so the caller can diagnose the
    /// failure; no output references are produced in this case.
    #[error("remote command exited with status {status}")]
    NonZeroExit {
        status: u32,
        stdout: String,
        stderr: String,
    },

    /// The execution channel misbehaved (closed without an exit status,
    /// refused the exec request, and so on).
    #[error("channel error: {0}")]
    Channel(String),

    /// `await_results` was called before `submit`.
    #[error("invocation has not been submitted")]
    NotSubmitted,

    /// The remote command did not finish within the caller's deadline.
    #[error("remote command did not finish within {0:?}")]
    Timeout(Duration),

    #[error("ssh error: {0}")]
    Ssh(#[from] russh::Error),

    #[error("sftp error: {0}")]
    Sftp(#[from] russh_sftp::client::error::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn transfer(path: impl Into<String>, reason: impl ToString) -> Self {
        Error::Transfer {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn allocation(host: impl Into<String>, reason: impl ToString) -> Self {
        Error::WorkspaceAllocation {
            host: host.into(),
            reason: reason.to_string(),
        }
    }
}

/// Result type used throughout the engine.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::WorkspaceAllocation {
            host: "worker1".to_string(),
            reason: "permission denied".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "cannot allocate workspace on worker1: permission denied"
        );

        let err = Error::NonZeroExit {
            status: 17,
            stdout: String::new(),
            stderr: String::new(),
        };
        assert_eq!(err.to_string(), "remote command exited with status 17");
    }

    #[test]
    fn test_nonzero_exit_keeps_captured_streams() {
        let err = Error::NonZeroExit {
            status: 1,
            stdout: "partial".to_string(),
            stderr: "boom".to_string(),
        };
        match err {
            Error::NonZeroExit { stdout, stderr, .. } => {
                assert_eq!(stdout, "partial");
                assert_eq!(stderr, "boom");
            }
            _ => unreachable!(),
        }
    }
}
