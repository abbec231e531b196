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

//! The transport seam between the invocation engine and the wire.
//!
//! [`Transport`] covers exactly the remote filesystem and execution
//! operations the engine needs. The production implementation in
//! [`ssh`] drives an SFTP subsystem and exec channels over russh;
//! tests substitute an in-memory fake that records operation order.
//!
//! Callers issuing more than one sequential filesystem operation against
//! a host (probe + create, enter + put, list + delete) must hold that
//! host's lock for the whole sequence; the transport itself does no
//! locking.

pub mod ssh;

use async_trait::async_trait;
use tokio::io::AsyncRead;

use crate::error::Result;

/// A readable byte stream handed to [`Transport::put`].
pub type ByteStream = Box<dyn AsyncRead + Send + Unpin>;

/// One entry of a remote directory listing.
#[derive(Debug, Clone)]
pub struct RemoteEntry {
    pub name: String,
    pub is_dir: bool,
}

/// Captured output of a finished remote command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    /// The unix exit status (`$?` in bash).
    pub exit_status: u32,
}

impl CommandOutput {
    pub fn is_success(&self) -> bool {
        self.exit_status == 0
    }
}

/// Filesystem and execution operations against one worker host.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Probe whether a remote path exists.
    async fn stat(&self, path: &str) -> Result<bool>;

    /// Create a remote directory.
    async fn mkdir(&self, path: &str) -> Result<()>;

    /// Verify that a remote directory exists and is enterable.
    ///
    /// The shared session carries no working-directory state of its own,
    /// so every multi-step sequence re-enters its target directory before
    /// acting in it.
    async fn enter(&self, path: &str) -> Result<()>;

    /// Upload a byte stream to a remote path, truncating any existing file.
    async fn put(&self, path: &str, data: ByteStream) -> Result<()>;

    /// List a remote directory. `.` and `..` are not included.
    async fn read_dir(&self, path: &str) -> Result<Vec<RemoteEntry>>;

    async fn remove_file(&self, path: &str) -> Result<()>;

    /// Remove a remote directory; fails while it still has entries.
    async fn remove_dir(&self, path: &str) -> Result<()>;

    /// Launch a command on a fresh execution channel.
    ///
    /// Returns once the channel reports connected; the command runs
    /// concurrently with the caller and its output accumulates behind the
    /// returned handle until [`ExecHandle::wait`] is awaited.
    async fn exec(&self, command: &str) -> Result<Box<dyn ExecHandle>>;
}

/// Handle on one running remote command.
#[async_trait]
pub trait ExecHandle: Send {
    /// Block until the channel closes and yield the exit status together
    /// with the frozen stdout/stderr buffers.
    async fn wait(&mut self) -> Result<CommandOutput>;

    /// Tear the channel down. Terminates the remote command if it is
    /// still running; safe to call after `wait`.
    async fn disconnect(&mut self) -> Result<()>;
}
