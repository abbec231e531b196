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

//! One remote job invocation, from workspace allocation to cleanup.
//!
//! Within an invocation the phases are strictly sequential:
//! allocate -> stage-in (zero or more) -> submit -> await_results ->
//! cleanup. Across invocations sharing a host only the filesystem
//! sequences are serialized (under the host lock); command execution
//! itself may overlap freely since every invocation runs on its own
//! exec channel.

pub mod cleanup;
pub mod command;
pub mod results;
pub mod stage;
pub mod workspace;

pub use cleanup::{CleanupReport, CleanupWarning};
pub use results::{InvocationResults, RemoteFileRef};
pub use stage::{Input, InputSource};
pub use workspace::{Workspace, WORKSPACE_PREFIX};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use crate::auth::CredentialProvider;
use crate::error::{Error, Result};
use crate::node::{join_remote, WorkerNode};
use crate::pool::SessionPool;
use crate::transport::{ExecHandle, Transport};

/// Tag bound to the synthesized submission identifier at submit time.
const UNIQUE_ID_TAG: &str = "uniqueID";

/// One job execution instance on one worker node.
///
/// Exactly one invocation owns exactly one workspace directory for its
/// entire lifetime.
pub struct Invocation {
    node: Arc<WorkerNode>,
    transport: Arc<dyn Transport>,
    host_lock: Arc<Mutex<()>>,
    workspace: Workspace,
    /// Bound parameter values, substituted into the command template.
    tags: HashMap<String, String>,
    /// Declared output name -> path relative to the workspace.
    outputs: HashMap<String, String>,
    next_temp: u32,
    running: Option<Box<dyn ExecHandle>>,
    workspace_removed: bool,
}

impl Invocation {
    /// Allocate a fresh workspace for one job.
    ///
    /// `outputs` maps each declared output name to its expected path
    /// relative to the workspace, as supplied by the job description.
    /// Fails with [`Error::WorkspaceAllocation`] if the node's root
    /// cannot be entered or no directory can be created; the invocation
    /// must not proceed to staging in that case.
    pub async fn allocate(
        transport: Arc<dyn Transport>,
        host_lock: Arc<Mutex<()>>,
        node: Arc<WorkerNode>,
        outputs: HashMap<String, String>,
    ) -> Result<Self> {
        let workspace = workspace::allocate(transport.as_ref(), &host_lock, &node).await?;
        Ok(Self {
            node,
            transport,
            host_lock,
            workspace,
            tags: HashMap::new(),
            outputs,
            next_temp: 0,
            running: None,
            workspace_removed: false,
        })
    }

    /// Allocate using a pooled session and the pool's lock for the host.
    pub async fn open(
        pool: &SessionPool,
        provider: &dyn CredentialProvider,
        node: Arc<WorkerNode>,
        outputs: HashMap<String, String>,
    ) -> Result<Self> {
        let session = pool.session(&node, provider).await?;
        let host_lock = pool.host_lock(&node.host);
        Self::allocate(session, host_lock, node, outputs).await
    }

    pub fn node(&self) -> &WorkerNode {
        &self.node
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    /// Bind a parameter value directly, without any transfer.
    pub fn bind(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.tags.insert(name.into(), value.into());
    }

    /// Stage one input and bind its parameter value.
    ///
    /// File and temp-file inputs are uploaded into the workspace and
    /// bind to their remote path; value inputs bind to their literal
    /// string. Transfer failures abort the invocation: a missing input
    /// must not reach submission.
    pub async fn stage_input(&mut self, name: &str, input: Input) -> Result<String> {
        let bound = match input {
            Input::Value(value) => value,
            Input::File {
                remote_name,
                source,
            } => self.put_workspace_file(&remote_name, source).await?,
            Input::TempFile { source } => {
                let remote_name = stage::temp_file_name(self.next_temp);
                self.next_temp += 1;
                self.put_workspace_file(&remote_name, source).await?
            }
        };
        self.tags.insert(name.to_string(), bound.clone());
        Ok(bound)
    }

    async fn put_workspace_file(
        &self,
        remote_name: &str,
        source: InputSource,
    ) -> Result<String> {
        let target = join_remote(self.workspace.path(), remote_name);
        debug!("staging input to {target}");

        // The shared session may have served another invocation since we
        // last touched it, so re-enter our workspace before the upload
        // and keep the lock across both steps.
        let _guard = self.host_lock.lock().await;
        self.transport.enter(self.workspace.path()).await?;
        self.transport.put(&target, source.into_reader()).await?;
        Ok(target)
    }

    /// Expand the command template and launch it on the worker.
    ///
    /// Binds a fresh submission identifier under the `uniqueID` tag,
    /// substitutes all bound tags, prefixes a change into the workspace,
    /// and returns as soon as the exec channel reports connected. The
    /// command runs concurrently with the caller.
    pub async fn submit(&mut self, template: &str) -> Result<()> {
        if self.running.is_some() {
            return Err(Error::Channel("invocation already submitted".to_string()));
        }

        self.tags
            .insert(UNIQUE_ID_TAG.to_string(), Uuid::new_v4().to_string());
        let expanded = command::expand_template(template, &self.tags);
        let full = command::in_workspace(self.workspace.path(), &expanded);

        let handle = self.transport.exec(&full).await?;
        self.running = Some(handle);
        Ok(())
    }

    /// Wait for the command to finish and collect its results.
    ///
    /// A zero exit status yields the captured stdout/stderr text and one
    /// [`RemoteFileRef`] per declared output; no output bytes are read.
    /// A non-zero status fails the invocation with
    /// [`Error::NonZeroExit`] carrying the captured streams. With a
    /// `timeout`, the wait is abandoned after that duration and the
    /// command keeps running until [`cleanup`] tears its channel down.
    ///
    /// [`cleanup`]: Invocation::cleanup
    pub async fn await_results(
        &mut self,
        timeout: Option<Duration>,
    ) -> Result<InvocationResults> {
        let running = self.running.as_mut().ok_or(Error::NotSubmitted)?;

        let output = match timeout {
            Some(limit) => tokio::time::timeout(limit, running.wait())
                .await
                .map_err(|_| Error::Timeout(limit))??,
            None => running.wait().await?,
        };

        if !output.is_success() {
            return Err(Error::NonZeroExit {
                status: output.exit_status,
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }

        let outputs = self
            .outputs
            .iter()
            .map(|(name, path)| {
                (
                    name.clone(),
                    RemoteFileRef {
                        host: self.node.host.clone(),
                        subdirectory: self.workspace.name().to_string(),
                        file: path.clone(),
                    },
                )
            })
            .collect();

        Ok(InvocationResults {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            outputs,
        })
    }

    /// Release remote resources, best-effort.
    ///
    /// Disconnects the exec channel and removes the workspace subtree.
    /// Steps are independently guarded; failures are absorbed into the
    /// returned [`CleanupReport`] and logged, never raised. Safe to call
    /// multiple times.
    pub async fn cleanup(&mut self) -> CleanupReport {
        let mut report = CleanupReport::default();

        if let Some(mut handle) = self.running.take() {
            if let Err(e) = handle.disconnect().await {
                report.record("disconnect", &e);
            }
        }

        if !self.workspace_removed {
            let path = self.workspace.path().to_string();
            let _guard = self.host_lock.lock().await;
            match cleanup::remove_workspace_tree(self.transport.as_ref(), &path, &path).await {
                Ok(()) => {
                    debug!("removed workspace {path}");
                    self.workspace_removed = true;
                }
                Err(e) => report.record("workspace", &e),
            }
        }

        report
    }
}

/// Probe a worker node before committing to a real submission.
///
/// Opens the transfer channel and attempts to enter the node's workspace
/// root; any failure carries the transport diagnostic.
pub async fn test_connectivity(transport: &dyn Transport, node: &WorkerNode) -> Result<()> {
    transport.enter(&node.root_dir).await
}
