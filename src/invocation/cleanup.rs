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

//! Best-effort teardown of remote resources.
//!
//! Cleanup never fails the job: every step is independently guarded and
//! its failures are collected into a [`CleanupReport`] and logged rather
//! than raised.

use std::future::Future;
use std::pin::Pin;

use tracing::warn;

use crate::error::{Error, Result};
use crate::node::join_remote;
use crate::transport::Transport;

/// Typed record of the non-fatal failures one cleanup pass hit.
#[derive(Debug, Default)]
pub struct CleanupReport {
    warnings: Vec<CleanupWarning>,
}

/// One absorbed cleanup failure.
#[derive(Debug)]
pub struct CleanupWarning {
    /// The step that failed (`disconnect`, `workspace`).
    pub step: &'static str,
    pub detail: String,
}

impl CleanupReport {
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }

    pub fn warnings(&self) -> &[CleanupWarning] {
        &self.warnings
    }

    pub(crate) fn record(&mut self, step: &'static str, err: &Error) {
        warn!("cleanup step '{step}' failed: {err}");
        self.warnings.push(CleanupWarning {
            step,
            detail: err.to_string(),
        });
    }
}

/// True when `path` is the workspace root itself or a descendant of it.
fn is_within(workspace_root: &str, path: &str) -> bool {
    let root = workspace_root.trim_end_matches('/');
    let path = path.trim_end_matches('/');
    path == root || path.strip_prefix(root).is_some_and(|rest| rest.starts_with('/'))
}

/// Recursively delete `path` inside the invocation's workspace.
///
/// Any path outside the workspace root is a no-op, even if requested:
/// this routine is the enforcement point for the containment invariant.
/// Files are removed before their directory, and the workspace root is
/// removed last.
pub async fn remove_workspace_tree(
    transport: &dyn Transport,
    workspace_root: &str,
    path: &str,
) -> Result<()> {
    remove_tree_inner(transport, workspace_root, path).await
}

fn remove_tree_inner<'a>(
    transport: &'a dyn Transport,
    workspace_root: &'a str,
    path: &'a str,
) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
    Box::pin(async move {
        if !is_within(workspace_root, path) {
            return Ok(());
        }

        for entry in transport.read_dir(path).await? {
            if entry.name == "." || entry.name == ".." {
                continue;
            }
            let child = join_remote(path, &entry.name);
            if entry.is_dir {
                remove_tree_inner(transport, workspace_root, &child).await?;
            } else {
                transport.remove_file(&child).await?;
            }
        }

        transport.remove_dir(path).await
    })
}
