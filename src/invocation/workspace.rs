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

//! Workspace allocation on a worker node.

use rand::Rng;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{Error, Result};
use crate::node::WorkerNode;
use crate::transport::Transport;

/// Prefix of every generated workspace directory name.
pub const WORKSPACE_PREFIX: &str = "job";

/// The isolated directory on a worker node owned by one invocation.
#[derive(Debug, Clone)]
pub struct Workspace {
    name: String,
    path: String,
}

impl Workspace {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Absolute path of the workspace on the worker.
    pub fn path(&self) -> &str {
        &self.path
    }
}

/// Reserve a workspace name unused on the host and create the directory.
///
/// The transfer protocol has no atomic "create if absent", so the whole
/// probe-then-create sequence runs under the host's lock: no concurrent
/// allocator on the same host can slip between the existence probe and
/// the creation call. On any indication the candidate path exists the
/// allocator retries with a fresh random value.
pub async fn allocate(
    transport: &dyn Transport,
    host_lock: &Mutex<()>,
    node: &WorkerNode,
) -> Result<Workspace> {
    let _guard = host_lock.lock().await;

    transport
        .enter(&node.root_dir)
        .await
        .map_err(|e| Error::allocation(&node.host, e))?;

    loop {
        let name = format!("{WORKSPACE_PREFIX}{}", rand::thread_rng().gen::<u64>());
        let path = node.root_path(&name);

        match transport.stat(&path).await {
            Ok(true) => {
                debug!("workspace name {name} already taken on {}, retrying", node.host);
                continue;
            }
            Ok(false) => {}
            Err(e) => return Err(Error::allocation(&node.host, e)),
        }

        transport
            .mkdir(&path)
            .await
            .map_err(|e| Error::allocation(&node.host, e))?;
        transport
            .enter(&path)
            .await
            .map_err(|e| Error::allocation(&node.host, e))?;

        debug!("allocated workspace {path} on {}", node.host);
        return Ok(Workspace { name, path });
    }
}
