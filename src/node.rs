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

use anyhow::{Context, Result};
use std::fmt;

/// Identity of a remote worker host.
///
/// All of a job's workspaces are created under `root_dir`. The descriptor
/// is immutable once constructed and shared read-only across concurrent
/// invocations.
#[derive(Debug, Clone)]
pub struct WorkerNode {
    pub host: String,
    pub port: u16,
    pub username: String,
    /// Directory on the worker under which per-job workspaces are created.
    pub root_dir: String,
}

impl WorkerNode {
    pub fn new(host: String, port: u16, username: String, root_dir: String) -> Self {
        Self {
            host,
            port,
            username,
            root_dir,
        }
    }

    /// Parse a node descriptor string together with a workspace root.
    ///
    /// Accepted formats:
    /// - `host`
    /// - `host:port`
    /// - `user@host`
    /// - `user@host:port`
    pub fn parse(node_str: &str, root_dir: &str, default_user: Option<&str>) -> Result<Self> {
        let (user_part, host_part) = if let Some(at_pos) = node_str.find('@') {
            (Some(&node_str[..at_pos]), &node_str[at_pos + 1..])
        } else {
            (None, node_str)
        };

        let (host, port) = if let Some(colon_pos) = host_part.rfind(':') {
            let port = host_part[colon_pos + 1..]
                .parse::<u16>()
                .context("Invalid port number")?;
            (&host_part[..colon_pos], port)
        } else {
            (host_part, 22)
        };

        let username = user_part
            .or(default_user)
            .map(|s| s.to_string())
            .unwrap_or_else(|| {
                std::env::var("USER")
                    .or_else(|_| std::env::var("USERNAME"))
                    .unwrap_or_else(|_| "root".to_string())
            });

        Ok(WorkerNode {
            host: host.to_string(),
            port,
            username,
            root_dir: root_dir.to_string(),
        })
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Join a name onto the node's workspace root.
    pub fn root_path(&self, name: &str) -> String {
        join_remote(&self.root_dir, name)
    }
}

impl fmt::Display for WorkerNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}", self.username, self.host, self.port)
    }
}

/// Join two remote path segments with exactly one `/` between them.
pub fn join_remote(base: &str, name: &str) -> String {
    let base = base.trim_end_matches('/');
    let name = name.trim_start_matches('/');
    format!("{base}/{name}")
}
