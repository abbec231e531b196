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

//! In-memory fake transport for integration tests.
//!
//! Stores a remote filesystem as a path map and records every operation
//! in order, so tests can assert on interleaving and containment without
//! a live SSH server.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncReadExt;

use sshjob::error::{Error, Result};
use sshjob::transport::{ByteStream, CommandOutput, ExecHandle, RemoteEntry, Transport};

fn transfer_err(path: &str, reason: &str) -> Error {
    Error::Transfer {
        path: path.to_string(),
        reason: reason.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Op {
    pub kind: &'static str,
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FsNode {
    Dir,
    File(Vec<u8>),
}

#[derive(Default)]
pub struct FakeTransport {
    pub fs: Mutex<BTreeMap<String, FsNode>>,
    pub ops: Mutex<Vec<Op>>,
    /// Pretend the next N stat probes hit an existing path, regardless
    /// of the filesystem contents. Exercises the allocator's retry.
    pub stat_collisions: Mutex<u32>,
    /// Queued outputs handed out per exec, in order. An exec with an
    /// empty queue never finishes (until its handle is torn down).
    pub exec_outputs: Mutex<Vec<CommandOutput>>,
    /// Sleep between the navigate and act halves of multi-step
    /// operations, to widen any race window a missing lock would leave.
    pub race_delay: bool,
    /// Make remove_file fail, for cleanup-absorption tests.
    pub fail_remove: Mutex<bool>,
}

impl FakeTransport {
    pub fn with_root(root: &str) -> Self {
        let fake = Self::default();
        fake.fs
            .lock()
            .unwrap()
            .insert(root.trim_end_matches('/').to_string(), FsNode::Dir);
        fake
    }

    pub fn push_exec_output(&self, stdout: &[u8], stderr: &[u8], exit_status: u32) {
        self.exec_outputs.lock().unwrap().push(CommandOutput {
            stdout: stdout.to_vec(),
            stderr: stderr.to_vec(),
            exit_status,
        });
    }

    pub fn insert_dir(&self, path: &str) {
        self.fs
            .lock()
            .unwrap()
            .insert(path.trim_end_matches('/').to_string(), FsNode::Dir);
    }

    pub fn insert_file(&self, path: &str, contents: &[u8]) {
        self.fs
            .lock()
            .unwrap()
            .insert(path.to_string(), FsNode::File(contents.to_vec()));
    }

    pub fn ops(&self) -> Vec<Op> {
        self.ops.lock().unwrap().clone()
    }

    pub fn clear_ops(&self) {
        self.ops.lock().unwrap().clear();
    }

    pub fn paths(&self) -> Vec<String> {
        self.fs.lock().unwrap().keys().cloned().collect()
    }

    fn record(&self, kind: &'static str, path: &str) {
        self.ops.lock().unwrap().push(Op {
            kind,
            path: path.to_string(),
        });
    }

    async fn maybe_delay(&self) {
        if self.race_delay {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    }

    fn children_of(&self, path: &str) -> Vec<RemoteEntry> {
        let prefix = format!("{}/", path.trim_end_matches('/'));
        self.fs
            .lock()
            .unwrap()
            .iter()
            .filter_map(|(p, node)| {
                let rest = p.strip_prefix(&prefix)?;
                if rest.is_empty() || rest.contains('/') {
                    return None;
                }
                Some(RemoteEntry {
                    name: rest.to_string(),
                    is_dir: matches!(node, FsNode::Dir),
                })
            })
            .collect()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn stat(&self, path: &str) -> Result<bool> {
        self.record("stat", path);
        {
            let mut collisions = self.stat_collisions.lock().unwrap();
            if *collisions > 0 {
                *collisions -= 1;
                return Ok(true);
            }
        }
        Ok(self.fs.lock().unwrap().contains_key(path.trim_end_matches('/')))
    }

    async fn mkdir(&self, path: &str) -> Result<()> {
        self.record("mkdir", path);
        let mut fs = self.fs.lock().unwrap();
        let key = path.trim_end_matches('/').to_string();
        if fs.contains_key(&key) {
            return Err(transfer_err(path, "already exists"));
        }
        fs.insert(key, FsNode::Dir);
        Ok(())
    }

    async fn enter(&self, path: &str) -> Result<()> {
        self.record("enter", path);
        let exists_as_dir = matches!(
            self.fs.lock().unwrap().get(path.trim_end_matches('/')),
            Some(FsNode::Dir)
        );
        if !exists_as_dir {
            return Err(transfer_err(path, "no such directory"));
        }
        self.maybe_delay().await;
        Ok(())
    }

    async fn put(&self, path: &str, mut data: ByteStream) -> Result<()> {
        let mut contents = Vec::new();
        data.read_to_end(&mut contents)
            .await
            .map_err(|e| transfer_err(path, &e.to_string()))?;
        self.record("put", path);
        self.fs
            .lock()
            .unwrap()
            .insert(path.to_string(), FsNode::File(contents));
        Ok(())
    }

    async fn read_dir(&self, path: &str) -> Result<Vec<RemoteEntry>> {
        self.record("ls", path);
        if !matches!(
            self.fs.lock().unwrap().get(path.trim_end_matches('/')),
            Some(FsNode::Dir)
        ) {
            return Err(transfer_err(path, "no such directory"));
        }
        self.maybe_delay().await;
        Ok(self.children_of(path))
    }

    async fn remove_file(&self, path: &str) -> Result<()> {
        self.record("rm", path);
        if *self.fail_remove.lock().unwrap() {
            return Err(transfer_err(path, "permission denied"));
        }
        let mut fs = self.fs.lock().unwrap();
        match fs.get(path) {
            Some(FsNode::File(_)) => {
                fs.remove(path);
                Ok(())
            }
            Some(FsNode::Dir) => Err(transfer_err(path, "is a directory")),
            None => Err(transfer_err(path, "no such file")),
        }
    }

    async fn remove_dir(&self, path: &str) -> Result<()> {
        self.record("rmdir", path);
        let key = path.trim_end_matches('/').to_string();
        if !self.children_of(&key).is_empty() {
            return Err(transfer_err(path, "directory not empty"));
        }
        let mut fs = self.fs.lock().unwrap();
        match fs.get(&key) {
            Some(FsNode::Dir) => {
                fs.remove(&key);
                Ok(())
            }
            Some(FsNode::File(_)) => Err(transfer_err(path, "not a directory")),
            None => Err(transfer_err(path, "no such directory")),
        }
    }

    async fn exec(&self, command: &str) -> Result<Box<dyn ExecHandle>> {
        self.record("exec", command);
        let output = {
            let mut queue = self.exec_outputs.lock().unwrap();
            if queue.is_empty() {
                None
            } else {
                Some(queue.remove(0))
            }
        };
        Ok(Box::new(FakeExecHandle { output }))
    }
}

pub struct FakeExecHandle {
    output: Option<CommandOutput>,
}

#[async_trait]
impl ExecHandle for FakeExecHandle {
    async fn wait(&mut self) -> Result<CommandOutput> {
        match self.output.take() {
            Some(output) => Ok(output),
            // No queued output: behave like a command that never exits.
            None => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(Error::Channel("never reached".to_string()))
            }
        }
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.output = None;
        Ok(())
    }
}
