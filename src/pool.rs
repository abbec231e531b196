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

//! Session pooling and per-host locking.
//!
//! [`SessionPool`] owns one authenticated [`SshSession`] per worker host
//! and the [`HostLockRegistry`] that serializes workspace-mutating
//! filesystem sequences against each host. Keeping both keyed by the
//! same host identity is what makes the allocator's probe-then-create
//! sequence sound: a session and its lock can never drift apart.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::auth::CredentialProvider;
use crate::error::Result;
use crate::node::WorkerNode;
use crate::transport::ssh::SshSession;

#[derive(Debug, Clone, Hash, Eq, PartialEq)]
struct SessionKey {
    host: String,
    port: u16,
    username: String,
}

impl SessionKey {
    fn for_node(node: &WorkerNode) -> Self {
        Self {
            host: node.host.clone(),
            port: node.port,
            username: node.username.clone(),
        }
    }
}

/// One exclusive-access token per distinct host identity.
///
/// Locks are created lazily and never removed, so the registry grows with
/// the number of distinct hosts ever contacted. The mapping itself is
/// guarded by a short-held lock distinct from the per-host locks it
/// hands out.
#[derive(Default)]
pub struct HostLockRegistry {
    locks: std::sync::Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl HostLockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The lock serializing filesystem mutations against `host`.
    pub fn lock_for(&self, host: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().expect("host lock registry poisoned");
        locks
            .entry(host.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

/// A pooled session in the making or in use, one per session key.
type SessionSlot = Arc<Mutex<Option<Arc<SshSession>>>>;

/// Pool of authenticated sessions, one per worker host.
///
/// Sessions are created on first need, reused by every subsequent
/// invocation against the same host, and torn down on [`shutdown`].
///
/// [`shutdown`]: SessionPool::shutdown
pub struct SessionPool {
    sessions: Mutex<HashMap<SessionKey, SessionSlot>>,
    locks: HostLockRegistry,
}

impl SessionPool {
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            locks: HostLockRegistry::new(),
        }
    }

    /// The slot holding the session for `key`, created empty on first use.
    ///
    /// The map lock is held only for this lookup, never across a
    /// handshake, so creation for one host cannot stall callers for
    /// another.
    async fn creation_slot(&self, key: &SessionKey) -> SessionSlot {
        let mut sessions = self.sessions.lock().await;
        sessions.entry(key.clone()).or_default().clone()
    }

    /// Get the shared session for a node, connecting and authenticating
    /// on first use.
    ///
    /// Creation is serialized per session key: concurrent callers for the
    /// same host wait on one handshake (and one credential prompt) and
    /// share its session, while distinct hosts proceed independently. A
    /// session found closed (fatal channel error) is discarded and
    /// replaced.
    pub async fn session(
        &self,
        node: &WorkerNode,
        provider: &dyn CredentialProvider,
    ) -> Result<Arc<SshSession>> {
        let key = SessionKey::for_node(node);
        let slot = self.creation_slot(&key).await;
        let mut slot = slot.lock().await;

        if let Some(session) = slot.as_ref() {
            if !session.is_closed() {
                return Ok(Arc::clone(session));
            }
            debug!("discarding closed session for {}", node);
            *slot = None;
        }

        let auth = provider.credentials(node).await?;
        let session = Arc::new(SshSession::connect(node, &auth).await?);
        *slot = Some(Arc::clone(&session));
        Ok(session)
    }

    /// The lock serializing filesystem mutations against `host`.
    pub fn host_lock(&self, host: &str) -> Arc<Mutex<()>> {
        self.locks.lock_for(host)
    }

    /// Disconnect every pooled session and clear the pool.
    pub async fn shutdown(&self) {
        let mut sessions = self.sessions.lock().await;
        for (key, slot) in sessions.drain() {
            if let Some(session) = slot.lock().await.take() {
                if let Err(e) = session.disconnect().await {
                    warn!("disconnect from {}:{} failed: {e}", key.host, key.port);
                }
            }
        }
    }

    /// Number of live pooled sessions.
    pub async fn size(&self) -> usize {
        let sessions = self.sessions.lock().await;
        let mut live = 0;
        for slot in sessions.values() {
            if slot.lock().await.is_some() {
                live += 1;
            }
        }
        live
    }
}

impl Default for SessionPool {
    fn default() -> Self {
        Self::new()
    }
}
