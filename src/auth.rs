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

//! Credential acquisition for worker sessions.
//!
//! The engine never stores secrets itself; it asks a [`CredentialProvider`]
//! for an [`AuthMethod`] the first time a host is contacted. The resulting
//! session is cached by the pool, so a provider is normally consulted once
//! per host.

use std::path::PathBuf;

use async_trait::async_trait;
use zeroize::Zeroizing;

use crate::error::Result;
use crate::node::WorkerNode;

/// Authentication material for one SSH connection.
#[derive(Debug, Clone)]
pub enum AuthMethod {
    /// Password authentication. The password is zeroized on drop.
    Password(Zeroizing<String>),
    /// Private key file, with an optional passphrase.
    KeyFile {
        path: PathBuf,
        passphrase: Option<Zeroizing<String>>,
    },
    /// All identities offered by the running SSH agent.
    Agent,
}

impl AuthMethod {
    pub fn with_password(password: &str) -> Self {
        Self::Password(Zeroizing::new(password.to_string()))
    }

    pub fn with_key_file(path: impl Into<PathBuf>, passphrase: Option<&str>) -> Self {
        Self::KeyFile {
            path: path.into(),
            passphrase: passphrase.map(|p| Zeroizing::new(p.to_string())),
        }
    }
}

/// Supplies authentication material for a worker node on demand.
///
/// Implementations may prompt interactively; the pool invokes the provider
/// lazily and only while establishing a new session.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn credentials(&self, node: &WorkerNode) -> Result<AuthMethod>;
}

/// Provider that always hands out a fixed, pre-resolved method.
pub struct StaticCredentials {
    method: AuthMethod,
}

impl StaticCredentials {
    pub fn new(method: AuthMethod) -> Self {
        Self { method }
    }
}

#[async_trait]
impl CredentialProvider for StaticCredentials {
    async fn credentials(&self, _node: &WorkerNode) -> Result<AuthMethod> {
        Ok(self.method.clone())
    }
}

/// Provider that prompts for a password on the controlling terminal.
pub struct PromptCredentials;

#[async_trait]
impl CredentialProvider for PromptCredentials {
    async fn credentials(&self, node: &WorkerNode) -> Result<AuthMethod> {
        let prompt = format!("Password for {}@{}: ", node.username, node.host);
        let password = tokio::task::spawn_blocking(move || rpassword::prompt_password(prompt))
            .await
            .map_err(|e| std::io::Error::other(e))??;
        Ok(AuthMethod::Password(Zeroizing::new(password)))
    }
}
