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

//! Remote job invocation engine.
//!
//! Runs a user-defined command on a remote worker over SSH inside an
//! isolated per-job workspace: inputs are staged in over SFTP, output is
//! captured from the exec channel, and declared output files are exposed
//! as lazy [`RemoteFileRef`]s instead of being transferred eagerly.

pub mod auth;
pub mod cli;
pub mod error;
pub mod invocation;
pub mod logging;
pub mod node;
pub mod pool;
pub mod transport;

pub use auth::{AuthMethod, CredentialProvider};
pub use error::{Error, Result};
pub use invocation::{
    test_connectivity, CleanupReport, Input, InputSource, Invocation, InvocationResults,
    RemoteFileRef,
};
pub use node::WorkerNode;
pub use pool::{HostLockRegistry, SessionPool};
