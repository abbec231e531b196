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

//! Results of a completed invocation.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Location of an output file left on the worker.
///
/// Returned instead of the file's content; the collector never reads a
/// byte of the file. Consumers dereference the location on demand later.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFileRef {
    /// Hostname of the worker holding the file.
    pub host: String,
    /// Workspace directory name under the node's root.
    pub subdirectory: String,
    /// Path of the file relative to the workspace.
    pub file: String,
}

impl fmt::Display for RemoteFileRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}/{}", self.host, self.subdirectory, self.file)
    }
}

/// Everything a successful invocation produces.
#[derive(Debug)]
pub struct InvocationResults {
    /// Full captured standard output, decoded as text.
    pub stdout: String,
    /// Full captured standard error, decoded as text.
    pub stderr: String,
    /// One lazy reference per declared output name.
    pub outputs: HashMap<String, RemoteFileRef>,
}
