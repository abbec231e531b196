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

//! Command template expansion.

use std::collections::HashMap;

/// Substitute every occurrence of each bound `%%name%%` tag.
///
/// Substitution is literal; no shell semantics are applied here. A tag
/// with no binding is left in place for the remote shell to reject,
/// which produces a clearer diagnostic than guessing at intent.
pub fn expand_template(template: &str, tags: &HashMap<String, String>) -> String {
    let mut command = template.to_string();
    for (tag, value) in tags {
        command = command.replace(&format!("%%{tag}%%"), value);
    }
    command
}

/// Prefix a command with a change into the invocation's workspace so it
/// executes with the workspace as working directory.
pub fn in_workspace(workspace_path: &str, command: &str) -> String {
    format!("cd {workspace_path} && {command}")
}
