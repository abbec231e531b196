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

use tracing_subscriber::EnvFilter;

/// Map the `-v` count to a log filter.
pub fn create_env_filter(verbosity: u8) -> EnvFilter {
    if std::env::var("RUST_LOG").is_ok() {
        // An explicit RUST_LOG wins outright, directives and all.
        return EnvFilter::from_default_env();
    }
    match verbosity {
        0 => EnvFilter::new("sshjob=warn"),
        1 => EnvFilter::new("sshjob=info"),
        // -vv pulls in the protocol layer as well.
        2 => EnvFilter::new("sshjob=debug,russh=debug"),
        _ => EnvFilter::new("sshjob=trace,russh=trace,russh_sftp=debug"),
    }
}

/// Initialize console logging.
pub fn init_logging(verbosity: u8) {
    tracing_subscriber::fmt()
        .with_env_filter(create_env_filter(verbosity))
        .with_target(true)
        .init();
}
