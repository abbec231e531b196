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

//! Command-line interface for sshjob.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "sshjob",
    version,
    about = "Run a command in an isolated workspace on a remote worker over SSH"
)]
pub struct Cli {
    /// Increase verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Stage inputs, run a command template, and report its outputs
    Run {
        /// Worker node as [user@]host[:port]
        node: String,

        /// Command template; %%name%% tags are replaced by bound inputs
        template: String,

        /// Workspace root directory on the worker
        #[arg(short, long, default_value = "/tmp")]
        dir: String,

        /// Bind an input: name=value, name=@local-file (upload under the
        /// port name), or name=@@local-file (upload as a temp file)
        #[arg(short = 'I', long = "input", value_name = "NAME=SPEC")]
        inputs: Vec<String>,

        /// Declare an output: name=path-relative-to-workspace
        #[arg(short, long = "output", value_name = "NAME=PATH")]
        outputs: Vec<String>,

        /// Path to SSH private key
        #[arg(short = 'i', long)]
        identity: Option<PathBuf>,

        /// Prompt for a password instead of key/agent authentication
        #[arg(long)]
        password: bool,

        /// Abandon the wait after this many seconds (the workspace is
        /// still cleaned up)
        #[arg(long)]
        timeout: Option<u64>,

        /// Leave the remote workspace in place after the run
        #[arg(long)]
        keep_workspace: bool,
    },

    /// Check that a worker node is reachable and its root directory enterable
    Ping {
        /// Worker node as [user@]host[:port]
        node: String,

        /// Workspace root directory on the worker
        #[arg(short, long, default_value = "/tmp")]
        dir: String,

        /// Path to SSH private key
        #[arg(short = 'i', long)]
        identity: Option<PathBuf>,

        /// Prompt for a password instead of key/agent authentication
        #[arg(long)]
        password: bool,
    },
}

/// Split a `name=value` argument.
pub fn parse_key_val(s: &str) -> anyhow::Result<(String, String)> {
    let (name, value) = s
        .split_once('=')
        .ok_or_else(|| anyhow::anyhow!("expected NAME=VALUE, got '{s}'"))?;
    if name.is_empty() {
        anyhow::bail!("empty name in '{s}'");
    }
    Ok((name.to_string(), value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_parse_run_command() {
        let cli = Cli::try_parse_from([
            "sshjob",
            "run",
            "worker1",
            "./tool %%data%%",
            "--dir",
            "/var/jobs",
            "--input",
            "data=@input.csv",
            "--output",
            "result=out/result.txt",
        ])
        .unwrap();

        match cli.command {
            Commands::Run {
                node,
                template,
                dir,
                inputs,
                outputs,
                ..
            } => {
                assert_eq!(node, "worker1");
                assert_eq!(template, "./tool %%data%%");
                assert_eq!(dir, "/var/jobs");
                assert_eq!(inputs, vec!["data=@input.csv"]);
                assert_eq!(outputs, vec!["result=out/result.txt"]);
            }
            _ => panic!("expected run subcommand"),
        }
    }

    #[test]
    fn test_parse_key_val() {
        assert_eq!(
            parse_key_val("a=b").unwrap(),
            ("a".to_string(), "b".to_string())
        );
        assert_eq!(
            parse_key_val("a=b=c").unwrap(),
            ("a".to_string(), "b=c".to_string())
        );
        assert!(parse_key_val("no-equals").is_err());
        assert!(parse_key_val("=v").is_err());
    }
}
