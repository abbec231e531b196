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

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;

use sshjob::cli::{parse_key_val, Cli, Commands};
use sshjob::{
    test_connectivity, AuthMethod, CredentialProvider, Error, Input, Invocation, SessionPool,
    WorkerNode,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    sshjob::logging::init_logging(cli.verbose);

    match cli.command {
        Commands::Run {
            node,
            template,
            dir,
            inputs,
            outputs,
            identity,
            password,
            timeout,
            keep_workspace,
        } => {
            run_job(RunArgs {
                node,
                template,
                dir,
                inputs,
                outputs,
                identity,
                password,
                timeout,
                keep_workspace,
            })
            .await
        }
        Commands::Ping {
            node,
            dir,
            identity,
            password,
        } => ping(node, dir, identity, password).await,
    }
}

struct RunArgs {
    node: String,
    template: String,
    dir: String,
    inputs: Vec<String>,
    outputs: Vec<String>,
    identity: Option<PathBuf>,
    password: bool,
    timeout: Option<u64>,
    keep_workspace: bool,
}

fn provider_for(
    identity: Option<PathBuf>,
    password: bool,
) -> Result<Box<dyn CredentialProvider>> {
    if password {
        return Ok(Box::new(sshjob::auth::PromptCredentials));
    }
    let method = match identity {
        Some(path) => AuthMethod::with_key_file(path, None),
        None => AuthMethod::Agent,
    };
    Ok(Box::new(sshjob::auth::StaticCredentials::new(method)))
}

async fn run_job(args: RunArgs) -> Result<()> {
    let node = Arc::new(WorkerNode::parse(&args.node, &args.dir, None)?);
    let provider = provider_for(args.identity, args.password)?;
    let pool = SessionPool::new();

    let declared: HashMap<String, String> = args
        .outputs
        .iter()
        .map(|spec| parse_key_val(spec))
        .collect::<Result<_>>()
        .context("invalid --output declaration")?;

    let mut invocation =
        Invocation::open(&pool, provider.as_ref(), Arc::clone(&node), declared).await?;

    let staged = stage_inputs(&mut invocation, &args.inputs).await;
    let submitted = match staged {
        Ok(()) => invocation.submit(&args.template).await,
        Err(e) => Err(e),
    };

    let results = match submitted {
        Ok(()) => {
            invocation
                .await_results(args.timeout.map(Duration::from_secs))
                .await
        }
        Err(e) => Err(e),
    };

    if !args.keep_workspace {
        let report = invocation.cleanup().await;
        for warning in report.warnings() {
            eprintln!("cleanup: {} failed: {}", warning.step, warning.detail);
        }
    }
    pool.shutdown().await;

    match results {
        Ok(results) => {
            print!("{}", results.stdout);
            eprint!("{}", results.stderr);
            if !results.outputs.is_empty() {
                eprintln!();
                for (name, reference) in &results.outputs {
                    eprintln!("output {name}: {reference}");
                }
            }
            Ok(())
        }
        Err(Error::NonZeroExit {
            status,
            stdout,
            stderr,
        }) => {
            print!("{stdout}");
            eprint!("{stderr}");
            std::process::exit(status.min(255) as i32);
        }
        Err(e) => Err(e.into()),
    }
}

async fn stage_inputs(invocation: &mut Invocation, specs: &[String]) -> sshjob::Result<()> {
    for spec in specs {
        let (name, value) = parse_key_val(spec).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string())
        })?;

        let input = if let Some(path) = value.strip_prefix("@@") {
            Input::temp_file(tokio::fs::read(path).await?)
        } else if let Some(path) = value.strip_prefix('@') {
            Input::file(name.clone(), tokio::fs::read(path).await?)
        } else {
            Input::value(value)
        };

        invocation.stage_input(&name, input).await?;
    }
    Ok(())
}

async fn ping(
    node: String,
    dir: String,
    identity: Option<PathBuf>,
    password: bool,
) -> Result<()> {
    let node = WorkerNode::parse(&node, &dir, None)?;
    let provider = provider_for(identity, password)?;
    let pool = SessionPool::new();

    let outcome = async {
        let session = pool.session(&node, provider.as_ref()).await?;
        test_connectivity(session.as_ref(), &node).await
    }
    .await;
    pool.shutdown().await;

    match outcome {
        Ok(()) => {
            println!("{node}: ok ({})", node.root_dir);
            Ok(())
        }
        Err(e) => {
            println!("{node}: failed: {e}");
            std::process::exit(1);
        }
    }
}
