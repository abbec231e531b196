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

//! Cross-invocation concurrency properties on one shared host.

mod common;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::Mutex;

use common::FakeTransport;
use sshjob::pool::HostLockRegistry;
use sshjob::transport::Transport;
use sshjob::{Input, Invocation, WorkerNode};

const ROOT: &str = "/var/jobs";

fn node() -> Arc<WorkerNode> {
    Arc::new(WorkerNode::new(
        "worker1".to_string(),
        22,
        "grid".to_string(),
        ROOT.to_string(),
    ))
}

#[tokio::test]
async fn test_concurrent_allocations_get_distinct_workspaces() {
    let fake = Arc::new(FakeTransport::with_root(ROOT));
    let registry = HostLockRegistry::new();
    let node = node();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let transport = Arc::clone(&fake) as Arc<dyn Transport>;
        let lock = registry.lock_for(&node.host);
        let node = Arc::clone(&node);
        handles.push(tokio::spawn(async move {
            let invocation = Invocation::allocate(transport, lock, node, HashMap::new())
                .await
                .unwrap();
            invocation.workspace().name().to_string()
        }));
    }

    let mut names = HashSet::new();
    for handle in handles {
        names.insert(handle.await.unwrap());
    }
    assert_eq!(names.len(), 8, "workspace names must be pairwise distinct");

    // Each directory exists exactly once under the root.
    let dirs: Vec<_> = fake
        .paths()
        .into_iter()
        .filter(|p| p.starts_with("/var/jobs/job"))
        .collect();
    assert_eq!(dirs.len(), 8);
}

#[tokio::test]
async fn test_allocator_retries_on_name_collision() {
    let fake = Arc::new(FakeTransport::with_root(ROOT));
    *fake.stat_collisions.lock().unwrap() = 3;

    let invocation = Invocation::allocate(
        Arc::clone(&fake) as Arc<dyn Transport>,
        Arc::new(Mutex::new(())),
        node(),
        HashMap::new(),
    )
    .await
    .unwrap();

    assert!(invocation.workspace().name().starts_with("job"));

    // Three probes reported a collision, so four stats ran in total.
    let stats = fake.ops().iter().filter(|op| op.kind == "stat").count();
    assert_eq!(stats, 4);
}

#[tokio::test]
async fn test_stage_in_sequences_are_never_interleaved_per_host() {
    let mut fake = FakeTransport::with_root(ROOT);
    // Delay between navigate and act so a missing lock would interleave.
    fake.race_delay = true;
    let fake = Arc::new(fake);
    let registry = HostLockRegistry::new();
    let node = node();

    let mut first = Invocation::allocate(
        Arc::clone(&fake) as Arc<dyn Transport>,
        registry.lock_for(&node.host),
        Arc::clone(&node),
        HashMap::new(),
    )
    .await
    .unwrap();
    let mut second = Invocation::allocate(
        Arc::clone(&fake) as Arc<dyn Transport>,
        registry.lock_for(&node.host),
        Arc::clone(&node),
        HashMap::new(),
    )
    .await
    .unwrap();

    fake.clear_ops();

    let ws_first = first.workspace().path().to_string();
    let ws_second = second.workspace().path().to_string();

    let stage_a = async {
        for i in 0..4 {
            first
                .stage_input(&format!("a{i}"), Input::file(format!("a{i}.dat"), "x"))
                .await
                .unwrap();
            tokio::task::yield_now().await;
        }
    };
    let stage_b = async {
        for i in 0..4 {
            second
                .stage_input(&format!("b{i}"), Input::file(format!("b{i}.dat"), "y"))
                .await
                .unwrap();
            tokio::task::yield_now().await;
        }
    };
    tokio::join!(stage_a, stage_b);

    // Every navigate (enter) must be immediately followed by its own
    // invocation's act (put) in the recorded order; another
    // invocation's operations may never split the pair.
    let ops = fake.ops();
    assert_eq!(ops.len(), 16);
    let mut i = 0;
    while i < ops.len() {
        let enter = &ops[i];
        assert_eq!(enter.kind, "enter");
        let put = &ops[i + 1];
        assert_eq!(put.kind, "put");
        let workspace = if enter.path == ws_first {
            &ws_first
        } else {
            assert_eq!(enter.path, ws_second);
            &ws_second
        };
        assert!(
            put.path.starts_with(&format!("{workspace}/")),
            "navigate into {} split from act on {}",
            enter.path,
            put.path
        );
        i += 2;
    }
}

#[tokio::test]
async fn test_filesystem_sequences_on_distinct_hosts_are_independent() {
    let registry = HostLockRegistry::new();
    let lock_one = registry.lock_for("worker1");
    let lock_two = registry.lock_for("worker2");

    let _held = lock_one.lock().await;
    assert!(
        lock_two.try_lock().is_ok(),
        "locks must be scoped per host identity"
    );
}
