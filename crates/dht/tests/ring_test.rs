//! End-to-end tests of the ring protocol over the in-process network.
//!
//! # Test Strategy
//!
//! 1. **Topology**: joins converge to the correct successor/predecessor ring
//! 2. **Ownership**: lookups and key placement follow `(pred, node]` ranges
//! 3. **Handoff**: keys survive joins exactly once
//! 4. **Notify**: rejection is benign, repetition is idempotent
//! 5. **Failures**: dead successors and predecessors are routed around
//! 6. **Races**: writes that meet a moving key range are neither lost nor duplicated

use corelib::{Id, IdentifierSpace, NodeAddr, NodeInfo, TableRep};
use dht::{DhtError, LocalNetwork, Membership, Node, NodeConfig, NotifyOutcome, Stabilizer};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// Helpers
// ============================================================================

fn config(bits: u8) -> NodeConfig {
    NodeConfig {
        bits,
        rpc_timeout: Duration::from_millis(200),
        stabilize_interval: Duration::from_millis(20),
        ..NodeConfig::default()
    }
}

fn spawn_node(net: &Arc<LocalNetwork>, id: u64, bits: u8) -> Arc<Node> {
    let info = NodeInfo::new(Id(id), format!("node-{}", id));
    let node = Node::new(info, config(bits), net.clone()).unwrap();
    net.register(&node);
    node
}

/// Runs maintenance cycles on every node, then fills all fingers.
async fn converge(nodes: &[Arc<Node>], rounds: usize) {
    for _ in 0..rounds {
        for node in nodes {
            node.run_cycle().await;
        }
    }
    for node in nodes {
        node.fix_all_fingers().await.unwrap();
    }
}

/// Builds a ring by joining `ids` in order through the first node.
async fn ring(net: &Arc<LocalNetwork>, ids: &[u64], bits: u8) -> Vec<Arc<Node>> {
    let first = spawn_node(net, ids[0], bits);
    first.create();
    let mut nodes = vec![first];
    for id in &ids[1..] {
        let node = spawn_node(net, *id, bits);
        node.join(&nodes[0].info().addr).await.unwrap();
        nodes.push(node);
    }
    converge(&nodes, 4).await;
    nodes
}

/// Some key whose hash lands exactly on `target`.
fn key_hashing_to(space: &IdentifierSpace, target: Id) -> String {
    (0..100_000)
        .map(|i| format!("key-{}", i))
        .find(|key| space.hash_key(key) == target)
        .expect("no key hashes to target")
}

/// The node whose range `(pred, node]` contains `id`, from the sorted ids.
fn expected_owner(space: &IdentifierSpace, ids: &[u64], id: Id) -> u64 {
    let mut sorted = ids.to_vec();
    sorted.sort_unstable();
    for (i, n) in sorted.iter().enumerate() {
        let pred = sorted[(i + sorted.len() - 1) % sorted.len()];
        if space.in_half_open(Id(pred), id, Id(*n)) {
            return *n;
        }
    }
    unreachable!("ranges cover the ring")
}

fn node_by_id(nodes: &[Arc<Node>], id: u64) -> &Arc<Node> {
    nodes.iter().find(|n| n.id() == Id(id)).unwrap()
}

// ============================================================================
// Topology
// ============================================================================

#[tokio::test]
async fn test_example_ring_of_eight() {
    let net = LocalNetwork::new();
    let nodes = ring(&net, &[1, 4, 6], 3).await;
    let (n1, n4, n6) = (&nodes[0], &nodes[1], &nodes[2]);

    assert_eq!(n1.successor().id, Id(4));
    assert_eq!(n4.successor().id, Id(6));
    assert_eq!(n6.successor().id, Id(1));
    assert_eq!(n1.predecessor().map(|p| p.id), Some(Id(6)));
    assert_eq!(n4.predecessor().map(|p| p.id), Some(Id(1)));
    assert_eq!(n6.predecessor().map(|p| p.id), Some(Id(4)));

    assert_eq!(n1.find_successor(Id(5)).await.unwrap().id, Id(6));

    let key = key_hashing_to(n1.space(), Id(5));
    n1.add(&key, "five").await.unwrap();
    assert_eq!(n6.get_local(&key), vec!["five".to_string()]);
    assert!(n1.get_local(&key).is_empty());
    assert!(n4.get_local(&key).is_empty());
    for node in &nodes {
        assert_eq!(node.get(&key).await.unwrap(), vec!["five".to_string()]);
    }
}

#[tokio::test]
async fn test_fingers_point_at_successors_of_starts() {
    let net = LocalNetwork::new();
    let nodes = ring(&net, &[1, 4, 6], 3).await;
    let finger_ids = |n: &Arc<Node>| n.fingers().iter().map(|f| f.id).collect::<Vec<_>>();
    // Node 1: starts 2, 3, 5.
    assert_eq!(finger_ids(&nodes[0]), vec![Id(4), Id(4), Id(6)]);
    // Node 6: starts 7, 0, 2.
    assert_eq!(finger_ids(&nodes[2]), vec![Id(1), Id(1), Id(4)]);
}

#[tokio::test]
async fn test_lookups_agree_with_ranges() {
    let net = LocalNetwork::new();
    let ids = [3u64, 40, 77, 130, 200, 251];
    let nodes = ring(&net, &ids, 8).await;
    let space = nodes[0].space().clone();
    for node in &nodes {
        for target in (0..256u64).step_by(7) {
            let owner = node.find_successor(Id(target)).await.unwrap();
            assert_eq!(owner.id, Id(expected_owner(&space, &ids, Id(target))));
        }
        assert_eq!(node.membership(), Membership::Stable);
    }
}

#[tokio::test]
async fn test_join_with_taken_id_fails() {
    let net = LocalNetwork::new();
    let nodes = ring(&net, &[1, 4], 3).await;
    let impostor = Node::new(NodeInfo::new(Id(4), "impostor"), config(3), net.clone()).unwrap();
    net.register(&impostor);
    let err = impostor.join(&nodes[0].info().addr).await.unwrap_err();
    assert!(matches!(err, DhtError::Failed(ref op) if op == "join"));
}

#[tokio::test]
async fn test_join_through_unknown_address_fails() {
    let net = LocalNetwork::new();
    let node = spawn_node(&net, 2, 3);
    let err = node.join(&NodeAddr::from("nowhere")).await.unwrap_err();
    assert!(matches!(err, DhtError::Failed(_)));
}

// ============================================================================
// Handoff
// ============================================================================

#[tokio::test]
async fn test_handoff_keeps_every_key_exactly_once() {
    let net = LocalNetwork::new();
    let bits = 8;
    let first = spawn_node(&net, 10, bits);
    first.create();
    let mut nodes = vec![first.clone()];
    let mut inserted = BTreeSet::new();

    for i in 0..40 {
        let key = format!("before-{}", i);
        first.add(&key, "v").await.unwrap();
        inserted.insert(key);
    }

    for (round, id) in [100u64, 200, 50, 150].into_iter().enumerate() {
        let node = spawn_node(&net, id, bits);
        node.join(&first.info().addr).await.unwrap();
        nodes.push(node);
        // Writes while the ring is still settling.
        for i in 0..10 {
            let key = format!("during-{}-{}", round, i);
            nodes[i % nodes.len()].add(&key, "v").await.unwrap();
            inserted.insert(key);
        }
        nodes[0].run_cycle().await;
    }
    converge(&nodes, 12).await;

    let ids: Vec<u64> = nodes.iter().map(|n| n.id().value()).collect();
    let space = first.space().clone();
    let mut seen = BTreeSet::new();
    for node in &nodes {
        for row in node.bindings().entries {
            let owner = expected_owner(&space, &ids, space.hash_key(&row.key));
            assert_eq!(owner, node.id().value(), "{} held by wrong node", row.key);
            assert!(seen.insert(row.key.clone()), "{} held twice", row.key);
        }
    }
    assert_eq!(seen, inserted);

    for key in &inserted {
        assert_eq!(nodes[3].get(key).await.unwrap(), vec!["v".to_string()]);
    }
}

#[tokio::test]
async fn test_add_and_delete_are_idempotent_through_routing() {
    let net = LocalNetwork::new();
    let nodes = ring(&net, &[1, 4, 6], 3).await;
    let key = key_hashing_to(nodes[0].space(), Id(3));

    nodes[0].add(&key, "a").await.unwrap();
    nodes[2].add(&key, "a").await.unwrap();
    nodes[1].add(&key, "b").await.unwrap();
    assert_eq!(nodes[0].get(&key).await.unwrap(), vec!["a".to_string(), "b".to_string()]);

    nodes[2].delete(&key, "missing").await.unwrap();
    nodes[2].delete("no-such-key", "a").await.unwrap();
    assert_eq!(node_by_id(&nodes, 4).get_local(&key).len(), 2);

    nodes[0].delete(&key, "a").await.unwrap();
    nodes[0].delete(&key, "a").await.unwrap();
    assert_eq!(nodes[1].get(&key).await.unwrap(), vec!["b".to_string()]);
}

#[tokio::test]
async fn test_stale_owner_refuses_and_routing_follows_the_key() {
    let net = LocalNetwork::new();
    let n4 = spawn_node(&net, 4, 3);
    n4.create();
    let key = key_hashing_to(n4.space(), Id(0));
    n4.add(&key, "v").await.unwrap();

    // Joining 1 moves hash 0 out of (1, 4].
    let n1 = spawn_node(&net, 1, 3);
    n1.join(&n4.info().addr).await.unwrap();
    assert_eq!(n1.get_local(&key), vec!["v".to_string()]);
    assert!(n4.get_local(&key).is_empty());

    // A writer that resolved the owner before the join.
    let stale = n1.client().delete(n4.info(), &key, "v").await.unwrap_err();
    assert!(matches!(stale, DhtError::NotOwner(_)));
    assert!(matches!(n1.client().get(n4.info(), &key).await, Err(DhtError::NotOwner(_))));

    // 4 still believes it is alone; routing from it must reach 1 anyway.
    assert_eq!(n4.get(&key).await.unwrap(), vec!["v".to_string()]);
    n4.delete(&key, "v").await.unwrap();
    assert!(n1.get_local(&key).is_empty());

    converge(&[n4.clone(), n1.clone()], 5).await;
    assert!(n1.get_local(&key).is_empty());
    assert!(n4.get_local(&key).is_empty());
    assert!(n4.get(&key).await.unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_writes_racing_joins_land_exactly_once() {
    let net = LocalNetwork::new();
    let bits = 8;
    let nodes = ring(&net, &[10, 130], bits).await;
    let keys: Vec<String> = (0..40).map(|i| format!("race-{}", i)).collect();
    for key in &keys {
        nodes[0].add(key, "old").await.unwrap();
    }
    let stabilizers: Vec<Stabilizer> = nodes.iter().cloned().map(Stabilizer::spawn).collect();

    let writer = {
        let entry = nodes[1].clone();
        let keys = keys.clone();
        tokio::spawn(async move {
            for key in &keys {
                entry.add(key, "new").await?;
                entry.delete(key, "old").await?;
            }
            Ok::<_, DhtError>(())
        })
    };
    let joiner = {
        let net = net.clone();
        let bootstrap = nodes[0].info().addr.clone();
        tokio::spawn(async move {
            let mut joined = Vec::new();
            for id in [60u64, 200, 90, 170] {
                let node = spawn_node(&net, id, bits);
                node.join(&bootstrap).await?;
                joined.push(node);
                for node in &joined {
                    node.run_cycle().await;
                }
            }
            Ok::<_, DhtError>(joined)
        })
    };

    writer.await.unwrap().unwrap();
    let joined = joiner.await.unwrap().unwrap();
    for stabilizer in stabilizers {
        stabilizer.shutdown().await;
    }

    let all: Vec<Arc<Node>> = nodes.iter().chain(joined.iter()).cloned().collect();
    converge(&all, 12).await;

    let ids: Vec<u64> = all.iter().map(|n| n.id().value()).collect();
    let space = all[0].space().clone();
    for key in &keys {
        let holders: Vec<u64> = all
            .iter()
            .filter(|n| !n.get_local(key).is_empty())
            .map(|n| n.id().value())
            .collect();
        assert_eq!(holders, vec![expected_owner(&space, &ids, space.hash_key(key))], "{}", key);
        assert_eq!(all[2].get(key).await.unwrap(), vec!["new".to_string()], "{}", key);
    }
}

// ============================================================================
// Notify
// ============================================================================

#[tokio::test]
async fn test_repeated_notify_transfers_once() {
    let net = LocalNetwork::new();
    let n4 = spawn_node(&net, 4, 3);
    n4.create();
    let space = n4.space().clone();
    let owned_by_one = key_hashing_to(&space, Id(0));
    let owned_by_four = key_hashing_to(&space, Id(3));
    n4.add_local(&owned_by_one, "x");
    n4.add_local(&owned_by_four, "y");

    let n1 = spawn_node(&net, 1, 3);
    let first = n1.client().notify(n4.info(), TableRep::new(n1.info().clone())).await.unwrap();
    let NotifyOutcome::Accepted(batch) = first else {
        panic!("first notify should be accepted");
    };
    assert_eq!(batch.keys().collect::<Vec<_>>(), vec![owned_by_one.as_str()]);
    assert_eq!(n4.predecessor().map(|p| p.id), Some(Id(1)));

    let second = n1.client().notify(n4.info(), TableRep::new(n1.info().clone())).await.unwrap();
    assert_eq!(second, NotifyOutcome::Accepted(TableRep::new(n4.info().clone())));
    assert_eq!(n4.predecessor().map(|p| p.id), Some(Id(1)));
    assert_eq!(n4.get_local(&owned_by_four), vec!["y".to_string()]);
}

#[tokio::test]
async fn test_notify_from_farther_node_is_rejected() {
    let net = LocalNetwork::new();
    let n6 = spawn_node(&net, 6, 3);
    n6.create();
    assert!(n6.notify(&NodeInfo::new(Id(4), "node-4")).is_some());

    // 2 is not between 4 and 6: a closer predecessor already holds the slot.
    let n2 = spawn_node(&net, 2, 3);
    let outcome = n2.client().notify(n6.info(), TableRep::new(n2.info().clone())).await.unwrap();
    assert_eq!(outcome, NotifyOutcome::Rejected);
    assert_eq!(n6.predecessor().map(|p| p.id), Some(Id(4)));
}

// ============================================================================
// Logical clock
// ============================================================================

#[tokio::test]
async fn test_clocks_advance_on_every_exchange() {
    let net = LocalNetwork::new();
    let nodes = ring(&net, &[1, 4, 6], 3).await;
    let (a, b) = (&nodes[0], &nodes[1]);

    for _ in 0..5 {
        let (a_before, b_before) = (a.clock().now(), b.clock().now());
        a.client().get_succ(b.info()).await.unwrap();
        let (a_after, b_after) = (a.clock().now(), b.clock().now());
        assert!(b_after > b_before);
        assert!(a_after > a_before);
        // The reply causally follows the request.
        assert!(a_after > b_after);

        let (a_before, b_before) = (a_after, b_after);
        b.client().get_pred(a.info()).await.unwrap();
        assert!(a.clock().now() > a_before);
        assert!(b.clock().now() > b_before);
    }
}

// ============================================================================
// Failures
// ============================================================================

#[tokio::test]
async fn test_ring_heals_around_failed_node() {
    let net = LocalNetwork::new();
    let nodes = ring(&net, &[1, 4, 6], 3).await;
    net.fail(&nodes[1].info().addr);
    let live = vec![nodes[0].clone(), nodes[2].clone()];
    converge(&live, 3).await;

    assert_eq!(nodes[0].successor().id, Id(6));
    assert_eq!(nodes[2].successor().id, Id(1));
    assert_eq!(nodes[2].predecessor().map(|p| p.id), Some(Id(1)));
    assert_eq!(nodes[0].find_successor(Id(3)).await.unwrap().id, Id(6));
    assert!(nodes[0].fingers().iter().all(|f| f.id != Id(4)));
}

#[tokio::test]
async fn test_lookup_failure_is_named() {
    let net = LocalNetwork::new();
    let nodes = ring(&net, &[1, 4, 6], 3).await;
    net.fail(&nodes[1].info().addr);
    net.fail(&nodes[2].info().addr);

    let err = nodes[0].find_successor(Id(5)).await.unwrap_err();
    assert!(matches!(err, DhtError::Failed(ref op) if op == "find"));
    assert!(nodes[0].get("anything").await.is_err());
}

#[tokio::test]
async fn test_dropped_node_is_unreachable() {
    let net = LocalNetwork::new();
    let mut nodes = ring(&net, &[1, 4], 3).await;
    let gone = nodes.pop().unwrap();
    let addr = gone.info().addr.clone();
    drop(gone);
    assert!(!net.is_reachable(&addr));
    assert!(nodes[0].client().is_failed(&addr).await);
}

// ============================================================================
// Background task
// ============================================================================

#[tokio::test]
async fn test_stabilizer_task_converges_ring() {
    let net = LocalNetwork::new();
    let bits = 16;
    let ids = [1000u64, 20000, 45000, 60000];
    let first = spawn_node(&net, ids[0], bits);
    first.create();
    let mut nodes = vec![first.clone()];
    for id in &ids[1..] {
        let node = spawn_node(&net, *id, bits);
        node.join(&first.info().addr).await.unwrap();
        nodes.push(node);
    }

    let stabilizers: Vec<Stabilizer> = nodes.iter().cloned().map(Stabilizer::spawn).collect();
    tokio::time::sleep(Duration::from_millis(600)).await;
    for stabilizer in stabilizers {
        stabilizer.shutdown().await;
    }

    for (i, node) in nodes.iter().enumerate() {
        let next = ids[(i + 1) % ids.len()];
        assert_eq!(node.successor().id, Id(next));
        let prev = ids[(i + ids.len() - 1) % ids.len()];
        assert_eq!(node.predecessor().map(|p| p.id), Some(Id(prev)));
    }
}
