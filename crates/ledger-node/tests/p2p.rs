//! In-process two-node P2P integration test. Replaces the teacher's
//! subprocess-spawning version: `ledger_p2p::ChannelNetwork` is an
//! in-process `tokio::mpsc` double with no real transport, so there is no
//! separate binary to spawn, dial, and drive over RPC — two `Node`
//! instances are wired together directly via `ChannelNetwork::connect`.

use std::sync::Arc;

use ledger_core::model::{Joint, WitnessSource};
use ledger_core::types::Address32;
use ledger_crypto::KeyPair;
use ledger_genesis::GenesisParams;
use ledger_node::compose::{compose_payment_unit, ComposeParams, FundingOutput};
use ledger_node::node::{bootstrap, current_timestamp};
use ledger_p2p::{ChannelNetwork, Network, P2pMessage};
use ledger_storage::Storage;

fn tempdir(tag: &str) -> std::path::PathBuf {
    let mut p = std::env::temp_dir();
    p.push(format!("ledger-node-p2p-{tag}-{}", std::process::id()));
    p
}

fn sorted_witness_keys() -> Vec<KeyPair> {
    let mut keys: Vec<KeyPair> = (0..ledger_core::constants::COUNT_WITNESSES)
        .map(|_| KeyPair::generate())
        .collect();
    keys.sort_by(|a, b| a.address.cmp(&b.address));
    keys
}

/// Node A broadcasts a freshly-composed payment joint; node B, wired to A
/// via a `ChannelNetwork` connection, ingests it off its own inbound queue
/// and ends up holding the identical unit.
#[tokio::test]
async fn broadcast_joint_propagates_to_connected_peer() {
    let witness_keys = sorted_witness_keys();
    let witnesses: Vec<Address32> = witness_keys.iter().map(|k| k.address.clone()).collect();
    let alice = &witness_keys[0];
    let bob = KeyPair::generate();

    let params = GenesisParams {
        alt: "1".to_string(),
        witnesses: witnesses.clone(),
        initial_allocation: vec![(alice.address.clone(), 1_000_000)],
    };

    // Both nodes boot from the same genesis params, the way two peers
    // syncing a shared devnet would each apply the same genesis file
    // before dialing each other.
    let storage_a = Arc::new(Storage::open(tempdir("node-a")).unwrap());
    let node_a = bootstrap(Arc::clone(&storage_a), "1".to_string(), Some(params.clone())).unwrap();
    let storage_b = Arc::new(Storage::open(tempdir("node-b")).unwrap());
    let node_b = bootstrap(Arc::clone(&storage_b), "1".to_string(), Some(params)).unwrap();
    let genesis_id = node_a.current_tip();
    assert_eq!(genesis_id, node_b.current_tip());

    let (network_a, _a_rx) = ChannelNetwork::new("a".to_string(), 8);
    let (network_b, mut b_rx) = ChannelNetwork::new("b".to_string(), 8);
    network_a.connect("b".to_string(), network_b.inbound_sender()).await;

    let unit = compose_payment_unit(ComposeParams {
        author: alice,
        author_definition: Some(alice.definition()),
        alt: "1".to_string(),
        parents: vec![genesis_id.clone()],
        last_ball_unit: Some(genesis_id.clone()),
        last_ball: storage_a.ball_of(&genesis_id).unwrap(),
        witnesses: WitnessSource::Inline(witnesses),
        timestamp: current_timestamp(),
        inputs: vec![FundingOutput {
            src_unit: genesis_id.clone(),
            src_message_index: 0,
            src_output_index: 0,
            amount: 1_000_000,
        }],
        recipients: vec![(bob.address.clone(), 400_000)],
        change_address: alice.address.clone(),
    })
    .unwrap();
    let unit_id = unit.unit_id.clone();

    let joint = Joint {
        unit,
        ball: None,
        skiplist_balls: None,
    };
    node_a.write_and_settle(joint.clone()).await.unwrap();

    network_a.broadcast_joint(&joint).await.unwrap();
    let received = b_rx.recv().await.unwrap();
    let received_joint = match received {
        P2pMessage::NewJoint { joint } => joint,
        other => panic!("expected NewJoint, got {other:?}"),
    };
    assert_eq!(received_joint.unit.unit_id, unit_id);

    node_b.ingest_joint(received_joint, Some("a".to_string())).await.unwrap();
    assert!(storage_b.unit_exists(&unit_id).unwrap());
    assert_eq!(
        storage_a.read_joint(&unit_id).unwrap().unwrap().unit,
        storage_b.read_joint(&unit_id).unwrap().unwrap().unit
    );
}

/// A node that requests a joint it doesn't have gets it back over the same
/// connection, driven explicitly via `answer_joint_request` — the shared
/// inbound queue carries no sender identity, so this exchange cannot be
/// handled by a generic `handle_p2p_message` loop (see its doc comment).
#[tokio::test]
async fn request_joint_is_answered_by_the_holding_peer() {
    let witness_keys = sorted_witness_keys();
    let witnesses: Vec<Address32> = witness_keys.iter().map(|k| k.address.clone()).collect();
    let alice = &witness_keys[0];

    let params = GenesisParams {
        alt: "1".to_string(),
        witnesses: witnesses.clone(),
        initial_allocation: vec![(alice.address.clone(), 1_000_000)],
    };
    let storage_a = Arc::new(Storage::open(tempdir("request-a")).unwrap());
    let node_a = bootstrap(Arc::clone(&storage_a), "1".to_string(), Some(params)).unwrap();
    let genesis_id = node_a.current_tip();

    let (network_a, mut a_rx) = ChannelNetwork::new("a".to_string(), 8);
    let (network_b, mut b_rx) = ChannelNetwork::new("b".to_string(), 8);
    network_b.connect("a".to_string(), network_a.inbound_sender()).await;
    network_a.connect("b".to_string(), network_b.inbound_sender()).await;

    network_b
        .request_joint(&"a".to_string(), &genesis_id)
        .await
        .unwrap();
    let requested = match a_rx.recv().await.unwrap() {
        P2pMessage::RequestJoint { unit_id } => unit_id,
        other => panic!("expected RequestJoint, got {other:?}"),
    };
    assert_eq!(requested, genesis_id);

    node_a
        .answer_joint_request(&network_a, "b", requested)
        .await
        .unwrap();

    let answered = match b_rx.recv().await.unwrap() {
        P2pMessage::JointResponse { unit_id, joint } => (unit_id, joint),
        other => panic!("expected JointResponse, got {other:?}"),
    };
    assert_eq!(answered.0, genesis_id);
    assert!(answered.1.is_some());
}
