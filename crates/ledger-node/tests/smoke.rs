//! In-process end-to-end smoke test (spec.md §8 scenario 1: genesis plus
//! two payments). Replaces the teacher's subprocess-spawning smoke test:
//! `ledger_p2p::ChannelNetwork` is an in-process `tokio::mpsc` double with
//! no real transport, so there is no separate binary to spawn and drive
//! over HTTP — the node is exercised directly as a library here instead.

use std::sync::Arc;

use ledger_core::model::WitnessSource;
use ledger_core::types::Address32;
use ledger_crypto::KeyPair;
use ledger_genesis::GenesisParams;
use ledger_node::compose::{compose_payment_unit, ComposeParams, FundingOutput};
use ledger_node::node::{bootstrap, current_timestamp};
use ledger_storage::Storage;

fn tempdir(tag: &str) -> std::path::PathBuf {
    let mut p = std::env::temp_dir();
    p.push(format!("ledger-node-smoke-{tag}-{}", std::process::id()));
    p
}

fn sorted_witness_keys() -> Vec<KeyPair> {
    let mut keys: Vec<KeyPair> = (0..ledger_core::constants::COUNT_WITNESSES)
        .map(|_| KeyPair::generate())
        .collect();
    keys.sort_by(|a, b| a.address.cmp(&b.address));
    keys
}

#[tokio::test]
async fn genesis_then_two_payments_settle_with_correct_balances() {
    let storage = Arc::new(Storage::open(tempdir("two-payments")).unwrap());
    let witness_keys = sorted_witness_keys();
    let witnesses: Vec<Address32> = witness_keys.iter().map(|k| k.address.clone()).collect();
    let alice = &witness_keys[0];
    let bob = KeyPair::generate();
    let carol = KeyPair::generate();

    let params = GenesisParams {
        alt: "1".to_string(),
        witnesses: witnesses.clone(),
        initial_allocation: vec![(alice.address.clone(), 1_000_000)],
    };
    let node = bootstrap(Arc::clone(&storage), "1".to_string(), Some(params)).unwrap();
    let genesis_id = node.current_tip();
    assert!(storage.read_unit_props(&genesis_id).unwrap().unwrap().is_stable);

    // First payment: Alice -> Bob, parented directly on genesis.
    let unit1 = compose_payment_unit(ComposeParams {
        author: alice,
        author_definition: Some(alice.definition()),
        alt: "1".to_string(),
        parents: vec![genesis_id.clone()],
        last_ball_unit: Some(genesis_id.clone()),
        last_ball: storage.ball_of(&genesis_id).unwrap(),
        witnesses: WitnessSource::Inline(witnesses.clone()),
        timestamp: current_timestamp(),
        inputs: vec![FundingOutput {
            src_unit: genesis_id.clone(),
            src_message_index: 0,
            src_output_index: 0,
            amount: 1_000_000,
        }],
        recipients: vec![(bob.address.clone(), 300_000)],
        change_address: alice.address.clone(),
    })
    .unwrap();
    let unit1_id = unit1.unit_id.clone();
    let unit1_commission = unit1.payload_commission;
    let outcome1 = node
        .write_and_settle(ledger_core::model::Joint {
            unit: unit1,
            ball: None,
            skiplist_balls: None,
        })
        .await
        .unwrap();
    assert!(matches!(outcome1.sequence, ledger_core::model::Sequence::Good));

    let alice_change = 1_000_000 - 300_000 - unit1_commission;

    // Second payment: Bob -> Carol, spending the output the first payment
    // just created, parented on the first payment (not genesis).
    let unit2 = compose_payment_unit(ComposeParams {
        author: &bob,
        author_definition: Some(bob.definition()),
        alt: "1".to_string(),
        parents: vec![unit1_id.clone()],
        last_ball_unit: Some(genesis_id.clone()),
        last_ball: storage.ball_of(&genesis_id).unwrap(),
        witnesses: WitnessSource::Inline(witnesses.clone()),
        timestamp: current_timestamp(),
        inputs: vec![FundingOutput {
            src_unit: unit1_id.clone(),
            src_message_index: 0,
            src_output_index: 0,
            amount: 300_000,
        }],
        recipients: vec![(carol.address.clone(), 150_000)],
        change_address: bob.address.clone(),
    })
    .unwrap();
    let unit2_id = unit2.unit_id.clone();
    let unit2_commission = unit2.payload_commission;
    let outcome2 = node
        .write_and_settle(ledger_core::model::Joint {
            unit: unit2,
            ball: None,
            skiplist_balls: None,
        })
        .await
        .unwrap();
    assert!(matches!(outcome2.sequence, ledger_core::model::Sequence::Good));

    let bob_change = 300_000 - 150_000 - unit2_commission;

    // Every output is exactly where the payment chain put it: Alice's
    // change at unit1:0:1, Carol's receipt and Bob's change at unit2.
    let alice_output = storage.read_output(&unit1_id, 0, 1).unwrap().unwrap();
    assert_eq!(alice_output.revealed_amount(), Some(alice_change));

    let carol_output = storage.read_output(&unit2_id, 0, 0).unwrap().unwrap();
    assert_eq!(carol_output.revealed_amount(), Some(150_000));
    let bob_output = storage.read_output(&unit2_id, 0, 1).unwrap().unwrap();
    assert_eq!(bob_output.revealed_amount(), Some(bob_change));

    // The tip tracks main-chain advancement (tentative, pre-stabilization)
    // rather than only advancing when a unit stabilizes, so it now points
    // at the second payment even though neither payment has reached
    // majority witnessed level yet.
    assert_eq!(node.current_tip(), unit2_id);
}

#[tokio::test]
async fn restart_recovers_tip_from_storage() {
    let dir = tempdir("restart");
    let witness_keys = sorted_witness_keys();
    let witnesses: Vec<Address32> = witness_keys.iter().map(|k| k.address.clone()).collect();
    let alice = &witness_keys[0];

    let genesis_id = {
        let storage = Arc::new(Storage::open(&dir).unwrap());
        let params = GenesisParams {
            alt: "1".to_string(),
            witnesses: witnesses.clone(),
            initial_allocation: vec![(alice.address.clone(), 1_000_000)],
        };
        let node = bootstrap(storage, "1".to_string(), Some(params)).unwrap();
        node.current_tip()
    };

    // Reopening the same data directory with no genesis params must
    // recover, not fail loudly demanding genesis again.
    let storage = Arc::new(Storage::open(&dir).unwrap());
    let node = bootstrap(storage, "1".to_string(), None).unwrap();
    assert_eq!(node.current_tip(), genesis_id);
}
