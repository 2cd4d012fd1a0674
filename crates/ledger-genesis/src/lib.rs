//! Builds the genesis unit and writes it directly into `Storage`, bypassing
//! the Validator/Writer pipeline entirely — genesis has no parents to
//! validate against and is definitionally already stable at MCI 0.
//! Grounded on `chronx_genesis::apply_genesis`'s direct-to-`StateDb` write
//! (no PoW, no signatures, no prior state) generalized from account
//! balances and time-locks to the unit/output/witness-list shape spec.md
//! assumes but does not construct.

pub mod params;

pub use params::GenesisParams;

use ledger_core::constants::COUNT_WITNESSES;
use ledger_core::error::{FatalError, LedgerError, UnitError};
use ledger_core::model::{
    Author, Input, Message, MessagePayload, Output, OutputVisibility, PayloadLocation,
    PaymentPayload, Unit, UnitProps, WitnessSource,
};
use ledger_core::types::{Address32, UnitId};
use ledger_storage::{Storage, StoredUnit};
use tracing::info;

/// Genesis is timestamped at the Unix epoch — there is no "before genesis"
/// to measure a real clock against, and a fixed constant keeps `unit_hash`
/// reproducible across every node that boots from the same `GenesisParams`.
pub const GENESIS_TIMESTAMP: i64 = 0;

/// The address of the genesis issuer: a `["sig", {"pubkey": ""}]` definition
/// nobody holds the secret key for. `check_authors` never runs against this
/// unit (genesis bypasses the Validator), so the missing key is not a gap —
/// it is simply never exercised.
pub fn genesis_issuer_definition() -> ledger_core::model::FormulaTree {
    serde_json::json!(["sig", {"pubkey": ""}])
}

pub fn genesis_issuer_address() -> Address32 {
    ledger_crypto::hash::address_from_definition(&genesis_issuer_definition())
}

/// Applies `params` to an empty `Storage`, returning the genesis unit's id.
///
/// # Errors
/// Returns `UnitError::WrongWitnessCount` if `params.witnesses` does not
/// have exactly `COUNT_WITNESSES` entries, since every later validity check
/// on every other unit assumes that invariant already holds.
pub fn apply_genesis(storage: &Storage, params: &GenesisParams) -> Result<UnitId, LedgerError> {
    info!(alt = %params.alt, "applying genesis state");

    if params.witnesses.len() != COUNT_WITNESSES {
        return Err(UnitError::WrongWitnessCount {
            expected: COUNT_WITNESSES,
            got: params.witnesses.len(),
        }
        .into());
    }
    let mut sorted_witnesses = params.witnesses.clone();
    sorted_witnesses.sort();
    if sorted_witnesses != params.witnesses {
        return Err(UnitError::WitnessListNotSorted.into());
    }

    let total: u64 = params.initial_allocation.iter().map(|(_, a)| *a).sum();
    let outputs: Vec<Output> = params
        .initial_allocation
        .iter()
        .map(|(address, amount)| Output {
            visibility: OutputVisibility::Revealed {
                address: address.clone(),
                amount: *amount,
                blinding: None,
            },
            is_spent: false,
        })
        .collect();

    let payment = PaymentPayload {
        asset: None,
        inputs: vec![Input::Issue {
            serial_number: 0,
            amount: total,
        }],
        outputs,
    };
    let payload_value = serde_json::to_value(MessagePayload::Payment(payment.clone()))
        .map_err(|e| FatalError::InvariantViolated(e.to_string()))?;
    let payload_bytes = ledger_crypto::hash::canonical_encode(&payload_value, true);
    let payload_hash =
        ledger_core::types::Hash32::from_bytes(ledger_crypto::hash::sha256(&payload_bytes));

    let message = Message {
        app: "payment".to_string(),
        payload_location: PayloadLocation::Inline,
        payload_hash,
        payload: Some(MessagePayload::Payment(payment)),
    };

    let issuer = genesis_issuer_address();
    let author = Author {
        address: issuer,
        definition: Some(genesis_issuer_definition()),
        authentifiers: Default::default(),
    };

    let mut unit = Unit {
        unit_id: ledger_core::types::Hash32::from_bytes([0u8; 32]),
        version: ledger_core::constants::CURRENT_VERSION.to_string(),
        alt: params.alt.clone(),
        parent_units: Vec::new(),
        last_ball_unit: None,
        last_ball: None,
        witnesses: WitnessSource::Inline(params.witnesses.clone()),
        timestamp: GENESIS_TIMESTAMP,
        authors: vec![author],
        messages: vec![message],
        headers_commission: 0,
        payload_commission: 0,
        oversize_fee: 0,
        tps_fee: 0,
        burn_fee: 0,
    };
    unit.unit_id = ledger_crypto::hash::unit_hash(&unit);

    let ball = ledger_crypto::hash::ball_hash(&unit.unit_id, &[], &[], false);
    let mut props = UnitProps::new_unwritten(unit.unit_id.clone(), 0, 0);
    props.is_on_main_chain = true;
    props.is_stable = true;
    props.main_chain_index = Some(0);
    props.latest_included_mc_index = Some(0);
    props.ball = Some(ball.clone());

    for (msg_index, output) in outputs_with_index(&unit) {
        storage.put_output(&unit.unit_id, 0, msg_index, output)?;
    }
    storage.put_stored_unit(&StoredUnit {
        unit: unit.clone(),
        props,
    })?;
    storage.put_ball(&unit.unit_id, &ball)?;
    storage.flush()?;

    info!(
        unit_id = %unit.unit_id,
        witnesses = params.witnesses.len(),
        total_supply = total,
        "genesis unit committed"
    );
    Ok(unit.unit_id)
}

fn outputs_with_index(unit: &Unit) -> Vec<(u32, &Output)> {
    match &unit.messages[0].payload {
        Some(MessagePayload::Payment(p)) => {
            p.outputs.iter().enumerate().map(|(i, o)| (i as u32, o)).collect()
        }
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tempdir() -> std::path::PathBuf {
        let mut p = std::env::temp_dir();
        p.push(format!("ledger-genesis-test-{}", std::process::id()));
        p
    }

    fn witnesses() -> Vec<Address32> {
        let mut v: Vec<Address32> = (0..COUNT_WITNESSES as u8)
            .map(|i| Address32::from_string(format!("{}", (b'A' + i) as char).repeat(32)).unwrap())
            .collect();
        v.sort();
        v
    }

    #[test]
    fn genesis_unit_is_stable_at_mci_zero() {
        let dir = tempdir();
        let storage = Storage::open(&dir).unwrap();
        let params = GenesisParams {
            alt: "1".to_string(),
            witnesses: witnesses(),
            initial_allocation: vec![(genesis_issuer_address(), 1_000_000)],
        };
        let unit_id = apply_genesis(&storage, &params).unwrap();
        let props = storage.read_unit_props(&unit_id).unwrap().unwrap();
        assert!(props.is_stable);
        assert_eq!(props.main_chain_index, Some(0));
        assert!(props.ball.is_some());
    }

    #[test]
    fn rejects_wrong_witness_count() {
        let dir = tempdir();
        let storage = Storage::open(&dir).unwrap();
        let params = GenesisParams {
            alt: "1".to_string(),
            witnesses: witnesses()[..11].to_vec(),
            initial_allocation: vec![],
        };
        assert!(apply_genesis(&storage, &params).is_err());
    }
}
