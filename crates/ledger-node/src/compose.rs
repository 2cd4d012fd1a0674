//! Builds a signed payment `Unit` from a funding output and a list of
//! recipients — the "Units are created by composition, then broadcast"
//! half of spec.md's model that the Validator/Writer pipeline only ever
//! consumes, never produces. Grounded on `ledger_genesis::apply_genesis`'s
//! build-then-hash sequence and `ledger_aa::handler::compose_response_unit`'s
//! placeholder-id-then-sign pattern, generalized to a keyed author instead
//! of an AA's keyless one.

use ledger_consensus::total_payload_size;
use ledger_core::error::{LedgerError, UnitError};
use ledger_core::model::{
    Author, Message, MessagePayload, Output, OutputVisibility, PayloadLocation, PaymentPayload,
    Input, Unit, WitnessSource,
};
use ledger_core::types::{Address32, Amount, BallId, UnitId};
use ledger_crypto::hash::{canonical_encode, sha256, unit_hash};
use ledger_crypto::KeyPair;

/// A funding output this composition spends: `(src_unit, src_message_index,
/// src_output_index, amount)`. The caller supplies `amount` because nothing
/// in this module queries an address index — callers compose units from
/// outputs they already know about (their own prior receipts).
pub struct FundingOutput {
    pub src_unit: UnitId,
    pub src_message_index: u32,
    pub src_output_index: u32,
    pub amount: Amount,
}

pub struct ComposeParams<'a> {
    pub author: &'a KeyPair,
    /// `Some` only the first time this address authors a unit; `None` once
    /// a definition is already on-chain for it (mirrors `check_authors`'s
    /// "author's own definition, else prior on-chain" resolution order).
    pub author_definition: Option<ledger_core::model::FormulaTree>,
    pub alt: String,
    pub parents: Vec<UnitId>,
    pub last_ball_unit: Option<UnitId>,
    pub last_ball: Option<BallId>,
    pub witnesses: WitnessSource,
    pub timestamp: i64,
    pub inputs: Vec<FundingOutput>,
    pub recipients: Vec<(Address32, Amount)>,
    /// Leftover funds return here. A zero-amount change output is still
    /// emitted so the payment's structure — and hence its commission — is
    /// fixed before the change amount itself is known.
    pub change_address: Address32,
}

fn build_payment_message(payment: &PaymentPayload) -> Result<Message, LedgerError> {
    let value = serde_json::to_value(MessagePayload::Payment(payment.clone()))
        .map_err(|e| ledger_core::error::FatalError::InvariantViolated(e.to_string()))?;
    let bytes = canonical_encode(&value, true);
    let payload_hash = ledger_core::types::Hash32::from_bytes(sha256(&bytes));
    Ok(Message {
        app: "payment".to_string(),
        payload_location: PayloadLocation::Inline,
        payload_hash,
        payload: Some(MessagePayload::Payment(payment.clone())),
    })
}

/// Composes, hashes, and signs a single-author payment unit.
///
/// Order matters: `unit_hash` excludes `authentifiers` entirely, so the
/// unit is built once with empty authentifiers, hashed, and only then
/// signed — the signature never needs to be part of what it signs over.
pub fn compose_payment_unit(p: ComposeParams<'_>) -> Result<Unit, LedgerError> {
    let input_total: Amount = p.inputs.iter().map(|i| i.amount).sum();
    let recipients_total: Amount = p.recipients.iter().map(|(_, a)| *a).sum();

    let inputs: Vec<Input> = p
        .inputs
        .iter()
        .map(|i| Input::Transfer {
            src_unit: i.src_unit.clone(),
            src_message_index: i.src_message_index,
            src_output_index: i.src_output_index,
        })
        .collect();

    let mut outputs: Vec<Output> = p
        .recipients
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
    outputs.push(Output {
        visibility: OutputVisibility::Revealed {
            address: p.change_address.clone(),
            amount: 0,
            blinding: None,
        },
        is_spent: false,
    });

    let skeleton_payment = PaymentPayload {
        asset: None,
        inputs: inputs.clone(),
        outputs,
    };
    let skeleton_message = build_payment_message(&skeleton_payment)?;

    let mut unit = Unit {
        unit_id: ledger_core::types::Hash32::from_bytes([0u8; 32]),
        version: ledger_core::constants::CURRENT_VERSION.to_string(),
        alt: p.alt.clone(),
        parent_units: p.parents.clone(),
        last_ball_unit: p.last_ball_unit.clone(),
        last_ball: p.last_ball.clone(),
        witnesses: p.witnesses.clone(),
        timestamp: p.timestamp,
        authors: vec![Author {
            address: p.author.address.clone(),
            definition: p.author_definition.clone(),
            authentifiers: Default::default(),
        }],
        messages: vec![skeleton_message],
        headers_commission: 0,
        payload_commission: 0,
        oversize_fee: 0,
        tps_fee: 0,
        burn_fee: 0,
    };

    // Commission depends only on message/payment structure — every
    // `Value::Number` costs a flat 8 bytes regardless of magnitude — so it
    // can be computed from the skeleton before the change amount is known.
    let commission = total_payload_size(&unit, 0)?;
    unit.payload_commission = commission;

    let change_amount = recipients_total
        .checked_add(commission)
        .and_then(|spent| input_total.checked_sub(spent))
        .ok_or_else(|| UnitError::PaymentDoesNotBalance {
            inputs: input_total,
            outputs: recipients_total + commission,
        })?;

    let mut final_payment = skeleton_payment;
    if let Some(change_output) = final_payment.outputs.last_mut() {
        change_output.visibility = OutputVisibility::Revealed {
            address: p.change_address.clone(),
            amount: change_amount,
            blinding: None,
        };
    }
    unit.messages = vec![build_payment_message(&final_payment)?];

    unit.unit_id = unit_hash(&unit);
    let signature = p.author.sign(unit.unit_id.as_bytes());
    unit.authors[0].authentifiers.insert(
        "r".to_string(),
        {
            use base64::Engine;
            base64::engine::general_purpose::STANDARD.encode(&signature.0)
        },
    );

    Ok(unit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger_core::types::Hash32;

    #[test]
    fn composes_a_balanced_single_input_payment() {
        let payer = KeyPair::generate();
        let recipient = KeyPair::generate();
        let genesis_unit = Hash32::from_bytes([1u8; 32]);

        let unit = compose_payment_unit(ComposeParams {
            author: &payer,
            author_definition: Some(payer.definition()),
            alt: "1".to_string(),
            parents: vec![genesis_unit.clone()],
            last_ball_unit: Some(genesis_unit.clone()),
            last_ball: Some(genesis_unit.clone()),
            witnesses: WitnessSource::FromUnit(genesis_unit.clone()),
            timestamp: 1000,
            inputs: vec![FundingOutput {
                src_unit: genesis_unit,
                src_message_index: 0,
                src_output_index: 0,
                amount: 1_000_000,
            }],
            recipients: vec![(recipient.address.clone(), 500_000)],
            change_address: payer.address.clone(),
        })
        .unwrap();

        assert_eq!(unit.authors.len(), 1);
        assert!(unit.authors[0].authentifiers.contains_key("r"));
        let Some(MessagePayload::Payment(payment)) = &unit.messages[0].payload else {
            panic!("expected payment payload");
        };
        assert_eq!(payment.outputs.len(), 2);
        let spent: Amount = payment
            .outputs
            .iter()
            .filter_map(|o| o.revealed_amount())
            .sum();
        assert_eq!(spent + unit.payload_commission, 1_000_000);
    }

    #[test]
    fn rejects_insufficient_input() {
        let payer = KeyPair::generate();
        let recipient = KeyPair::generate();
        let genesis_unit = Hash32::from_bytes([1u8; 32]);

        let result = compose_payment_unit(ComposeParams {
            author: &payer,
            author_definition: Some(payer.definition()),
            alt: "1".to_string(),
            parents: vec![genesis_unit.clone()],
            last_ball_unit: Some(genesis_unit.clone()),
            last_ball: Some(genesis_unit.clone()),
            witnesses: WitnessSource::FromUnit(genesis_unit.clone()),
            timestamp: 1000,
            inputs: vec![FundingOutput {
                src_unit: genesis_unit,
                src_message_index: 0,
                src_output_index: 0,
                amount: 100,
            }],
            recipients: vec![(recipient.address, 500_000)],
            change_address: payer.address.clone(),
        });
        assert!(result.is_err());
    }
}
