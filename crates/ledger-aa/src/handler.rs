//! Wires `AaEngine` into `ledger_consensus::AaTriggerHandler`: reads the
//! triggering unit and the AA's stored body, runs the interpreter, and on
//! success composes the deterministic response unit the Stabilizer hands
//! back to a `Writer`. Grounded on the same stage-then-commit discipline as
//! `ledger-consensus::writer` — nothing here is persisted until the whole
//! trigger has completed without a fatal error.
//!
//! **Response-unit composition is deliberately minimal.** A full AA can
//! spend from an accumulated multi-input balance across many past
//! triggers; this composer only ever spends the exact output that funded
//! the trigger, which covers the two scenarios spec.md's worked examples
//! name (bounce-the-refund, pass-the-payment-through) but not general
//! balance accounting across AA state. A real node would need a UTXO
//! selector here; this is the one piece of the AA pipeline explicitly
//! scoped down rather than fully built (see `DESIGN.md`).

use ledger_core::error::{FatalError, LedgerError};
use ledger_core::model::{
    Author, Input, Message, MessagePayload, Output, OutputVisibility, PayloadLocation,
    PaymentPayload, Unit, WitnessSource,
};
use ledger_core::types::{Address32, Amount, Mci, UnitId};
use ledger_consensus::{AaOutcome, AaTriggerHandler};
use ledger_storage::{AaTriggerRecord, Storage};

use crate::interpreter::{AaEffects, AaEngine, AaExecutionOutcome, TriggerContext};

pub struct AaHandler;

impl AaTriggerHandler for AaHandler {
    fn handle_trigger(
        &mut self,
        trigger: &AaTriggerRecord,
        storage: &Storage,
        pinned_mci: Mci,
    ) -> AaOutcome {
        match self.run(trigger, storage, pinned_mci) {
            Ok(outcome) => outcome,
            Err(e) => AaOutcome::Bounce {
                message: format!("AA handler error: {e}"),
            },
        }
    }
}

impl AaHandler {
    fn run(
        &self,
        trigger: &AaTriggerRecord,
        storage: &Storage,
        pinned_mci: Mci,
    ) -> Result<AaOutcome, LedgerError> {
        let trigger_unit = storage
            .read_unit(&trigger.trigger_unit)?
            .ok_or_else(|| FatalError::InvariantViolated(format!(
                "trigger unit {} vanished before AA execution",
                trigger.trigger_unit
            )))?;
        let record = storage
            .read_aa_address(&trigger.aa_address)?
            .ok_or_else(|| FatalError::InvariantViolated(format!(
                "AA {} has a pending trigger but no stored body",
                trigger.aa_address
            )))?;
        let messages = record
            .body
            .get("messages")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();

        let (funding_src, amount) = find_funding_output(&trigger_unit, &trigger.aa_address)
            .ok_or_else(|| FatalError::InvariantViolated(format!(
                "trigger unit {} has no revealed output paying {}",
                trigger.trigger_unit, trigger.aa_address
            )))?;
        let sender = trigger_unit
            .authors
            .first()
            .map(|a| a.address.clone())
            .ok_or_else(|| FatalError::InvariantViolated("trigger unit has no authors".into()))?;

        let ctx = TriggerContext {
            address: sender.clone(),
            amount,
            data: find_data_payload(&trigger_unit),
        };

        match AaEngine::run_trigger(storage, &trigger.aa_address, &messages, &ctx, pinned_mci) {
            AaExecutionOutcome::Bounce { message, .. } => {
                Ok(AaOutcome::Bounce { message })
            }
            AaExecutionOutcome::Completed(effects) => {
                for (name, value) in &effects.state_var_writes {
                    storage.write_aa_state_var(&trigger.aa_address, name, value)?;
                }
                let unit = compose_response_unit(
                    &trigger.aa_address,
                    &trigger_unit,
                    &funding_src,
                    amount,
                    &effects,
                )?;
                Ok(AaOutcome::Response(unit))
            }
        }
    }
}

/// Locates the `(src_unit, src_message_index, src_output_index)` and amount
/// of the first revealed output in `unit` paying `aa_address`.
fn find_funding_output(
    unit: &Unit,
    aa_address: &Address32,
) -> Option<((UnitId, u32, u32), Amount)> {
    for (msg_idx, message) in unit.messages.iter().enumerate() {
        if let Some(MessagePayload::Payment(payment)) = &message.payload {
            for (out_idx, output) in payment.outputs.iter().enumerate() {
                if let OutputVisibility::Revealed { address, amount, .. } = &output.visibility {
                    if address == aa_address {
                        return Some((
                            (unit.unit_id.clone(), msg_idx as u32, out_idx as u32),
                            *amount,
                        ));
                    }
                }
            }
        }
    }
    None
}

/// `trigger.data` surfaces the first `data` message on the triggering unit,
/// if any — the conventional place a caller attaches AA parameters.
fn find_data_payload(unit: &Unit) -> serde_json::Value {
    for message in &unit.messages {
        if let Some(MessagePayload::Data(value)) = &message.payload {
            return value.clone();
        }
    }
    serde_json::Value::Null
}

/// Builds the (unsigned — AA addresses hold no key) response unit. Fees are
/// zero: this exercise does not implement a commission schedule for
/// protocol-generated units, only for user-composed ones (`ledger-consensus::
/// sizing`).
fn compose_response_unit(
    aa_address: &Address32,
    trigger_unit: &Unit,
    funding_src: &(UnitId, u32, u32),
    received: Amount,
    effects: &AaEffects,
) -> Result<Unit, LedgerError> {
    let total_sent: Amount = effects.payments.iter().map(|(_, a)| *a).sum();
    let change = received.saturating_sub(total_sent);

    let mut outputs: Vec<Output> = effects
        .payments
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
    if change > 0 {
        outputs.push(Output {
            visibility: OutputVisibility::Revealed {
                address: aa_address.clone(),
                amount: change,
                blinding: None,
            },
            is_spent: false,
        });
    }

    let payment = PaymentPayload {
        asset: None,
        inputs: vec![Input::Transfer {
            src_unit: funding_src.0.clone(),
            src_message_index: funding_src.1,
            src_output_index: funding_src.2,
        }],
        outputs,
    };
    let payload_value = serde_json::to_value(&MessagePayload::Payment(payment.clone()))
        .map_err(|e| FatalError::InvariantViolated(e.to_string()))?;
    let payload_bytes = ledger_crypto::hash::canonical_encode(&payload_value, true);
    let payload_hash = ledger_core::types::Hash32::from_bytes(ledger_crypto::hash::sha256(&payload_bytes));

    let message = Message {
        app: "payment".to_string(),
        payload_location: PayloadLocation::Inline,
        payload_hash,
        payload: Some(MessagePayload::Payment(payment)),
    };

    // The AA address already has a stored definition (recorded when its
    // defining unit stabilized); `author.definition` stays `None` here.
    let author = Author {
        address: aa_address.clone(),
        definition: None,
        authentifiers: Default::default(),
    };

    let mut unit = Unit {
        unit_id: ledger_core::types::Hash32::from_bytes([0u8; 32]),
        version: ledger_core::constants::CURRENT_VERSION.to_string(),
        alt: trigger_unit.alt.clone(),
        parent_units: vec![trigger_unit.unit_id.clone()],
        last_ball_unit: trigger_unit.last_ball_unit.clone(),
        last_ball: trigger_unit.last_ball.clone(),
        witnesses: WitnessSource::FromUnit(trigger_unit.unit_id.clone()),
        timestamp: trigger_unit.timestamp,
        authors: vec![author],
        messages: vec![message],
        headers_commission: 0,
        payload_commission: 0,
        oversize_fee: 0,
        tps_fee: 0,
        burn_fee: 0,
    };
    unit.unit_id = ledger_crypto::hash::unit_hash(&unit);
    Ok(unit)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tempdir() -> std::path::PathBuf {
        let mut p = std::env::temp_dir();
        p.push(format!("ledger-aa-handler-test-{}", std::process::id()));
        p
    }

    #[test]
    fn missing_trigger_unit_is_an_invariant_error_not_a_panic() {
        let dir = tempdir();
        let storage = Storage::open(&dir).unwrap();
        let aa_address = Address32::from_string("C".repeat(32)).unwrap();
        let bogus_trigger = AaTriggerRecord {
            trigger_unit: ledger_core::types::Hash32::from_bytes([9u8; 32]),
            aa_address,
        };
        let mut handler = AaHandler;
        let outcome = handler.handle_trigger(&bogus_trigger, &storage, 0);
        assert!(matches!(outcome, AaOutcome::Bounce { .. }));
    }
}
