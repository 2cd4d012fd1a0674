//! Processes pending AA triggers in `(mci, level, unit_id, aa_address)`
//! order once the Writer has produced newly-stable units. The AA
//! interpreter itself lives in `ledger-aa`; this crate only defines the
//! trait boundary it must implement, so `ledger-consensus` never depends on
//! `ledger-aa` (dependency points the other way, wired up in `ledger-node`).

use ledger_core::constants::BOUNCE_FEE;
use ledger_core::error::LedgerError;
use ledger_core::model::Unit;
use ledger_core::types::Mci;
use ledger_storage::{AaTriggerRecord, AaResponseRecord, Storage};

/// What running one AA trigger produced. `ledger-aa` implements
/// `AaTriggerHandler`; this enum is its return contract.
pub enum AaOutcome {
    /// The AA emitted a response unit, already built and signed by the AA's
    /// own (keyless, protocol-derived) identity — the Stabilizer just needs
    /// to hand it to a `Writer`.
    Response(Unit),
    /// The AA body failed (bounce, require-false, division by zero, step
    /// budget exceeded, uncaught error): no state mutation from this trigger
    /// survives, and `BOUNCE_FEE` is deducted from the returned funds.
    Bounce { message: String },
}

pub trait AaTriggerHandler {
    /// Executes `trigger` against a read-only view of `storage` pinned at
    /// `pinned_mci` (the last stable MCI at the time the trigger fires, per
    /// spec.md §4.6/§4.7).
    fn handle_trigger(
        &mut self,
        trigger: &AaTriggerRecord,
        storage: &Storage,
        pinned_mci: Mci,
    ) -> AaOutcome;
}

pub struct Stabilizer;

/// One drained trigger's outcome. `response_unit` carries the full composed
/// `Unit` (not just its id, unlike the persisted `AaResponseRecord`) because
/// nothing in this crate writes it to storage — the Stabilizer's job ends at
/// recording that a response was produced; handing that unit through a
/// `Writer::write` call is the caller's (`ledger-node`'s) responsibility.
pub struct StabilizedTrigger {
    pub record: AaResponseRecord,
    pub response_unit: Option<Unit>,
}

impl Stabilizer {
    /// Drains every pending AA trigger in storage's natural
    /// `(mci, level, unit_id, aa_address)` iteration order, recording a
    /// response or bounce for each and removing it from the queue. Runs at
    /// the tail of the Writer's commit, within the same write-lock critical
    /// section — a handler failure never aborts the unit that triggered it.
    pub fn process_pending_triggers(
        storage: &Storage,
        pinned_mci: Mci,
        handler: &mut dyn AaTriggerHandler,
    ) -> Result<Vec<StabilizedTrigger>, LedgerError> {
        let pending: Vec<AaTriggerRecord> = storage
            .iter_aa_triggers()
            .collect::<Result<Vec<_>, _>>()?;

        let mut results = Vec::with_capacity(pending.len());
        for trigger in pending {
            let outcome = handler.handle_trigger(&trigger, storage, pinned_mci);
            let (record, response_unit) = match outcome {
                AaOutcome::Response(response_unit) => (
                    AaResponseRecord {
                        trigger_unit: trigger.trigger_unit.clone(),
                        aa_address: trigger.aa_address.clone(),
                        response_unit: Some(response_unit.unit_id.clone()),
                        bounced: false,
                        bounce_message: None,
                    },
                    Some(response_unit),
                ),
                AaOutcome::Bounce { message } => {
                    tracing::warn!(
                        trigger = %trigger.trigger_unit,
                        aa = %trigger.aa_address,
                        fee = BOUNCE_FEE,
                        "AA trigger bounced: {message}"
                    );
                    (
                        AaResponseRecord {
                            trigger_unit: trigger.trigger_unit.clone(),
                            aa_address: trigger.aa_address.clone(),
                            response_unit: None,
                            bounced: true,
                            bounce_message: Some(message),
                        },
                        None,
                    )
                }
            };
            storage.put_aa_response(&record)?;

            // The trigger's own (mci, level) are exactly the values it was
            // enqueued under (`Writer::enqueue_aa_triggers` passes the
            // triggering unit's own props straight through), so they can be
            // recovered here without widening `AaTriggerRecord` or
            // `iter_aa_triggers`'s iteration item with key bytes.
            if let Some(props) = storage.read_unit_props(&trigger.trigger_unit)? {
                storage.remove_aa_trigger(
                    props.main_chain_index.unwrap_or(0),
                    props.level,
                    &trigger.trigger_unit,
                    &trigger.aa_address,
                )?;
            }

            results.push(StabilizedTrigger { record, response_unit });
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AlwaysBounce;
    impl AaTriggerHandler for AlwaysBounce {
        fn handle_trigger(
            &mut self,
            _trigger: &AaTriggerRecord,
            _storage: &Storage,
            _pinned_mci: Mci,
        ) -> AaOutcome {
            AaOutcome::Bounce {
                message: "test bounce".into(),
            }
        }
    }

    #[test]
    fn empty_queue_processes_cleanly() {
        let dir = tempfile_dir();
        let storage = Storage::open(&dir).unwrap();
        let mut handler = AlwaysBounce;
        let responses = Stabilizer::process_pending_triggers(&storage, 0, &mut handler).unwrap();
        assert!(responses.is_empty());
    }

    fn tempfile_dir() -> std::path::PathBuf {
        let mut p = std::env::temp_dir();
        p.push(format!("ledger-stabilizer-test-{}", std::process::id()));
        p
    }
}
