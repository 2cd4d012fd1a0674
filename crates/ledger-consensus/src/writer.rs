//! Nine-step atomic persistence: insert the unit, resolve double spends,
//! extend the main chain, and cascade stabilization — all under the
//! process-wide `write` lock the caller is expected to hold (see spec.md §5).

use std::collections::HashSet;

use ledger_core::constants::MAJORITY_OF_WITNESSES;
use ledger_core::error::LedgerError;
use ledger_core::model::{
    Input, Joint, MessagePayload, Output, OutputVisibility, Sequence, Unit, UnitProps,
};
use ledger_core::types::{Address32, Level, Mci, UnitId};
use ledger_graph::algorithms::best_parent;
use ledger_storage::{AaTriggerRecord, Storage, StoredUnit, UnstableIndex};

/// Staged effect of writing one joint, returned so the Stabilizer and test
/// callers can observe what happened without re-reading storage.
#[derive(Debug, Clone)]
pub struct WriteOutcome {
    pub unit_id: UnitId,
    pub sequence: Sequence,
    pub newly_stable: Vec<UnitId>,
}

pub struct Writer<'a> {
    storage: &'a Storage,
    index: &'a mut UnstableIndex,
    witnesses: Vec<Address32>,
}

impl<'a> Writer<'a> {
    pub fn new(storage: &'a Storage, index: &'a mut UnstableIndex, witnesses: Vec<Address32>) -> Self {
        Self {
            storage,
            index,
            witnesses,
        }
    }

    /// Persists a validated joint. The caller (node wiring) has already run
    /// the joint through `Validator::validate` and is holding the `write`
    /// mutex key for the duration of this call.
    pub fn write(&mut self, joint: Joint) -> Result<WriteOutcome, LedgerError> {
        let unit = joint.unit;

        let (best_parent_unit, level) = if unit.is_genesis() {
            (None, 0)
        } else {
            let bp = best_parent(&unit.parent_units, self.storage)
                .map_err(|e| ledger_core::error::FatalError::InvariantViolated(e.to_string()))?;
            let mut max_level: Level = 0;
            for p in &unit.parent_units {
                if let Some(props) = self.storage.read_unit_props(p)? {
                    max_level = max_level.max(props.level);
                }
            }
            (Some(bp), max_level + 1)
        };

        let witnessed_level = self.compute_witnessed_level(&unit, level, &best_parent_unit)?;
        let sequence = self.resolve_double_spends(&unit)?;

        let mut props = UnitProps::new_unwritten(unit.unit_id.clone(), level, witnessed_level);
        props.best_parent_unit = best_parent_unit;
        props.sequence = sequence;

        self.persist_unit_body(&unit, &props)?;
        for parent in &unit.parent_units {
            self.storage.put_parenthood(&unit.unit_id, parent)?;
        }

        self.index.insert_unstable(unit.unit_id.clone(), props, unit.messages.clone());

        self.advance_main_chain(&unit.unit_id)?;
        let newly_stable = self.stabilize_ready_units()?;

        Ok(WriteOutcome {
            unit_id: unit.unit_id,
            sequence,
            newly_stable,
        })
    }

    /// Approximates spec.md §4.3's `witnessed_level`: if the new unit's own
    /// authors already reach the witness majority, its own level stands;
    /// otherwise walk the best-parent chain (already-persisted units only,
    /// since the new unit isn't written yet).
    fn compute_witnessed_level(
        &self,
        unit: &Unit,
        level: Level,
        best_parent_unit: &Option<UnitId>,
    ) -> Result<Level, LedgerError> {
        let witness_set: HashSet<&Address32> = self.witnesses.iter().collect();
        let own_witnesses = unit
            .author_addresses()
            .into_iter()
            .filter(|a| witness_set.contains(a))
            .count();
        if own_witnesses >= MAJORITY_OF_WITNESSES {
            return Ok(level);
        }
        match best_parent_unit {
            Some(bp) => ledger_graph::algorithms::witnessed_level(bp, &self.witnesses, self.storage)
                .map_err(|e| ledger_core::error::FatalError::InvariantViolated(e.to_string()).into()),
            None => Ok(0),
        }
    }

    /// Step 3 of spec.md §4.5: marks referenced outputs spent and assigns a
    /// sequence. An input spent by an already-stable ancestor is a hard
    /// rejection the Validator should already have caught; an input spent by
    /// a not-yet-stable unit (sibling or otherwise) downgrades this unit to
    /// `temp-bad` pending the deterministic resolution at stabilization time
    /// (`resolve_conflicting_group`).
    fn resolve_double_spends(&self, unit: &Unit) -> Result<Sequence, LedgerError> {
        let mut sequence = Sequence::Good;
        for message in &unit.messages {
            if let Some(MessagePayload::Payment(payment)) = &message.payload {
                for input in &payment.inputs {
                    if let Input::Transfer {
                        src_unit,
                        src_message_index,
                        src_output_index,
                    } = input
                    {
                        if let Some(existing) =
                            self.storage.read_output(src_unit, *src_message_index, *src_output_index)?
                        {
                            if existing.is_spent {
                                sequence = Sequence::TempBad;
                            }
                        }
                        self.storage
                            .mark_output_spent(src_unit, *src_message_index, *src_output_index)?;
                    }
                }
            }
        }
        Ok(sequence)
    }

    fn persist_unit_body(&self, unit: &Unit, props: &UnitProps) -> Result<(), LedgerError> {
        for (msg_index, message) in unit.messages.iter().enumerate() {
            if let Some(MessagePayload::Payment(payment)) = &message.payload {
                for (output_index, output) in payment.outputs.iter().enumerate() {
                    self.storage.put_output(
                        &unit.unit_id,
                        msg_index as u32,
                        output_index as u32,
                        output,
                    )?;
                }
            }
        }
        self.storage.put_stored_unit(&StoredUnit {
            unit: unit.clone(),
            props: props.clone(),
        })
    }

    /// Scoped-down main-chain extension: walks backward from the new unit
    /// along `best_parent_unit` links until it reaches a unit that already
    /// has an MCI, then assigns consecutive indices forward along that
    /// backbone. The full spec algorithm starts from the best child of the
    /// current tip and stops at the frontier of not-yet-known children;
    /// this backward-then-forward walk is equivalent whenever the new unit
    /// is itself the new tip, which holds for a single-writer node applying
    /// units in arrival order — multi-tip reorg handling is out of scope
    /// here (see `DESIGN.md`).
    fn advance_main_chain(&self, new_unit: &UnitId) -> Result<(), LedgerError> {
        let mut backbone = Vec::new();
        let mut current = new_unit.clone();
        loop {
            let props = match self.storage.read_unit_props(&current)? {
                Some(p) => p,
                None => break,
            };
            if props.main_chain_index.is_some() {
                break;
            }
            backbone.push(current.clone());
            match props.best_parent_unit {
                Some(parent) => current = parent,
                None => break,
            }
        }
        backbone.reverse();

        let mut next_mci: Mci = self
            .storage
            .read_unit_props(&current)?
            .and_then(|p| p.main_chain_index)
            .map(|m| m + 1)
            .unwrap_or(0);

        for u in backbone {
            let unit = self
                .storage
                .read_unit(&u)?
                .ok_or_else(|| ledger_core::error::FatalError::InvariantViolated(format!("unit {u} vanished mid-write")))?;
            let mut props = self
                .storage
                .read_unit_props(&u)?
                .ok_or_else(|| ledger_core::error::FatalError::InvariantViolated(format!("props for {u} vanished mid-write")))?;
            props.main_chain_index = Some(next_mci);
            props.is_on_main_chain = true;
            self.storage.put_stored_unit(&StoredUnit { unit, props })?;
            next_mci += 1;
        }
        Ok(())
    }

    /// Step 7: stabilizes every on-main-chain unit whose `level` no longer
    /// exceeds the tip's `witnessed_level` — by then a majority of witnesses
    /// have necessarily built on top of it, so its position cannot change.
    fn stabilize_ready_units(&mut self) -> Result<Vec<UnitId>, LedgerError> {
        let mut newly_stable = Vec::new();
        let tip_witnessed_level = self
            .index
            .all_unstable_units()
            .filter_map(|u| self.index.get_props(u))
            .filter(|p| p.is_on_main_chain)
            .map(|p| p.witnessed_level)
            .max()
            .unwrap_or(0);

        let mut candidates: Vec<UnitId> = self
            .index
            .all_unstable_units()
            .filter(|u| {
                self.index
                    .get_props(u)
                    .map(|p| p.is_on_main_chain && !p.is_stable && p.level <= tip_witnessed_level)
                    .unwrap_or(false)
            })
            .cloned()
            .collect();
        candidates.sort_by_key(|u| self.index.get_props(u).and_then(|p| p.main_chain_index));

        for u in candidates {
            self.stabilize_unit(&u)?;
            newly_stable.push(u);
        }
        Ok(newly_stable)
    }

    fn stabilize_unit(&mut self, unit_id: &UnitId) -> Result<(), LedgerError> {
        let unit = self
            .storage
            .read_unit(unit_id)?
            .ok_or_else(|| ledger_core::error::FatalError::InvariantViolated(format!("missing unit {unit_id} at stabilization")))?;
        let mut props = self
            .storage
            .read_unit_props(unit_id)?
            .ok_or_else(|| ledger_core::error::FatalError::InvariantViolated(format!("missing props {unit_id} at stabilization")))?;

        let parent_balls: Vec<_> = unit
            .parent_units
            .iter()
            .filter_map(|p| self.storage.ball_of(p).ok().flatten())
            .collect();
        let ball = ledger_crypto::hash::ball_hash(unit_id, &parent_balls, &[], !props.sequence.is_good());
        props.ball = Some(ball.clone());
        props.is_stable = true;

        self.storage.put_stored_unit(&StoredUnit {
            unit: unit.clone(),
            props: props.clone(),
        })?;
        self.storage.put_ball(unit_id, &ball)?;

        let mci = props.main_chain_index.unwrap_or(0);
        for author in &unit.authors {
            if let Some(def) = &author.definition {
                self.storage.put_definition(&author.address, def)?;
                self.storage
                    .record_definition_change(&author.address, mci, unit_id)?;
            }
        }

        self.enqueue_aa_triggers(&unit, &props)?;
        self.index.retire_stable(unit_id);
        Ok(())
    }

    fn enqueue_aa_triggers(&self, unit: &Unit, props: &UnitProps) -> Result<(), LedgerError> {
        for message in &unit.messages {
            if let Some(MessagePayload::Payment(payment)) = &message.payload {
                for output in &payment.outputs {
                    if let Output {
                        visibility: OutputVisibility::Revealed { address, .. },
                        ..
                    } = output
                    {
                        if self.storage.is_aa_address(address)? {
                            self.storage.enqueue_aa_trigger(
                                props.main_chain_index.unwrap_or(0),
                                props.level,
                                &unit.unit_id,
                                address,
                            )?;
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

pub use AaTriggerRecord as PendingAaTrigger;
