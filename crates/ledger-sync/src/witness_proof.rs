//! Construction (server side) and validation (client side) of the witness
//! proof spec.md §4.8 names: a bounded prefix of the current main chain
//! plus the minimal set of stable units that introduce the current
//! witnesses' definitions. A light client trusts this proof instead of
//! replaying full validation over the entire unit history.

use std::collections::HashSet;

use ledger_core::constants::{COUNT_WITNESSES, MAJORITY_OF_WITNESSES, MIN_SHARED_WITNESSES};
use ledger_core::error::{FatalError, LedgerError, ProtocolError};
use ledger_core::model::{Joint, WitnessSource};
use ledger_core::types::{Address32, Mci, UnitId};
use ledger_storage::Storage;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WitnessProof {
    /// MC prefix from `tip` backward until a majority of witnesses have
    /// authored a unit on it and a `last_ball_unit` has been included.
    pub unstable_mc_joints: Vec<Joint>,
    /// The minimal set of stable units whose definition (or definition
    /// change) introduced one of the proof's witness addresses.
    pub witness_change_and_definition_joints: Vec<Joint>,
}

/// Builds a witness proof rooted at `tip`, the node's current MC tip.
///
/// `tip` is supplied by the caller rather than read from `Storage` itself:
/// this crate does not track "the" MC tip as persisted state (the Writer's
/// `UnstableIndex` is the only place that notion lives, and it is process-
/// local) — whatever last wrote a unit already knows which one that was.
pub fn build_witness_proof(
    storage: &Storage,
    tip: &UnitId,
    witnesses: &[Address32],
) -> Result<WitnessProof, LedgerError> {
    let mut unstable_mc_joints = Vec::new();
    let mut seen_witnesses: HashSet<Address32> = HashSet::new();
    let mut seen_last_ball = false;
    let mut cursor = tip.clone();

    loop {
        let joint = storage.read_joint(&cursor)?.ok_or_else(|| {
            FatalError::InvariantViolated(format!("MC unit {cursor} missing from storage"))
        })?;
        for author in &joint.unit.authors {
            if witnesses.contains(&author.address) {
                seen_witnesses.insert(author.address.clone());
            }
        }
        if joint.unit.last_ball_unit.is_some() {
            seen_last_ball = true;
        }
        let is_genesis = joint.unit.is_genesis();
        unstable_mc_joints.push(joint);

        if seen_witnesses.len() >= MAJORITY_OF_WITNESSES && seen_last_ball {
            break;
        }
        if is_genesis {
            break;
        }
        let props = storage.read_unit_props(&cursor)?.ok_or_else(|| {
            FatalError::InvariantViolated(format!("unit props for {cursor} missing"))
        })?;
        match props.best_parent_unit {
            Some(parent) => cursor = parent,
            None => break,
        }
    }

    let mut witness_change_and_definition_joints = Vec::new();
    let mut included = HashSet::new();
    for witness in witnesses {
        if let Some((def_unit, _mci)) = storage.read_definition_by_address(witness, Mci::MAX)? {
            if included.insert(def_unit.clone()) {
                if let Some(joint) = storage.read_joint(&def_unit)? {
                    witness_change_and_definition_joints.push(joint);
                }
            }
        }
    }

    Ok(WitnessProof {
        unstable_mc_joints,
        witness_change_and_definition_joints,
    })
}

/// Client-side validation of a received witness proof, per spec.md §4.8:
/// walk `unstable_mc_joints` in order verifying hashes, parent linkage,
/// that witness-unit authors belong to the expected witness list, and
/// that each unit's own witness list shares `MIN_SHARED_WITNESSES` with
/// the client's expected set. Every failure is a typed `ProtocolError`,
/// never a panic.
pub fn validate_witness_proof(
    proof: &WitnessProof,
    expected_witnesses: &[Address32],
) -> Result<(), LedgerError> {
    if proof.unstable_mc_joints.is_empty() {
        return Err(ProtocolError::EmptyWitnessProof.into());
    }

    let mut seen_witnesses: HashSet<Address32> = HashSet::new();
    let mut seen_last_ball = false;

    for (i, joint) in proof.unstable_mc_joints.iter().enumerate() {
        let computed = ledger_crypto::hash::unit_hash(&joint.unit);
        if computed != joint.unit.unit_id {
            return Err(ledger_core::error::JointError::HashMismatch {
                computed,
                claimed: joint.unit.unit_id.clone(),
            }
            .into());
        }

        if let Some(prev) = proof.unstable_mc_joints.get(i + 1) {
            if !joint.unit.parent_units.contains(&prev.unit.unit_id) {
                return Err(ProtocolError::ProofChainBroken(prev.unit.unit_id.clone()).into());
            }
        }

        let unit_witnesses = match &joint.unit.witnesses {
            WitnessSource::Inline(list) => list.clone(),
            WitnessSource::FromUnit(_) => {
                return Err(ProtocolError::MissingDefinitionInProof.into())
            }
        };
        if unit_witnesses.len() != COUNT_WITNESSES {
            return Err(ProtocolError::MissingDefinitionInProof.into());
        }
        let shared = unit_witnesses
            .iter()
            .filter(|w| expected_witnesses.contains(w))
            .count();
        if shared < MIN_SHARED_WITNESSES {
            return Err(ProtocolError::InsufficientWitnessesInProof {
                min: MIN_SHARED_WITNESSES,
            }
            .into());
        }

        for author in &joint.unit.authors {
            if expected_witnesses.contains(&author.address) {
                seen_witnesses.insert(author.address.clone());
            }
        }
        if joint.unit.last_ball_unit.is_some() {
            seen_last_ball = true;
        }
    }

    if seen_witnesses.len() < MAJORITY_OF_WITNESSES {
        return Err(ProtocolError::InsufficientWitnessesInProof {
            min: MAJORITY_OF_WITNESSES,
        }
        .into());
    }
    if !seen_last_ball {
        return Err(ProtocolError::NoLastBallUnit.into());
    }

    for joint in &proof.witness_change_and_definition_joints {
        let computed = ledger_crypto::hash::unit_hash(&joint.unit);
        if computed != joint.unit.unit_id {
            return Err(ledger_core::error::JointError::HashMismatch {
                computed,
                claimed: joint.unit.unit_id.clone(),
            }
            .into());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_proof_is_rejected() {
        let proof = WitnessProof {
            unstable_mc_joints: vec![],
            witness_change_and_definition_joints: vec![],
        };
        let err = validate_witness_proof(&proof, &[]).unwrap_err();
        match err {
            LedgerError::Protocol(ProtocolError::EmptyWitnessProof) => {}
            other => panic!("unexpected error: {other}"),
        }
    }
}
