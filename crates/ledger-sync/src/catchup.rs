//! `catchup`/`get_hash_tree`: the bulk-sync half of spec.md §4.8. A
//! catchup response bundles a [`WitnessProof`] with a range of balls the
//! requester can replay to reconstruct every stable unit between its
//! `last_known_mci` and the server's current stable frontier.

use std::collections::HashSet;

use ledger_core::error::{LedgerError, ProtocolError};
use ledger_core::types::{Address32, BallId, Mci, UnitId};
use ledger_storage::tables::HashTreeBallRecord;
use ledger_storage::Storage;
use serde::{Deserialize, Serialize};

use crate::witness_proof::{build_witness_proof, WitnessProof};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatchupRequest {
    pub witnesses: Vec<Address32>,
    pub last_stable_mci: Mci,
    pub last_known_mci: Mci,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatchupResponse {
    pub witness_proof: WitnessProof,
    pub hash_tree: Vec<HashTreeBallRecord>,
}

/// Server-side: builds a catchup response for `req`. `tip` is the
/// server's current MC tip (see [`build_witness_proof`] for why this is a
/// caller-supplied parameter rather than a `Storage` query).
pub fn build_catchup_response(
    storage: &Storage,
    req: &CatchupRequest,
    tip: &UnitId,
) -> Result<CatchupResponse, LedgerError> {
    let witness_proof = build_witness_proof(storage, tip, &req.witnesses)?;
    let hash_tree = collect_hash_tree(storage, req.last_known_mci, req.last_stable_mci)?;
    Ok(CatchupResponse {
        witness_proof,
        hash_tree,
    })
}

/// Stable units with `main_chain_index` in `from..=to`, reshaped into the
/// hash-tree-chunk wire format: each record's ball, its parents' balls, and
/// its skiplist balls. Shared by `build_catchup_response` and the
/// `get_hash_tree` peer request, which resolves a ball range to an MCI
/// range before calling this.
pub fn collect_hash_tree(
    storage: &Storage,
    from_mci: Mci,
    to_mci: Mci,
) -> Result<Vec<HashTreeBallRecord>, LedgerError> {
    let stable_units = storage.units_in_mci_range(from_mci, to_mci)?;
    let mut hash_tree = Vec::with_capacity(stable_units.len());
    for stored in &stable_units {
        let ball = stored.props.ball.clone().ok_or_else(|| {
            ledger_core::error::FatalError::InvariantViolated(format!(
                "stable unit {} has no ball",
                stored.unit.unit_id
            ))
        })?;
        let mut parent_balls = Vec::with_capacity(stored.unit.parent_units.len());
        for parent in &stored.unit.parent_units {
            if let Some(pb) = storage.ball_of(parent)? {
                parent_balls.push(pb);
            }
        }
        let skiplist_balls = storage
            .read_hash_tree_ball(&ball)?
            .map(|r| r.skiplist_balls)
            .unwrap_or_default();
        hash_tree.push(HashTreeBallRecord {
            ball,
            unit_id: stored.unit.unit_id.clone(),
            parent_balls,
            skiplist_balls,
            is_nonserial: stored.props.is_nonserial,
        });
    }
    Ok(hash_tree)
}

/// Client-side: verifies one chunk of a hash-tree stream before accepting
/// it. `scheduled_balls` is the set of balls the current catchup range
/// promises to deliver (accumulated across all chunks received so far,
/// including this one); `already_verified` is the set already committed
/// to the local `balls` table in a prior catchup run.
///
/// Rejects a chunk that references, via `skiplist_balls`, a ball that is
/// neither already verified nor scheduled for delivery in this range —
/// the fabricated-skiplist attack spec.md §4.8 names explicitly.
pub fn verify_hash_tree_chunk(
    chunk: &[HashTreeBallRecord],
    scheduled_balls: &HashSet<BallId>,
    already_verified: &HashSet<BallId>,
) -> Result<(), LedgerError> {
    for record in chunk {
        for skiplist_ball in &record.skiplist_balls {
            if !scheduled_balls.contains(skiplist_ball) && !already_verified.contains(skiplist_ball) {
                return Err(ProtocolError::SkiplistFabrication(skiplist_ball.clone()).into());
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger_core::types::Hash32;

    #[test]
    fn rejects_skiplist_reference_outside_range() {
        let fabricated_ball = Hash32::from_bytes([3u8; 32]);
        let chunk = vec![HashTreeBallRecord {
            ball: Hash32::from_bytes([1u8; 32]),
            unit_id: Hash32::from_bytes([2u8; 32]),
            parent_balls: vec![],
            skiplist_balls: vec![fabricated_ball.clone()],
            is_nonserial: false,
        }];
        let scheduled = HashSet::new();
        let verified = HashSet::new();
        let err = verify_hash_tree_chunk(&chunk, &scheduled, &verified).unwrap_err();
        match err {
            LedgerError::Protocol(ProtocolError::SkiplistFabrication(b)) => {
                assert_eq!(b, fabricated_ball)
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn accepts_skiplist_reference_already_verified() {
        let known_ball = Hash32::from_bytes([5u8; 32]);
        let chunk = vec![HashTreeBallRecord {
            ball: Hash32::from_bytes([1u8; 32]),
            unit_id: Hash32::from_bytes([2u8; 32]),
            parent_balls: vec![],
            skiplist_balls: vec![known_ball.clone()],
            is_nonserial: false,
        }];
        let scheduled = HashSet::new();
        let mut verified = HashSet::new();
        verified.insert(known_ball);
        verify_hash_tree_chunk(&chunk, &scheduled, &verified).unwrap();
    }
}
