//! Joint ingress: queuing units that arrived before their parents, and
//! purging units that turn out to be bad. Grounded on spec.md §4.9's three
//! named operations; `Storage` already implements the atomic primitives
//! (`save_unhandled_joint`, `dependents_of`, `remove_dependency`,
//! `mark_known_bad`) this module sequences.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use ledger_core::constants::{PURGE_BATCH_LIMIT, PURGE_MAX_ELAPSED_SECS, PURGE_MAX_ITERATIONS};
use ledger_core::error::LedgerError;
use ledger_core::model::Joint;
use ledger_core::types::UnitId;
use ledger_storage::{Storage, UnhandledJointRecord};
use tracing::{debug, info};

/// Queues `joint` pending arrival of `missing_parents`. Rolls back both the
/// storage write and the caller's in-memory "unit is known" marker on
/// failure, by construction: the marker is set by the caller only after
/// this call returns `Ok`.
pub fn save_unhandled_joint(
    storage: &Storage,
    joint: Joint,
    missing_parents: Vec<UnitId>,
    peer: Option<String>,
) -> Result<(), LedgerError> {
    let unit_id = joint.unit.unit_id.clone();
    let record = UnhandledJointRecord {
        joint,
        missing_parents: missing_parents.clone(),
        peer,
    };
    storage.save_unhandled_joint(&record)?;
    for parent in &missing_parents {
        // `dependencies` edges are inserted by `save_unhandled_joint`
        // itself in this implementation (see its doc comment in
        // `ledger-storage`); nothing further to do here beyond logging.
        debug!(%unit_id, %parent, "unit queued pending parent");
    }
    Ok(())
}

/// Walks the dependency graph breadth-first from `bad_unit`, marking every
/// transitive dependent known-bad and removing it from `unhandled_joints`.
/// Breadth-first, not recursive, per spec.md §4.9's explicit requirement
/// (a long dependency chain must not blow the stack).
pub fn purge_dependent(storage: &Storage, bad_unit: &UnitId, reason: &str) -> Result<usize, LedgerError> {
    let mut queue: VecDeque<UnitId> = VecDeque::new();
    queue.push_back(bad_unit.clone());
    let mut purged = 0usize;

    while let Some(unit) = queue.pop_front() {
        storage.mark_known_bad(&unit, reason)?;
        let dependents = storage.dependents_of(&unit)?;
        for dependent in dependents {
            storage.remove_dependency(&unit, &dependent)?;
            if storage.read_unhandled_joint(&dependent)?.is_some() {
                // Any dependent of a known-bad unit is itself
                // unsalvageable regardless of its other pending parents.
                storage.remove_unhandled_joint(&dependent)?;
                purged += 1;
                queue.push_back(dependent);
            }
        }
    }
    Ok(purged)
}

/// One bounded pass of `purge_uncovered_nonserial_joints`: archives
/// bad-sequence units with no descendants that are already covered by a
/// newer witness unit. Capped by iteration count and wall-clock elapsed
/// time; any remaining work defers to the caller's next scheduled run.
///
/// `is_covered` answers "has a newer witness-authored unit already made
/// this unit's non-serial status final" — the actual coverage rule is a
/// main-chain-position computation that belongs to `ledger-consensus`, so
/// it is injected here as a predicate rather than duplicated.
pub fn purge_uncovered_nonserial_joints<F>(
    storage: &Storage,
    candidates: &[UnitId],
    is_covered: F,
) -> Result<usize, LedgerError>
where
    F: Fn(&UnitId) -> Result<bool, LedgerError>,
{
    let start = Instant::now();
    let deadline = Duration::from_secs(PURGE_MAX_ELAPSED_SECS);
    let mut purged = 0usize;
    let mut iterations = 0u32;

    for batch in candidates.chunks(PURGE_BATCH_LIMIT) {
        for unit in batch {
            if iterations >= PURGE_MAX_ITERATIONS || start.elapsed() >= deadline {
                info!(purged, iterations, "purge pass capped; remaining work deferred");
                return Ok(purged);
            }
            iterations += 1;

            if storage.children_of(unit)?.is_empty() && is_covered(unit)? {
                storage.mark_known_bad(unit, "uncovered nonserial unit archived")?;
                storage.remove_unhandled_joint(unit)?;
                purged += 1;
            }
        }
    }
    Ok(purged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger_core::model::{Unit, WitnessSource};
    use ledger_core::types::Hash32;

    fn dummy_joint(id: [u8; 32]) -> Joint {
        Joint {
            unit: Unit {
                unit_id: Hash32::from_bytes(id),
                version: "4.0".to_string(),
                alt: "1".to_string(),
                parent_units: vec![],
                last_ball_unit: None,
                last_ball: None,
                witnesses: WitnessSource::Inline(vec![]),
                timestamp: 0,
                authors: vec![],
                messages: vec![],
                headers_commission: 0,
                payload_commission: 0,
                oversize_fee: 0,
                tps_fee: 0,
                burn_fee: 0,
            },
            ball: None,
            skiplist_balls: None,
        }
    }

    fn tempdir(tag: &str) -> std::path::PathBuf {
        let mut p = std::env::temp_dir();
        p.push(format!("ledger-sync-ingress-{tag}-{}", std::process::id()));
        p
    }

    #[test]
    fn purge_dependent_walks_breadth_first_and_marks_bad() {
        let storage = Storage::open(tempdir("purge")).unwrap();
        let bad = Hash32::from_bytes([1u8; 32]);
        let child = Hash32::from_bytes([2u8; 32]);

        save_unhandled_joint(&storage, dummy_joint([2u8; 32]), vec![bad.clone()], None).unwrap();

        let purged = purge_dependent(&storage, &bad, "test").unwrap();
        assert_eq!(purged, 1);
        assert!(storage.is_known_bad(&bad).unwrap());
        assert!(storage.is_known_bad(&child).unwrap());
        assert!(storage.read_unhandled_joint(&child).unwrap().is_none());
    }

    #[test]
    fn purge_uncovered_respects_iteration_cap() {
        let storage = Storage::open(tempdir("cap")).unwrap();
        let candidates: Vec<UnitId> = (0..5u8).map(|i| Hash32::from_bytes([i; 32])).collect();
        let purged = purge_uncovered_nonserial_joints(&storage, &candidates, |_| Ok(true)).unwrap();
        assert_eq!(purged, 5);
    }
}
