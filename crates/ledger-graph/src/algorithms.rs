//! Operations over the main chain and the DAG: best-parent selection,
//! witnessed-level computation, and bounded ancestor-inclusion queries.

use std::collections::{HashSet, VecDeque};

use ledger_core::constants::{MAJORITY_OF_WITNESSES, MAX_GRAPH_TRAVERSAL_NODES};
use ledger_core::types::{Address32, Level, UnitId};
use thiserror::Error;

use crate::view::GraphView;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("unit {0} has no recorded props; parents must be validated first")]
    UnknownUnit(UnitId),
    #[error("empty parent list")]
    NoParents,
}

/// Picks the parent with the greatest `witnessed_level`, tie-broken by
/// greatest `level`, tie-broken by lexicographically smallest `unit_id`.
pub fn best_parent(parents: &[UnitId], view: &dyn GraphView) -> Result<UnitId, GraphError> {
    if parents.is_empty() {
        return Err(GraphError::NoParents);
    }
    let mut best: Option<(Level, Level, &UnitId)> = None;
    for p in parents {
        let wl = view.witnessed_level_of(p).ok_or_else(|| GraphError::UnknownUnit(p.clone()))?;
        let lvl = view.level_of(p).ok_or_else(|| GraphError::UnknownUnit(p.clone()))?;
        best = Some(match best {
            None => (wl, lvl, p),
            Some((bwl, blvl, bp)) => {
                if wl > bwl || (wl == bwl && lvl > blvl) || (wl == bwl && lvl == blvl && p < bp) {
                    (wl, lvl, p)
                } else {
                    (bwl, blvl, bp)
                }
            }
        });
    }
    Ok(best.unwrap().2.clone())
}

/// Walks the best-parent chain starting at `unit`, collecting distinct
/// witness authors, until `MAJORITY_OF_WITNESSES` are found. Returns the
/// `level` of the unit at which the majority was reached.
pub fn witnessed_level(
    unit: &UnitId,
    witnesses: &[Address32],
    view: &dyn GraphView,
) -> Result<Level, GraphError> {
    let witness_set: HashSet<&Address32> = witnesses.iter().collect();
    let mut seen: HashSet<Address32> = HashSet::new();
    let mut current = unit.clone();

    loop {
        let authors = view
            .authors_of(&current)
            .ok_or_else(|| GraphError::UnknownUnit(current.clone()))?;
        for a in authors {
            if witness_set.contains(&a) {
                seen.insert(a);
            }
        }
        if seen.len() >= MAJORITY_OF_WITNESSES {
            return view
                .level_of(&current)
                .ok_or_else(|| GraphError::UnknownUnit(current.clone()));
        }
        match view.best_parent_of(&current) {
            Some(parent) => current = parent,
            None => {
                // Reached genesis without a majority: its level stands.
                return view
                    .level_of(&current)
                    .ok_or_else(|| GraphError::UnknownUnit(current.clone()));
            }
        }
    }
}

/// Whether `earlier` is an ancestor of (included by) any unit in
/// `later_units`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inclusion {
    Included,
    NotIncluded,
    /// The traversal node cap was hit before a verdict could be reached.
    Unknown,
}

/// Bounded breadth-first ancestor search: walks backward from `later_units`
/// through `parents_of`, capped at `MAX_GRAPH_TRAVERSAL_NODES` visited nodes.
/// Never recurses unboundedly; a cap hit returns `Unknown`, not an error.
pub fn determine_if_included(
    earlier_unit: &UnitId,
    later_units: &[UnitId],
    view: &dyn GraphView,
) -> Inclusion {
    if later_units.iter().any(|u| u == earlier_unit) {
        return Inclusion::Included;
    }
    let mut visited: HashSet<UnitId> = HashSet::new();
    let mut queue: VecDeque<UnitId> = later_units.iter().cloned().collect();
    let mut visited_count = 0usize;

    while let Some(u) = queue.pop_front() {
        if !visited.insert(u.clone()) {
            continue;
        }
        visited_count += 1;
        if visited_count > MAX_GRAPH_TRAVERSAL_NODES {
            return Inclusion::Unknown;
        }
        let Some(parents) = view.parents_of(&u) else {
            // Unit unknown to this node (e.g. genesis sentinel); treat as a
            // dead end rather than an error, matching bounded-traversal semantics.
            continue;
        };
        for p in parents {
            if &p == earlier_unit {
                return Inclusion::Included;
            }
            if !visited.contains(&p) {
                queue.push_back(p);
            }
        }
    }
    Inclusion::NotIncluded
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger_core::types::Hash32;
    use std::collections::HashMap;

    struct FakeView {
        parents: HashMap<UnitId, Vec<UnitId>>,
        levels: HashMap<UnitId, Level>,
        witnessed_levels: HashMap<UnitId, Level>,
        best_parents: HashMap<UnitId, UnitId>,
        authors: HashMap<UnitId, Vec<Address32>>,
    }

    impl GraphView for FakeView {
        fn parents_of(&self, unit: &UnitId) -> Option<Vec<UnitId>> {
            self.parents.get(unit).cloned()
        }
        fn level_of(&self, unit: &UnitId) -> Option<Level> {
            self.levels.get(unit).copied()
        }
        fn witnessed_level_of(&self, unit: &UnitId) -> Option<Level> {
            self.witnessed_levels.get(unit).copied()
        }
        fn best_parent_of(&self, unit: &UnitId) -> Option<UnitId> {
            self.best_parents.get(unit).cloned()
        }
        fn authors_of(&self, unit: &UnitId) -> Option<Vec<Address32>> {
            self.authors.get(unit).cloned()
        }
    }

    fn h(byte: u8) -> UnitId {
        Hash32::from_bytes([byte; 32])
    }

    fn addr(c: char) -> Address32 {
        Address32::from_string(c.to_string().repeat(32)).unwrap()
    }

    #[test]
    fn best_parent_picks_highest_witnessed_level() {
        let a = h(1);
        let b = h(2);
        let mut view = FakeView {
            parents: HashMap::new(),
            levels: HashMap::from([(a.clone(), 5), (b.clone(), 5)]),
            witnessed_levels: HashMap::from([(a.clone(), 3), (b.clone(), 4)]),
            best_parents: HashMap::new(),
            authors: HashMap::new(),
        };
        view.levels.insert(a.clone(), 5);
        assert_eq!(best_parent(&[a, b.clone()], &view).unwrap(), b);
    }

    #[test]
    fn best_parent_tie_breaks_on_unit_id() {
        let a = h(1);
        let b = h(2);
        let view = FakeView {
            parents: HashMap::new(),
            levels: HashMap::from([(a.clone(), 5), (b.clone(), 5)]),
            witnessed_levels: HashMap::from([(a.clone(), 3), (b.clone(), 3)]),
            best_parents: HashMap::new(),
            authors: HashMap::new(),
        };
        // a < b lexicographically (smaller first byte)
        assert_eq!(best_parent(&[b, a.clone()], &view).unwrap(), a);
    }

    #[test]
    fn witnessed_level_stops_at_majority() {
        let tip = h(1);
        let mid = h(2);
        let genesis = h(3);
        let witnesses: Vec<Address32> = (0..7).map(|i| addr((b'A' + i) as char)).collect();

        let mut authors = HashMap::new();
        authors.insert(tip.clone(), witnesses[0..3].to_vec());
        authors.insert(mid.clone(), witnesses[3..7].to_vec());
        authors.insert(genesis.clone(), vec![]);

        let view = FakeView {
            parents: HashMap::new(),
            levels: HashMap::from([(tip.clone(), 10), (mid.clone(), 9), (genesis.clone(), 0)]),
            witnessed_levels: HashMap::new(),
            best_parents: HashMap::from([(tip.clone(), mid.clone()), (mid.clone(), genesis.clone())]),
            authors,
        };

        // 7 distinct witnesses reached exactly at `mid` (3 + 4 = 7).
        assert_eq!(witnessed_level(&tip, &witnesses, &view).unwrap(), 9);
    }

    #[test]
    fn determine_if_included_finds_ancestor() {
        let a = h(1);
        let b = h(2);
        let c = h(3);
        let mut parents = HashMap::new();
        parents.insert(c.clone(), vec![b.clone()]);
        parents.insert(b.clone(), vec![a.clone()]);
        let view = FakeView {
            parents,
            levels: HashMap::new(),
            witnessed_levels: HashMap::new(),
            best_parents: HashMap::new(),
            authors: HashMap::new(),
        };
        assert_eq!(determine_if_included(&a, &[c], &view), Inclusion::Included);
    }

    #[test]
    fn determine_if_included_reports_not_included() {
        let a = h(1);
        let b = h(2);
        let c = h(3);
        let mut parents = HashMap::new();
        parents.insert(c.clone(), vec![b.clone()]);
        let view = FakeView {
            parents,
            levels: HashMap::new(),
            witnessed_levels: HashMap::new(),
            best_parents: HashMap::new(),
            authors: HashMap::new(),
        };
        assert_eq!(determine_if_included(&a, &[c], &view), Inclusion::NotIncluded);
    }
}
