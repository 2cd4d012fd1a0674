//! The in-memory indexes over not-yet-stable state (spec.md's
//! `assocUnstableUnits` / `assocUnstableMessages` / `assocHashTreeUnitsByBall`).
//!
//! These are fields of a single owned value held by the Writer; Validator and
//! AA Engine only ever see `&UnstableIndex`, never a mutable reference —
//! mutation happens exclusively inside the Writer's commit step, after the
//! underlying sled transaction has already succeeded.

use std::collections::HashMap;

use ledger_core::model::{Message, UnitProps};
use ledger_core::types::{BallId, UnitId};

#[derive(Default, Debug)]
pub struct UnstableIndex {
    assoc_unstable_units: HashMap<UnitId, UnitProps>,
    assoc_unstable_messages: HashMap<UnitId, Vec<Message>>,
    assoc_hash_tree_units_by_ball: HashMap<BallId, UnitId>,
}

impl UnstableIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_unstable(&mut self, unit: UnitId, props: UnitProps, messages: Vec<Message>) {
        self.assoc_unstable_units.insert(unit.clone(), props);
        self.assoc_unstable_messages.insert(unit, messages);
    }

    pub fn update_props(&mut self, unit: &UnitId, props: UnitProps) {
        self.assoc_unstable_units.insert(unit.clone(), props);
    }

    /// Removes a unit from the unstable index once it has stabilized —
    /// stable data lives only in `Storage` from this point on.
    pub fn retire_stable(&mut self, unit: &UnitId) {
        self.assoc_unstable_units.remove(unit);
        self.assoc_unstable_messages.remove(unit);
    }

    pub fn note_ball(&mut self, ball: BallId, unit: UnitId) {
        self.assoc_hash_tree_units_by_ball.insert(ball, unit);
    }

    pub fn get_props(&self, unit: &UnitId) -> Option<&UnitProps> {
        self.assoc_unstable_units.get(unit)
    }

    pub fn get_messages(&self, unit: &UnitId) -> Option<&[Message]> {
        self.assoc_unstable_messages.get(unit).map(|v| v.as_slice())
    }

    pub fn unit_for_ball(&self, ball: &BallId) -> Option<&UnitId> {
        self.assoc_hash_tree_units_by_ball.get(ball)
    }

    pub fn all_unstable_units(&self) -> impl Iterator<Item = &UnitId> {
        self.assoc_unstable_units.keys()
    }

    pub fn len(&self) -> usize {
        self.assoc_unstable_units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assoc_unstable_units.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger_core::model::Sequence;
    use ledger_core::types::Hash32;

    #[test]
    fn insert_and_retire_round_trips() {
        let mut idx = UnstableIndex::new();
        let u = Hash32::from_bytes([9u8; 32]);
        let props = UnitProps::new_unwritten(u.clone(), 1, 0);
        idx.insert_unstable(u.clone(), props, vec![]);
        assert!(idx.get_props(&u).is_some());
        idx.retire_stable(&u);
        assert!(idx.get_props(&u).is_none());
        let _ = Sequence::Good;
    }
}
