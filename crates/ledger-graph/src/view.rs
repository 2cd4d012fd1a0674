//! The read-only view the graph algorithms need over already-written unit
//! metadata. `ledger-storage` implements this trait; keeping it abstract
//! here avoids a dependency cycle (Storage needs Graph to compute the
//! fields this trait exposes in the first place).

use ledger_core::types::{Address32, Level, UnitId};

pub trait GraphView {
    fn parents_of(&self, unit: &UnitId) -> Option<Vec<UnitId>>;
    fn level_of(&self, unit: &UnitId) -> Option<Level>;
    fn witnessed_level_of(&self, unit: &UnitId) -> Option<Level>;
    fn best_parent_of(&self, unit: &UnitId) -> Option<UnitId>;
    fn authors_of(&self, unit: &UnitId) -> Option<Vec<Address32>>;
}
