use serde::{Deserialize, Serialize};

use ledger_core::model::{FormulaTree, Joint, Unit, UnitProps};
use ledger_core::types::{Address32, BallId, UnitId};

/// The `units` row: the immutable unit body plus its mutable MC-position
/// fields, stored together since every read site wants both.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StoredUnit {
    pub unit: Unit,
    pub props: UnitProps,
}

/// A `hash_tree_balls` row: one chunk element of the catchup stream.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HashTreeBallRecord {
    pub ball: BallId,
    pub unit_id: UnitId,
    pub parent_balls: Vec<BallId>,
    pub skiplist_balls: Vec<BallId>,
    pub is_nonserial: bool,
}

/// An `aa_triggers` row: which unit triggered which AA address.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AaTriggerRecord {
    pub trigger_unit: UnitId,
    pub aa_address: Address32,
}

/// An `aa_responses` row.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AaResponseRecord {
    pub trigger_unit: UnitId,
    pub aa_address: Address32,
    pub response_unit: Option<UnitId>,
    pub bounced: bool,
    pub bounce_message: Option<String>,
}

/// An `aa_addresses` row: the AA's body formula plus the definition unit
/// that introduced it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AaAddressRecord {
    pub address: Address32,
    pub body: FormulaTree,
    pub defining_unit: UnitId,
}

/// An `unhandled_joints` row together with the parents it's still waiting on.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UnhandledJointRecord {
    pub joint: Joint,
    pub missing_parents: Vec<UnitId>,
    pub peer: Option<String>,
}
