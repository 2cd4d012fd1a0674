//! The DAG data model: units, joints, messages, and the main-chain position
//! fields attached to a unit once it has been written.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::constants::COUNT_WITNESSES;
use crate::types::{Address32, Amount, BallId, Hash32, Level, Mci, Timestamp, UnitId};

/// A definition or AA body is a JSON-shaped expression tree: `["op", arg, ...]`.
/// Both address definitions (signature predicates) and AA formulas share this
/// wire representation; `ledger-crypto` evaluates the former, `ledger-aa` the
/// latter.
pub type FormulaTree = serde_json::Value;

/// Returns `true` if `tree` is the top-level shape `["autonomous agent", body]`.
pub fn is_aa_definition(tree: &FormulaTree) -> bool {
    tree.as_array()
        .map(|a| a.len() == 2 && a[0].as_str() == Some("autonomous agent"))
        .unwrap_or(false)
}

// ── Unit ──────────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Author {
    pub address: Address32,
    /// Present iff no prior on-chain definition exists for `address`, or a
    /// definition change is pending in this same unit.
    pub definition: Option<FormulaTree>,
    /// Path within the definition predicate tree → base64 signature.
    pub authentifiers: BTreeMap<String, String>,
}

/// Inline witness list, or a reference to a prior unit that declared one.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum WitnessSource {
    Inline(Vec<Address32>),
    FromUnit(UnitId),
}

impl WitnessSource {
    pub fn inline_len(&self) -> Option<usize> {
        match self {
            WitnessSource::Inline(v) => Some(v.len()),
            WitnessSource::FromUnit(_) => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Unit {
    pub unit_id: UnitId,
    pub version: String,
    pub alt: String,
    /// Ordered (ascending), non-empty except for the genesis unit.
    pub parent_units: Vec<UnitId>,
    pub last_ball_unit: Option<UnitId>,
    pub last_ball: Option<BallId>,
    pub witnesses: WitnessSource,
    pub timestamp: Timestamp,
    pub authors: Vec<Author>,
    pub messages: Vec<Message>,
    pub headers_commission: u64,
    pub payload_commission: u64,
    pub oversize_fee: u64,
    pub tps_fee: u64,
    pub burn_fee: u64,
}

impl Unit {
    pub fn is_genesis(&self) -> bool {
        self.parent_units.is_empty()
    }

    pub fn author_addresses(&self) -> Vec<&Address32> {
        self.authors.iter().map(|a| &a.address).collect()
    }

    /// `true` if this unit's `messages` contain an AA definition.
    pub fn declares_aa(&self) -> bool {
        self.messages.iter().any(|m| {
            matches!(&m.payload, Some(MessagePayload::Definition(d)) if is_aa_definition(d))
        })
    }
}

/// Sanity-checked inline witness count; used by the validator.
pub fn expected_witness_count() -> usize {
    COUNT_WITNESSES
}

// ── Joint ─────────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Joint {
    pub unit: Unit,
    /// Present only once the unit is stable.
    pub ball: Option<BallId>,
    pub skiplist_balls: Option<Vec<BallId>>,
}

// ── Messages ──────────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadLocation {
    Inline,
    Uri,
    None,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub app: String,
    pub payload_location: PayloadLocation,
    pub payload_hash: Hash32,
    /// `None` when `payload_location != Inline` or the payload has been
    /// stripped after the unit became a finalized nonserial content-hash-only
    /// record.
    pub payload: Option<MessagePayload>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "app", rename_all = "snake_case")]
pub enum MessagePayload {
    Payment(PaymentPayload),
    Data(serde_json::Value),
    DataFeed(BTreeMap<String, DataFeedValue>),
    Definition(FormulaTree),
    AddressDefinitionChange {
        address: Address32,
        definition_chash: Address32,
    },
    Asset(AssetDefinition),
    AssetAttestors {
        asset: Hash32,
        attestors: Vec<Address32>,
    },
    Attestation {
        address: Address32,
        profile: serde_json::Value,
    },
    Poll {
        question: String,
        choices: Vec<String>,
    },
    Vote {
        unit: UnitId,
        choice: String,
    },
    Profile(serde_json::Value),
    Text(String),
    TemporaryData {
        length: u64,
        hash: Hash32,
    },
    DefinitionTemplate(FormulaTree),
    SystemVote(serde_json::Value),
    SystemVoteCount(serde_json::Value),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DataFeedValue {
    Number(f64),
    Text(String),
}

// ── Payments, inputs, outputs ─────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PaymentPayload {
    /// `None` for the base asset.
    pub asset: Option<Hash32>,
    pub inputs: Vec<Input>,
    pub outputs: Vec<Output>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Input {
    Transfer {
        src_unit: UnitId,
        src_message_index: u32,
        src_output_index: u32,
    },
    HeadersCommission {
        from_main_chain_index: Mci,
        to_main_chain_index: Mci,
    },
    Witnessing {
        from_main_chain_index: Mci,
        to_main_chain_index: Mci,
    },
    Issue {
        serial_number: u64,
        amount: Amount,
    },
}

/// Whether an output's `(address, amount)` is known to this node.
///
/// Keeping this as a tagged enum (rather than `Option<(Address32, Amount)>`)
/// is deliberate: a private-asset output withheld from this node and an
/// output record that is simply malformed/missing must never be conflated by
/// a bare truthiness check on an `Option`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum OutputVisibility {
    Revealed {
        address: Address32,
        amount: Amount,
        blinding: Option<String>,
    },
    /// A private-asset output not yet revealed to this node.
    Hidden,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Output {
    pub visibility: OutputVisibility,
    pub is_spent: bool,
}

impl Output {
    pub fn revealed_amount(&self) -> Option<Amount> {
        match &self.visibility {
            OutputVisibility::Revealed { amount, .. } => Some(*amount),
            OutputVisibility::Hidden => None,
        }
    }
}

// ── Assets ────────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AssetDefinition {
    pub cap: Option<Amount>,
    pub is_private: bool,
    pub is_transferrable: bool,
    pub auto_destroy: bool,
    pub fixed_denominations: Option<Vec<Amount>>,
    pub cosigned_by_definer: bool,
    pub spender_attested: bool,
    pub attestors: Option<Vec<Address32>>,
    pub issue_condition: Option<FormulaTree>,
}

// ── Sequence & MC position ────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sequence {
    Good,
    FinalBad,
    TempBad,
}

impl Sequence {
    pub fn is_good(&self) -> bool {
        matches!(self, Sequence::Good)
    }
}

/// Per-unit main-chain position, populated incrementally by the Writer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UnitProps {
    pub unit_id: UnitId,
    pub level: Level,
    pub witnessed_level: Level,
    pub best_parent_unit: Option<UnitId>,
    pub main_chain_index: Option<Mci>,
    pub latest_included_mc_index: Option<Mci>,
    pub is_on_main_chain: bool,
    pub is_stable: bool,
    pub sequence: Sequence,
    pub is_nonserial: bool,
    pub ball: Option<BallId>,
}

impl UnitProps {
    pub fn new_unwritten(unit_id: UnitId, level: Level, witnessed_level: Level) -> Self {
        Self {
            unit_id,
            level,
            witnessed_level,
            best_parent_unit: None,
            main_chain_index: None,
            latest_included_mc_index: None,
            is_on_main_chain: false,
            is_stable: false,
            sequence: Sequence::Good,
            is_nonserial: false,
            ball: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_aa_definition_shape() {
        let aa = serde_json::json!(["autonomous agent", {"messages": []}]);
        assert!(is_aa_definition(&aa));
        let sig = serde_json::json!(["sig", {"pubkey": "..."}]);
        assert!(!is_aa_definition(&sig));
    }
}
