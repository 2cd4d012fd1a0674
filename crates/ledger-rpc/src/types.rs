use serde::{Deserialize, Serialize};

use ledger_core::model::Joint;
use ledger_core::types::{Address32, BallId, Mci, UnitId};
use ledger_sync::WitnessProof;

/// `catchup` peer request (§6): witness list plus the caller's already-known
/// stable frontier. Wraps `ledger_sync::CatchupRequest` verbatim — this
/// crate's only job is the wire/JSON-RPC boundary around it.
pub type RpcCatchupRequest = ledger_sync::CatchupRequest;
pub type RpcCatchupResponse = ledger_sync::CatchupResponse;

/// `light/get_history` response: a witness proof anchoring the client's
/// trust, the chain of balls linking the requested units to that proof, and
/// the requested units' own joints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcHistoryResponse {
    pub witness_proof: WitnessProof,
    pub proofchain_balls: Vec<BallId>,
    pub joints: Vec<Joint>,
}

/// `light/get_history` request parameters. At least one of `requested_units`
/// or `addresses` must be non-empty.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcHistoryRequest {
    pub witnesses: Vec<Address32>,
    #[serde(default)]
    pub requested_units: Vec<UnitId>,
    #[serde(default)]
    pub addresses: Vec<Address32>,
    pub min_mci: Option<Mci>,
}

/// A single `light/get_link_proofs` result: the chain of joints from
/// `unit_id` back to its nearest stable (balled) ancestor along the
/// best-parent path, inclusive of that ancestor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcLinkProof {
    pub unit_id: UnitId,
    pub chain: Vec<Joint>,
}

/// Node and protocol version information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcVersionInfo {
    pub node_version: String,
    pub protocol_version: String,
}
