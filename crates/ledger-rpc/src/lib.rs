//! ledger-rpc
//!
//! JSON-RPC 2.0 server exposing the peer-request API spec.md §6 names.
//!
//! Namespace: "ledger"
//! Methods:
//!   ledger_getJoint       — fetch a joint by unit id
//!   ledger_catchup        — witness proof + hash-tree range for bulk sync
//!   ledger_getHashTree     — ordered hash-tree records between two balls
//!   ledger_getWitnesses   — the node's current witness list
//!   ledger_getHistory     — light-client witness proof + proofchain + joints
//!   ledger_getLinkProofs  — link proofs for up to 100 unit ids
//!   ledger_getVersion     — node/protocol version

pub mod api;
pub mod server;
pub mod types;

pub use api::LedgerApiServer;
pub use server::{RpcServer, RpcServerState};
pub use types::{
    RpcCatchupRequest, RpcCatchupResponse, RpcHistoryRequest, RpcHistoryResponse, RpcLinkProof,
    RpcVersionInfo,
};
