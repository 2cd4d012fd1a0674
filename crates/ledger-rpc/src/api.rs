use jsonrpsee::core::RpcResult;
use jsonrpsee::proc_macros::rpc;

use ledger_core::model::Joint;
use ledger_core::types::{Address32, BallId, UnitId};
use ledger_storage::tables::HashTreeBallRecord;

use crate::types::{
    RpcCatchupRequest, RpcCatchupResponse, RpcHistoryRequest, RpcHistoryResponse, RpcLinkProof,
    RpcVersionInfo,
};

/// The peer-request API spec.md §6 names, served over JSON-RPC 2.0. All
/// method names are prefixed with "ledger_" via `namespace = "ledger"`.
#[rpc(server, namespace = "ledger")]
pub trait LedgerApi {
    /// Return a single joint by unit id, or an error if unknown.
    #[method(name = "getJoint")]
    async fn get_joint(&self, unit_id: UnitId) -> RpcResult<Joint>;

    /// Bulk-sync request: a witness proof plus a hash-tree range covering
    /// `(last_known_mci, last_stable_mci]`.
    #[method(name = "catchup")]
    async fn catchup(&self, request: RpcCatchupRequest) -> RpcResult<RpcCatchupResponse>;

    /// Ordered hash-tree records for the stable units between `from_ball`
    /// and `to_ball` (both must already be known to this node).
    #[method(name = "getHashTree")]
    async fn get_hash_tree(
        &self,
        from_ball: BallId,
        to_ball: BallId,
    ) -> RpcResult<Vec<HashTreeBallRecord>>;

    /// The node's current set of `COUNT_WITNESSES` witness addresses.
    #[method(name = "getWitnesses")]
    async fn get_witnesses(&self) -> RpcResult<Vec<Address32>>;

    /// Light-client history request: a witness proof, the chain of balls
    /// linking the requested units to it, and the requested units' joints.
    #[method(name = "getHistory")]
    async fn get_history(&self, request: RpcHistoryRequest) -> RpcResult<RpcHistoryResponse>;

    /// Link proofs for up to 100 unit ids: for each, the chain of joints
    /// from the unit back to its nearest stable ancestor.
    #[method(name = "getLinkProofs")]
    async fn get_link_proofs(&self, unit_ids: Vec<UnitId>) -> RpcResult<Vec<RpcLinkProof>>;

    /// Node and protocol version information.
    #[method(name = "getVersion")]
    async fn get_version(&self) -> RpcResult<RpcVersionInfo>;
}
