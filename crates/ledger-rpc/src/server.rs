use std::net::SocketAddr;
use std::sync::{Arc, RwLock};

use jsonrpsee::core::{async_trait, RpcResult};
use jsonrpsee::server::{Server, ServerHandle};
use jsonrpsee::types::ErrorObject;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use ledger_core::model::Joint;
use ledger_core::types::{Address32, BallId, UnitId};
use ledger_storage::tables::HashTreeBallRecord;
use ledger_storage::Storage;
use ledger_sync::{build_catchup_response, build_witness_proof, collect_hash_tree};

use crate::api::LedgerApiServer;
use crate::types::{
    RpcCatchupRequest, RpcCatchupResponse, RpcHistoryRequest, RpcHistoryResponse, RpcLinkProof,
    RpcVersionInfo,
};

fn rpc_err(code: i32, msg: impl Into<String>) -> ErrorObject<'static> {
    ErrorObject::owned(code, msg.into(), None::<()>)
}

fn storage_err(e: ledger_core::error::LedgerError) -> ErrorObject<'static> {
    rpc_err(-32603, e.to_string())
}

/// Shared state passed to the RPC server.
///
/// `tip` is the node's current main-chain tip. Unlike the witness-proof and
/// catchup builders in `ledger-sync`, which take `tip` as a direct
/// parameter, the RPC server has no per-request caller to supply it — it is
/// instead the same `Arc<RwLock<UnitId>>` the node's write path updates
/// after every unit it commits to the main chain, shared rather than
/// copied so the RPC view never lags a separate snapshot.
pub struct RpcServerState {
    pub storage: Arc<Storage>,
    pub witnesses: Vec<Address32>,
    pub tip: Arc<RwLock<UnitId>>,
}

/// The RPC server implementation.
pub struct RpcServer {
    state: Arc<RpcServerState>,
}

impl RpcServer {
    pub fn new(state: Arc<RpcServerState>) -> Self {
        Self { state }
    }

    /// Start the JSON-RPC server on `addr` with permissive CORS headers.
    /// Returns a handle to stop it.
    pub async fn start(self, addr: SocketAddr) -> anyhow::Result<ServerHandle> {
        let cors = CorsLayer::new()
            .allow_methods(Any)
            .allow_origin(Any)
            .allow_headers(Any);

        let server = Server::builder()
            .set_http_middleware(tower::ServiceBuilder::new().layer(cors))
            .build(addr)
            .await?;

        let module = self.into_rpc();
        let handle = server.start(module);
        info!(%addr, "RPC server started");
        Ok(handle)
    }
}

impl RpcServer {
    fn tip(&self) -> UnitId {
        self.state.tip.read().unwrap().clone()
    }

    /// Walks the best-parent chain from `unit_id` back to (and including)
    /// the nearest ancestor whose ball is known, collecting joints along
    /// the way. Used by `get_link_proofs`.
    fn link_proof_chain(&self, unit_id: &UnitId) -> RpcResult<Vec<Joint>> {
        let mut chain = Vec::new();
        let mut cursor = unit_id.clone();
        loop {
            let joint = self
                .state
                .storage
                .read_joint(&cursor)
                .map_err(storage_err)?
                .ok_or_else(|| rpc_err(-32602, format!("unknown unit {cursor}")))?;
            let has_ball = joint.ball.is_some();
            let is_genesis = joint.unit.is_genesis();
            chain.push(joint.clone());
            if has_ball || is_genesis {
                break;
            }
            let props = self
                .state
                .storage
                .read_unit_props(&cursor)
                .map_err(storage_err)?
                .ok_or_else(|| rpc_err(-32603, format!("missing props for {cursor}")))?;
            match props.best_parent_unit {
                Some(parent) => cursor = parent,
                None => break,
            }
        }
        Ok(chain)
    }
}

#[async_trait]
impl LedgerApiServer for RpcServer {
    async fn get_joint(&self, unit_id: UnitId) -> RpcResult<Joint> {
        self.state
            .storage
            .read_joint(&unit_id)
            .map_err(storage_err)?
            .ok_or_else(|| rpc_err(-32602, format!("unknown unit {unit_id}")).into())
    }

    async fn catchup(&self, request: RpcCatchupRequest) -> RpcResult<RpcCatchupResponse> {
        let tip = self.tip();
        build_catchup_response(&self.state.storage, &request, &tip).map_err(storage_err)
    }

    async fn get_hash_tree(
        &self,
        from_ball: BallId,
        to_ball: BallId,
    ) -> RpcResult<Vec<HashTreeBallRecord>> {
        let from_unit = self
            .state
            .storage
            .unit_of_ball(&from_ball)
            .map_err(storage_err)?
            .ok_or_else(|| rpc_err(-32602, "unknown from_ball"))?;
        let to_unit = self
            .state
            .storage
            .unit_of_ball(&to_ball)
            .map_err(storage_err)?
            .ok_or_else(|| rpc_err(-32602, "unknown to_ball"))?;
        let from_mci = self
            .state
            .storage
            .read_unit_props(&from_unit)
            .map_err(storage_err)?
            .and_then(|p| p.main_chain_index)
            .ok_or_else(|| rpc_err(-32602, "from_ball is not stable"))?;
        let to_mci = self
            .state
            .storage
            .read_unit_props(&to_unit)
            .map_err(storage_err)?
            .and_then(|p| p.main_chain_index)
            .ok_or_else(|| rpc_err(-32602, "to_ball is not stable"))?;
        collect_hash_tree(&self.state.storage, from_mci, to_mci).map_err(storage_err)
    }

    async fn get_witnesses(&self) -> RpcResult<Vec<Address32>> {
        Ok(self.state.witnesses.clone())
    }

    async fn get_history(&self, request: RpcHistoryRequest) -> RpcResult<RpcHistoryResponse> {
        if request.requested_units.is_empty() && request.addresses.is_empty() {
            return Err(rpc_err(
                -32602,
                "get_history requires requested_units or addresses",
            )
            .into());
        }
        if !request.addresses.is_empty() {
            // No secondary address index is maintained (see DESIGN.md) —
            // address-only history queries are not served; clients must
            // resolve unit ids out of band and pass `requested_units`.
            return Err(rpc_err(
                -32602,
                "address-only history queries are not supported; pass requested_units",
            )
            .into());
        }

        let tip = self.tip();
        let witness_proof =
            build_witness_proof(&self.state.storage, &tip, &request.witnesses).map_err(storage_err)?;

        let mut proofchain_balls = Vec::new();
        let mut joints = Vec::new();
        for unit_id in &request.requested_units {
            let chain = self.link_proof_chain(unit_id)?;
            for joint in &chain {
                if let Some(ball) = &joint.ball {
                    if !proofchain_balls.contains(ball) {
                        proofchain_balls.push(ball.clone());
                    }
                }
            }
            if let Some(joint) = chain.into_iter().next() {
                joints.push(joint);
            }
        }

        Ok(RpcHistoryResponse {
            witness_proof,
            proofchain_balls,
            joints,
        })
    }

    async fn get_link_proofs(&self, unit_ids: Vec<UnitId>) -> RpcResult<Vec<RpcLinkProof>> {
        if unit_ids.len() > 100 {
            return Err(rpc_err(-32602, "at most 100 unit ids per request").into());
        }
        let mut out = Vec::with_capacity(unit_ids.len());
        for unit_id in unit_ids {
            let chain = self.link_proof_chain(&unit_id)?;
            out.push(RpcLinkProof { unit_id, chain });
        }
        Ok(out)
    }

    async fn get_version(&self) -> RpcResult<RpcVersionInfo> {
        Ok(RpcVersionInfo {
            node_version: env!("CARGO_PKG_VERSION").to_string(),
            protocol_version: "1".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tempdir(tag: &str) -> std::path::PathBuf {
        let mut p = std::env::temp_dir();
        p.push(format!("ledger-rpc-{tag}-{}", std::process::id()));
        p
    }

    #[tokio::test]
    async fn get_joint_rejects_unknown_unit() {
        let storage = Arc::new(Storage::open(tempdir("unknown")).unwrap());
        let state = Arc::new(RpcServerState {
            storage,
            witnesses: vec![],
            tip: Arc::new(RwLock::new(ledger_core::types::Hash32::from_bytes([0u8; 32]))),
        });
        let server = RpcServer::new(state);
        let err = server
            .get_joint(ledger_core::types::Hash32::from_bytes([9u8; 32]))
            .await
            .unwrap_err();
        assert!(format!("{err:?}").contains("unknown unit"));
    }
}
