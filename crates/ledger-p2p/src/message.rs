use ledger_core::model::Joint;
use ledger_core::types::UnitId;
use serde::{Deserialize, Serialize};

/// Wire messages exchanged across the network boundary.
///
/// Grounded on `chronx_p2p::message::P2pMessage`'s enum-of-wire-messages
/// shape, generalized from a four-variant gossip/sync protocol to the
/// joint-broadcast/request/response shape `Network` names: a peer either
/// pushes a new joint unsolicited (`NewJoint`), asks another peer for one
/// by id (`RequestJoint`), or answers such a request (`JointResponse`,
/// which may legitimately carry `None` if the peer doesn't have it).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum P2pMessage {
    /// A peer is broadcasting a newly-received joint.
    NewJoint { joint: Joint },

    /// Request a specific joint by its unit id (used during catchup and
    /// dependency resolution).
    RequestJoint { unit_id: UnitId },

    /// Response to a `RequestJoint`; `None` if the peer does not have it.
    JointResponse {
        unit_id: UnitId,
        joint: Option<Joint>,
    },
}

impl P2pMessage {
    /// Serializes to bytes for a wire transport. JSON rather than the
    /// teacher's bincode: every other wire-facing boundary in this crate
    /// (`ledger-rpc`) already speaks JSON, and `Joint`'s canonical encoding
    /// is JSON-keyed (`ledger_crypto::hash::canonical_encode`) — keeping
    /// one serialization format end to end avoids a second, parallel
    /// encoding of the same types.
    pub fn to_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(self).expect("P2pMessage serialization is infallible")
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger_core::types::Hash32;

    #[test]
    fn round_trips_request_joint() {
        let msg = P2pMessage::RequestJoint {
            unit_id: Hash32::from_bytes([7u8; 32]),
        };
        let bytes = msg.to_bytes();
        let back = P2pMessage::from_bytes(&bytes).unwrap();
        match back {
            P2pMessage::RequestJoint { unit_id } => {
                assert_eq!(unit_id, Hash32::from_bytes([7u8; 32]))
            }
            _ => panic!("wrong variant"),
        }
    }
}
