/// Configuration for a node's network boundary.
///
/// Unlike the teacher's `P2pConfig`, there is no listen address or
/// bootstrap-peer list here — peer discovery and transport selection are
/// the explicitly out-of-scope wire layer (spec.md §1). What remains is
/// the protocol-identity metadata an actual transport would need to
/// negotiate compatibility with peers.
#[derive(Debug, Clone)]
pub struct P2pConfig {
    /// Protocol version string advertised to peers during handshake.
    pub protocol_version: String,
    /// Channel depth for the in-process `ChannelNetwork` test double.
    pub channel_capacity: usize,
}

impl Default for P2pConfig {
    fn default() -> Self {
        Self {
            protocol_version: "/ledger-core/1.0.0".into(),
            channel_capacity: 256,
        }
    }
}
