use ledger_core::types::{Address32, Amount};
use serde::{Deserialize, Serialize};

/// Everything a fresh node needs to bootstrap its own genesis unit.
///
/// In production these come from the network's published genesis
/// parameters (shipped alongside the node binary); tests construct one
/// with freshly-derived addresses.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GenesisParams {
    pub alt: String,
    /// Exactly `COUNT_WITNESSES` addresses, ascending.
    pub witnesses: Vec<Address32>,
    /// The base-asset outputs genesis issues. Unlike an ordinary payment,
    /// there is no spending input to balance against — this is the one
    /// place new supply enters the ledger.
    pub initial_allocation: Vec<(Address32, Amount)>,
}
