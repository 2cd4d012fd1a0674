//! ledger-p2p
//!
//! The network boundary a node depends on, specified here as a trait
//! (`Network`) rather than a concrete transport. Peer discovery, session
//! management, and the gossip mesh itself are explicitly out of scope
//! (spec.md §1); `ChannelNetwork` is the in-process test double used by
//! integration tests and the end-to-end scenarios in spec.md §8.

pub mod config;
pub mod message;
pub mod network;

pub use config::P2pConfig;
pub use message::P2pMessage;
pub use network::{ChannelNetwork, Network, PeerId};
