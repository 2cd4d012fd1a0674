//! ledger-sync
//!
//! The catchup/witness-proof protocol light clients use to join the
//! network without replaying full validation (spec.md §4.8), plus the
//! joint-ingress bookkeeping for units that arrive before their parents
//! (spec.md §4.9).

pub mod catchup;
pub mod ingress;
pub mod witness_proof;

pub use catchup::{
    build_catchup_response, collect_hash_tree, verify_hash_tree_chunk, CatchupRequest,
    CatchupResponse,
};
pub use ingress::{purge_dependent, purge_uncovered_nonserial_joints, save_unhandled_joint};
pub use witness_proof::{build_witness_proof, validate_witness_proof, WitnessProof};
