//! Autonomous Agent engine: static validation of an AA's body (once, when
//! its defining unit is accepted) and the tree-walking interpreter that
//! runs it (once per trigger). Neither module depends on `ledger-consensus`
//! for anything beyond the `AaTriggerHandler`/`AaOutcome` trait it defines —
//! `ledger-node` is the one place that wires an `AaEngine` run into a
//! `Writer`-ready `AaOutcome`.

pub mod error;
pub mod handler;
pub mod interpreter;
pub mod validate;

pub use error::AaRuntimeError;
pub use handler::AaHandler;
pub use interpreter::{AaEffects, AaEngine, AaExecutionOutcome, TriggerContext};
pub use validate::validate_aa_definition;
