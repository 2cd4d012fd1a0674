//! Errors local to one AA execution. Every variant here is caught by the
//! interpreter's caller and turned into a bounce response — none of them
//! ever escape as a node-level `LedgerError`; that type is reserved for the
//! one-time static validation pass in [`crate::validate`].

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum AaRuntimeError {
    #[error("bounce: {0}")]
    Bounce(String),

    #[error("require failed: {0}")]
    RequireFailed(String),

    #[error("division by zero")]
    DivisionByZero,

    #[error("unknown operator '{0}'")]
    UnknownOp(String),

    #[error("type error: {0}")]
    TypeError(String),

    #[error("reference to undeclared variable '{0}'")]
    UnknownVar(String),

    #[error("reference to undeclared getter '{0}' on {1}")]
    UnknownGetter(String, String),

    #[error("log() exceeded {0} arguments")]
    LogArgsExceeded(usize),

    #[error("log() buffer exceeded {0} bytes")]
    LogBytesExceeded(usize),

    #[error("formula exceeded its interpreter step budget")]
    StepBudgetExceeded,

    #[error("getter body attempted to mutate state or bounce/require")]
    GetterSideEffect,

    #[error("malformed formula node: {0}")]
    Malformed(String),
}
