pub mod constants;
pub mod error;
pub mod model;
pub mod types;

pub use constants::*;
pub use error::{
    ConsensusError, FatalError, JointError, LedgerError, ProtocolError, StorageError,
    TransientError, UnitError, ValidationOutcome, ValidationResult,
};
pub use model::*;
pub use types::*;
