use thiserror::Error;

use crate::types::UnitId;

// ── UnitError ─────────────────────────────────────────────────────────────────
// Malformed field, bad signature: the unit is rejected, the peer may be
// penalized, the node never crashes.

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UnitError {
    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(String),

    #[error("alt {got} does not match network alt {expected}")]
    WrongAlt { expected: String, got: String },

    #[error("forbidden field present on a {kind} unit: {field}")]
    ForbiddenField { kind: &'static str, field: &'static str },

    #[error("timestamp {ts} is more than {allowance}s in the future of {now}")]
    TimestampTooFarInFuture { ts: i64, now: i64, allowance: i64 },

    #[error("timestamp {ts} precedes parent timestamp {parent_ts}")]
    TimestampBeforeParent { ts: i64, parent_ts: i64 },

    #[error("parents are not sorted ascending")]
    ParentsNotSorted,

    #[error("duplicate parent {0}")]
    DuplicateParent(UnitId),

    #[error("parent {0} is not sequence good")]
    ParentNotGood(UnitId),

    #[error("unit has no parents and is not genesis")]
    NoParents,

    #[error("witness list must contain exactly {expected} addresses, got {got}")]
    WrongWitnessCount { expected: usize, got: usize },

    #[error("witness list is not sorted ascending")]
    WitnessListNotSorted,

    #[error("shares only {got} witnesses with ancestor, need at least {min}")]
    NotEnoughMatchingWitnesses { got: usize, min: usize },

    #[error("author address does not match its definition")]
    AuthorAddressMismatch,

    #[error("definition field present but an on-chain definition already exists")]
    UnexpectedDefinition,

    #[error("definition field missing and no prior on-chain definition exists")]
    MissingDefinition,

    #[error("signature verification failed for author {0}")]
    BadSignature(crate::types::Address32),

    #[error("payload_hash mismatch for message at index {0}")]
    PayloadHashMismatch(usize),

    #[error("payment inputs ({inputs}) do not sum to outputs + fees ({outputs})")]
    PaymentDoesNotBalance { inputs: u64, outputs: u64 },

    #[error("double spend: input already consumed by an ancestor unit")]
    DoubleSpendByAncestor,

    #[error("AA definition formula exceeds max depth {max}")]
    AaFormulaTooDeep { max: u32 },

    #[error("AA definition formula exceeds op budget {max}")]
    AaFormulaTooComplex { max: u64 },

    #[error("bounce/require used inside a getter body")]
    BounceOrRequireInGetter,

    #[error("headers_commission mismatch: declared {declared}, computed {computed}")]
    HeadersCommissionMismatch { declared: u64, computed: u64 },

    #[error("payload_commission mismatch: declared {declared}, computed {computed}")]
    PayloadCommissionMismatch { declared: u64, computed: u64 },
}

// ── JointError ────────────────────────────────────────────────────────────────
// Hash mismatch, depth overflow in size computation: same handling as
// UnitError, but these are joint-envelope-level failures.

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum JointError {
    #[error("unit_hash mismatch: computed {computed}, claimed {claimed}")]
    HashMismatch { computed: UnitId, claimed: UnitId },

    #[error("ball hash mismatch: computed {computed}, claimed {claimed}")]
    BallHashMismatch { computed: crate::types::BallId, claimed: crate::types::BallId },

    #[error("payload size computation failed: recursion depth exceeded {max}")]
    SizeComputationDepthExceeded { max: u32 },

    #[error("commission ratio {ratio} exceeds maximum {max}")]
    RatioExceeded { ratio: u64, max: u64 },

    #[error("malformed joint: {0}")]
    Malformed(String),
}

// ── TransientError ────────────────────────────────────────────────────────────
// Missing parents, timestamp momentarily ahead of local clock skew tolerance:
// the joint is queued and retried once its dependency arrives.

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransientError {
    #[error("missing {0} parent unit(s)")]
    NeedParents(usize),

    #[error("referenced last_ball_unit {0} is not yet known")]
    NeedLastBallUnit(UnitId),

    #[error("referenced definition change is not yet known")]
    NeedDefinition,
}

// ── ConsensusError ────────────────────────────────────────────────────────────
// Double-spend discovered at stabilization: resolved deterministically, the
// loser becomes `final-bad`.

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConsensusError {
    #[error("double spend resolved against unit {loser}; winner is {winner}")]
    DoubleSpendLoser { winner: UnitId, loser: UnitId },

    #[error("main_chain_index non-monotonic: attempted to reassign {unit}")]
    NonMonotonicMci { unit: UnitId },
}

// ── StorageError ──────────────────────────────────────────────────────────────
// Disk write failure: transaction rolled back, caller informed, no partial
// in-memory mutation kept.

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("transaction aborted: {0}")]
    TransactionAborted(String),
}

// ── ProtocolError ──────────────────────────────────────────────────────────────
// Peer delivered a malformed witness proof or catchup chunk: peer reported,
// proof discarded, never a crash.

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("witness proof has no unstable_mc_joints")]
    EmptyWitnessProof,

    #[error("witness proof does not reach {min} distinct witnesses")]
    InsufficientWitnessesInProof { min: usize },

    #[error("witness proof unit {0} is not a parent of the prior unit")]
    ProofChainBroken(UnitId),

    #[error("witness proof is missing a required definition")]
    MissingDefinitionInProof,

    #[error("witness proof has no last_ball_unit")]
    NoLastBallUnit,

    #[error("skiplist ball {0} references a unit outside the current catchup range")]
    SkiplistFabrication(crate::types::BallId),

    #[error("request exceeds bound: {0}")]
    RequestBoundExceeded(String),

    #[error("response timed out after {reroutes} reroutes")]
    ResponseTimeout { reroutes: u32 },

    #[error("peer is not reachable over the network boundary")]
    PeerUnreachable,
}

// ── FatalError ────────────────────────────────────────────────────────────────
// Invariant breached: the process exits with a diagnostic after flushing
// storage; no partial commit is ever left behind.

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FatalError {
    #[error("invariant violated: {0}")]
    InvariantViolated(String),

    #[error("main chain index assigned out of order at unit {0}")]
    MciOutOfOrder(UnitId),
}

// ── Aggregate ─────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error(transparent)]
    Unit(#[from] UnitError),
    #[error(transparent)]
    Joint(#[from] JointError),
    #[error(transparent)]
    Transient(#[from] TransientError),
    #[error(transparent)]
    Consensus(#[from] ConsensusError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    Fatal(#[from] FatalError),
}

impl From<sled::Error> for LedgerError {
    fn from(e: sled::Error) -> Self {
        LedgerError::Storage(StorageError::Sled(e))
    }
}

impl From<bincode::Error> for LedgerError {
    fn from(e: bincode::Error) -> Self {
        LedgerError::Storage(StorageError::Serialization(e))
    }
}

/// Outcome of `Validator::validate`. `NeedParents` is distinct from a typed
/// error: it is the signal that routes a joint into `unhandled_joints`
/// rather than rejecting it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationOutcome {
    Valid,
    NeedParents(Vec<UnitId>),
}

pub type ValidationResult = Result<ValidationOutcome, LedgerError>;
