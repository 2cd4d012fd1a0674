//! ─── Protocol Constants ──────────────────────────────────────────────────────
//!
//! Fixed parameters of the witness-based DAG ledger. None of these are
//! governance-tunable; changing one is a hard fork.

// ── Witnesses & main-chain selection ─────────────────────────────────────────

/// Size of a unit's witness list.
pub const COUNT_WITNESSES: usize = 12;

/// Distinct witnesses required on the best-parent chain before `witnessed_level`
/// stops walking.
pub const MAJORITY_OF_WITNESSES: usize = 7;

/// Maximum number of witness-list entries that may differ between a unit and
/// each of its MC-path ancestors.
pub const MAX_WITNESS_LIST_MUTATIONS: usize = 1;

/// Minimum shared witnesses a unit must have with every ancestor on the MC
/// path: `COUNT_WITNESSES - MAX_WITNESS_LIST_MUTATIONS`.
pub const MIN_SHARED_WITNESSES: usize = COUNT_WITNESSES - MAX_WITNESS_LIST_MUTATIONS;

// ── Timestamps ────────────────────────────────────────────────────────────────

/// A unit's timestamp may not exceed `now + FUTURE_TIMESTAMP_ALLOWANCE_SECS`.
pub const FUTURE_TIMESTAMP_ALLOWANCE_SECS: i64 = 3_600;

// ── Object-size accounting ───────────────────────────────────────────────────

/// Hard recursion-depth cap for `getLength`; exceeding this is a structural
/// error, never a stack overflow.
pub const MAX_SIZE_COMPUTATION_DEPTH: u32 = 1_000;

/// Maximum allowed ratio of `length_with_keys` to `length_without_keys`.
pub const MAX_COMMISSION_RATIO: u64 = 3;

/// Per-byte price of declared-but-droppable `temp_data` payload length.
pub const TEMP_DATA_PRICE: u64 = 1;

// ── Graph traversal ───────────────────────────────────────────────────────────

/// Hard cap on DAG nodes visited by a single `determine_if_included` call.
pub const MAX_GRAPH_TRAVERSAL_NODES: usize = 100_000;

// ── AA Engine ─────────────────────────────────────────────────────────────────

/// Maximum nesting depth of a parsed AA formula tree.
pub const MAX_AA_FORMULA_DEPTH: u32 = 100;

/// Maximum number of primitive operations an AA formula may contain.
pub const MAX_AA_OPS: u64 = 20_000;

/// Interpreter steps between cooperative yield points.
pub const AA_YIELD_EVERY_STEPS: u64 = 100;

/// Maximum number of arguments accepted by a single `log()` call.
pub const MAX_LOG_ARGS: usize = 100;

/// Maximum cumulative size, in bytes, of one trigger's accumulated log buffer.
pub const MAX_LOG_BYTES: usize = 100 * 1024;

/// Fee deducted from a bounced trigger's funds before returning them to the author.
pub const BOUNCE_FEE: Amount = 10_000;

use crate::types::Amount;

// ── Joint ingress / purge bounds ─────────────────────────────────────────────

/// Maximum iterations per `purge_uncovered_nonserial_joints` invocation.
pub const PURGE_MAX_ITERATIONS: u32 = 100;

/// Maximum wall-clock seconds per `purge_uncovered_nonserial_joints` invocation.
pub const PURGE_MAX_ELAPSED_SECS: u64 = 30;

/// Row batch size for purge queries.
pub const PURGE_BATCH_LIMIT: usize = 50;

// ── Mutex & request rerouting ─────────────────────────────────────────────────

/// Seconds a reroutable request waits for a response before being resent to
/// the next peer.
pub const STALLED_TIMEOUT_SECS: u64 = 5;

/// Maximum number of times a single request may be rerouted to a new peer.
pub const MAX_REROUTE_COUNT: u32 = 20;

/// Absolute deadline for a reroutable request, regardless of reroute count.
pub const ABSOLUTE_REQUEST_TIMEOUT_SECS: u64 = 600;

// ── Peer-request input bounds ─────────────────────────────────────────────────

/// Maximum `unit_ids` accepted by `light/get_link_proofs` in one call.
pub const MAX_LINK_PROOF_UNITS: usize = 100;

// ── Protocol / wire ───────────────────────────────────────────────────────────

/// Protocol versions this node accepts on ingress.
pub const SUPPORTED_VERSIONS: &[&str] = &["4.0", "3.0"];

/// The current protocol version new local units are composed with.
pub const CURRENT_VERSION: &str = "4.0";
