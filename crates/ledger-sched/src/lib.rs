//! ledger-sched
//!
//! The scheduling primitives spec.md §4.10 names: a keyed mutex with
//! canonical lock-acquisition ordering, and a reroutable-request runner
//! with stall/reroute/absolute-timeout bounds. No teacher precedent for
//! either shape exists in this workspace — both are grounded directly on
//! spec.md's own description plus the error taxonomy already defined in
//! `ledger-core`.

pub mod mutex;
pub mod reroute;

pub use mutex::{KeyGuard, KeyedMutex};
pub use reroute::{run_reroutable, RerouteBounds};
