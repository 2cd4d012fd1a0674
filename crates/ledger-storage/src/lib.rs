//! Durable storage: sled-backed tables for units, outputs, balls, definitions,
//! data feeds, and AA state, plus the in-memory index over not-yet-stable
//! units. See `DESIGN.md` for how this maps onto the documented table list.

pub mod index;
pub mod keys;
pub mod storage;
pub mod tables;

pub use index::UnstableIndex;
pub use storage::Storage;
pub use tables::{
    AaAddressRecord, AaResponseRecord, AaTriggerRecord, HashTreeBallRecord, StoredUnit,
    UnhandledJointRecord,
};
