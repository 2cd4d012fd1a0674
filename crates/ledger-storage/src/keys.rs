//! Binary key encodings for the sled trees. Keys are built so that sled's
//! lexicographic ordering gives us the range scans the read operations need
//! (e.g. "every definition change for this address, MCI ascending").

use ledger_core::types::{Address32, BallId, Mci, UnitId};

pub fn unit_key(unit: &UnitId) -> [u8; 32] {
    *unit.as_bytes()
}

pub fn parenthood_key(child: &UnitId, parent: &UnitId) -> Vec<u8> {
    let mut k = Vec::with_capacity(64);
    k.extend_from_slice(child.as_bytes());
    k.extend_from_slice(parent.as_bytes());
    k
}

pub fn child_index_key(parent: &UnitId, child: &UnitId) -> Vec<u8> {
    let mut k = Vec::with_capacity(64);
    k.extend_from_slice(parent.as_bytes());
    k.extend_from_slice(child.as_bytes());
    k
}

pub fn output_key(unit: &UnitId, msg_index: u32, output_index: u32) -> Vec<u8> {
    let mut k = Vec::with_capacity(40);
    k.extend_from_slice(unit.as_bytes());
    k.extend_from_slice(&msg_index.to_be_bytes());
    k.extend_from_slice(&output_index.to_be_bytes());
    k
}

pub fn output_key_prefix(unit: &UnitId) -> Vec<u8> {
    unit.as_bytes().to_vec()
}

/// `address || mci(be) || unit_id` — a range scan over this prefix, bounded
/// above by `address || (max_mci+1)`, yields every definition change for
/// `address` with `mci <= max_mci`, sorted ascending by `(mci, unit_id)`.
pub fn definition_change_key(address: &Address32, mci: Mci, unit: &UnitId) -> Vec<u8> {
    let mut k = Vec::with_capacity(32 + 8 + 32);
    k.extend_from_slice(address.as_str().as_bytes());
    k.extend_from_slice(&mci.to_be_bytes());
    k.extend_from_slice(unit.as_bytes());
    k
}

pub fn definition_change_address_prefix(address: &Address32) -> Vec<u8> {
    address.as_str().as_bytes().to_vec()
}

/// `address || feed_name (nul-terminated) || mci(be) || unit_id`.
pub fn data_feed_key(address: &Address32, feed_name: &str, mci: Mci, unit: &UnitId) -> Vec<u8> {
    let mut k = Vec::with_capacity(32 + feed_name.len() + 1 + 8 + 32);
    k.extend_from_slice(address.as_str().as_bytes());
    k.extend_from_slice(feed_name.as_bytes());
    k.push(0);
    k.extend_from_slice(&mci.to_be_bytes());
    k.extend_from_slice(unit.as_bytes());
    k
}

pub fn data_feed_prefix(address: &Address32, feed_name: &str) -> Vec<u8> {
    let mut k = Vec::with_capacity(32 + feed_name.len() + 1);
    k.extend_from_slice(address.as_str().as_bytes());
    k.extend_from_slice(feed_name.as_bytes());
    k.push(0);
    k
}

/// `mci(be) || level(be) || unit_id || aa_address` — iterating this tree in
/// key order is iterating AA triggers in the exact order the Stabilizer is
/// required to process them.
pub fn aa_trigger_key(mci: Mci, level: u64, unit: &UnitId, aa_address: &Address32) -> Vec<u8> {
    let mut k = Vec::with_capacity(8 + 8 + 32 + 32);
    k.extend_from_slice(&mci.to_be_bytes());
    k.extend_from_slice(&level.to_be_bytes());
    k.extend_from_slice(unit.as_bytes());
    k.extend_from_slice(aa_address.as_str().as_bytes());
    k
}

pub fn aa_state_var_key(aa_address: &Address32, var_name: &str) -> Vec<u8> {
    let mut k = Vec::with_capacity(32 + var_name.len());
    k.extend_from_slice(aa_address.as_str().as_bytes());
    k.extend_from_slice(var_name.as_bytes());
    k
}

pub fn dependency_key(missing_unit: &UnitId, dependent_unit: &UnitId) -> Vec<u8> {
    let mut k = Vec::with_capacity(64);
    k.extend_from_slice(missing_unit.as_bytes());
    k.extend_from_slice(dependent_unit.as_bytes());
    k
}

pub fn dependency_prefix(missing_unit: &UnitId) -> Vec<u8> {
    missing_unit.as_bytes().to_vec()
}

// ── KV namespace keys (§6 persisted-state layout) ─────────────────────────────

pub fn kv_joint_key(unit: &UnitId) -> Vec<u8> {
    format!("j\n{unit}").into_bytes()
}

pub fn kv_ball_key(ball: &BallId) -> Vec<u8> {
    format!("b\n{ball}").into_bytes()
}

pub fn kv_data_feed_key(addr: &Address32, feed: &str, value: &str, mci: Mci) -> Vec<u8> {
    format!("df\n{addr}\n{feed}\n{value}\n{mci}").into_bytes()
}

pub fn kv_data_feed_latest_key(addr: &Address32, feed: &str) -> Vec<u8> {
    format!("dfv\n{addr}\n{feed}").into_bytes()
}
