//! Canonical encoding and the three hash-derived identifiers of the protocol:
//! `unit_hash`, `ball_hash`, and `address_from_definition`.

use ledger_core::model::{FormulaTree, Message, PayloadLocation, Unit, WitnessSource};
use ledger_core::types::{Address32, BallId, Hash32, UnitId};
use serde_json::Value;
use sha2::{Digest, Sha256};

pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Renders `value` into the canonical byte form used for hashing: object
/// keys sorted lexicographically at every level, arrays preserved in order.
/// `with_keys` controls whether object keys contribute their own bytes (used
/// by the commission length calculation's "with/without keys" variants); the
/// unit hash itself always uses `with_keys = true`.
pub fn canonical_encode(value: &Value, with_keys: bool) -> Vec<u8> {
    let mut out = String::new();
    write_canonical(value, with_keys, &mut out);
    out.into_bytes()
}

fn write_canonical(value: &Value, with_keys: bool, out: &mut String) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::String(s) => {
            out.push('"');
            out.push_str(s);
            out.push('"');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, with_keys, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, k) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                if with_keys {
                    out.push('"');
                    out.push_str(k);
                    out.push_str("\":");
                }
                write_canonical(&map[*k], with_keys, out);
            }
            out.push('}');
        }
    }
}

/// Strips the fields `unit_hash` excludes: `authentifiers`, `ball`,
/// `skiplist_balls`, and every message's `payload` (leaving only
/// `payload_hash`). Author addresses are sorted lexicographically.
fn unit_hash_json(unit: &Unit) -> Value {
    let mut authors: Vec<Value> = unit
        .authors
        .iter()
        .map(|a| {
            let mut obj = serde_json::Map::new();
            obj.insert("address".into(), Value::String(a.address.to_string()));
            if let Some(def) = &a.definition {
                obj.insert("definition".into(), def.clone());
            }
            Value::Object(obj)
        })
        .collect();
    authors.sort_by(|a, b| {
        a["address"]
            .as_str()
            .unwrap()
            .cmp(b["address"].as_str().unwrap())
    });

    let messages: Vec<Value> = unit
        .messages
        .iter()
        .map(stripped_message_json)
        .collect();

    let mut obj = serde_json::Map::new();
    obj.insert("version".into(), Value::String(unit.version.clone()));
    obj.insert("alt".into(), Value::String(unit.alt.clone()));
    obj.insert(
        "parent_units".into(),
        Value::Array(
            unit.parent_units
                .iter()
                .map(|p| Value::String(p.to_string()))
                .collect(),
        ),
    );
    if let Some(lbu) = &unit.last_ball_unit {
        obj.insert("last_ball_unit".into(), Value::String(lbu.to_string()));
    }
    if let Some(lb) = &unit.last_ball {
        obj.insert("last_ball".into(), Value::String(lb.to_string()));
    }
    match &unit.witnesses {
        WitnessSource::Inline(list) => {
            obj.insert(
                "witnesses".into(),
                Value::Array(list.iter().map(|w| Value::String(w.to_string())).collect()),
            );
        }
        WitnessSource::FromUnit(u) => {
            obj.insert("witness_list_unit".into(), Value::String(u.to_string()));
        }
    }
    obj.insert("timestamp".into(), Value::from(unit.timestamp));
    obj.insert("authors".into(), Value::Array(authors));
    obj.insert("messages".into(), Value::Array(messages));
    obj.insert(
        "headers_commission".into(),
        Value::from(unit.headers_commission),
    );
    obj.insert(
        "payload_commission".into(),
        Value::from(unit.payload_commission),
    );
    obj.insert("oversize_fee".into(), Value::from(unit.oversize_fee));
    obj.insert("tps_fee".into(), Value::from(unit.tps_fee));
    obj.insert("burn_fee".into(), Value::from(unit.burn_fee));
    Value::Object(obj)
}

fn stripped_message_json(msg: &Message) -> Value {
    let mut obj = serde_json::Map::new();
    obj.insert("app".into(), Value::String(msg.app.clone()));
    obj.insert(
        "payload_location".into(),
        Value::String(
            match msg.payload_location {
                PayloadLocation::Inline => "inline",
                PayloadLocation::Uri => "uri",
                PayloadLocation::None => "none",
            }
            .to_string(),
        ),
    );
    obj.insert(
        "payload_hash".into(),
        Value::String(msg.payload_hash.to_string()),
    );
    Value::Object(obj)
}

/// `unit_hash(unit) == unit.unit_id` is the first testable invariant of the
/// protocol; this function never panics on a well-formed `Unit` value.
pub fn unit_hash(unit: &Unit) -> UnitId {
    let json = unit_hash_json(unit);
    let bytes = canonical_encode(&json, true);
    Hash32::from_bytes(sha256(&bytes))
}

/// Ball hash: concatenated base64 strings joined by newlines, SHA-256'd.
/// Order: `unit_id`, then each `parent_balls` entry, then each
/// `skiplist_balls` entry, then the literal `"1"`/`"0"` tag for
/// `is_nonserial`.
pub fn ball_hash(
    unit_id: &UnitId,
    parent_balls: &[BallId],
    skiplist_balls: &[BallId],
    is_nonserial: bool,
) -> BallId {
    let mut parts: Vec<String> = Vec::with_capacity(2 + parent_balls.len() + skiplist_balls.len());
    parts.push(unit_id.to_string());
    parts.extend(parent_balls.iter().map(|b| b.to_string()));
    parts.extend(skiplist_balls.iter().map(|b| b.to_string()));
    parts.push(if is_nonserial { "1" } else { "0" }.to_string());
    let joined = parts.join("\n");
    Hash32::from_bytes(sha256(joined.as_bytes()))
}

/// Derives a checksummed 32-character base32 address from a definition
/// predicate tree. The exact checksum construction is this implementation's
/// own (the source spec fixes only the 32-char base32 shape, not the byte
/// layout): SHA-256 of the canonical definition, truncated to 16 bytes, with
/// a 4-byte SHA-256-derived checksum appended — 20 bytes encodes to exactly
/// 32 base32 characters with no padding.
pub fn address_from_definition(definition: &FormulaTree) -> Address32 {
    let digest = sha256(&canonical_encode(definition, true));
    let payload = &digest[0..16];
    let checksum = &sha256(payload)[0..4];
    let mut combined = [0u8; 20];
    combined[0..16].copy_from_slice(payload);
    combined[16..20].copy_from_slice(checksum);
    let encoded = base32::encode(base32::Alphabet::Rfc4648 { padding: false }, &combined);
    Address32::from_string(encoded).expect("20-byte input always yields a valid 32-char address")
}

/// Re-derives the checksum bytes of an already-decoded address body and
/// compares them; used to sanity-check addresses arriving from peers before
/// treating them as a definition fingerprint.
pub fn verify_address_checksum(addr: &Address32) -> bool {
    let Ok(bytes) = base32::decode(base32::Alphabet::Rfc4648 { padding: false }, addr.as_str())
    else {
        return false;
    };
    if bytes.len() != 20 {
        return false;
    }
    let payload = &bytes[0..16];
    let checksum = &bytes[16..20];
    sha256(payload)[0..4] == *checksum
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger_core::model::{Author, WitnessSource};
    use std::collections::BTreeMap;

    fn sample_unit() -> Unit {
        Unit {
            unit_id: Hash32::from_bytes([0u8; 32]),
            version: "4.0".into(),
            alt: "1".into(),
            parent_units: vec![],
            last_ball_unit: None,
            last_ball: None,
            witnesses: WitnessSource::Inline(vec![]),
            timestamp: 0,
            authors: vec![Author {
                address: Address32::from_string("B".repeat(32)).unwrap(),
                definition: None,
                authentifiers: BTreeMap::new(),
            }],
            messages: vec![],
            headers_commission: 0,
            payload_commission: 0,
            oversize_fee: 0,
            tps_fee: 0,
            burn_fee: 0,
        }
    }

    #[test]
    fn canonical_encode_sorts_object_keys() {
        let v = serde_json::json!({"b": 1, "a": 2});
        let encoded = canonical_encode(&v, true);
        assert_eq!(String::from_utf8(encoded).unwrap(), r#"{"a":2,"b":1}"#);
    }

    #[test]
    fn canonical_encode_without_keys_drops_key_bytes() {
        let v = serde_json::json!({"longkeyname": 1});
        let with = canonical_encode(&v, true);
        let without = canonical_encode(&v, false);
        assert!(with.len() > without.len());
    }

    #[test]
    fn unit_hash_is_deterministic() {
        let u = sample_unit();
        let h1 = unit_hash(&u);
        let h2 = unit_hash(&u);
        assert_eq!(h1, h2);
    }

    #[test]
    fn unit_hash_ignores_author_order() {
        let mut u1 = sample_unit();
        u1.authors.push(Author {
            address: Address32::from_string("A".repeat(32)).unwrap(),
            definition: None,
            authentifiers: BTreeMap::new(),
        });
        let mut u2 = u1.clone();
        u2.authors.reverse();
        assert_eq!(unit_hash(&u1), unit_hash(&u2));
    }

    #[test]
    fn ball_hash_is_deterministic_and_order_sensitive() {
        let unit_id = Hash32::from_bytes([1u8; 32]);
        let p1 = Hash32::from_bytes([2u8; 32]);
        let p2 = Hash32::from_bytes([3u8; 32]);
        let h1 = ball_hash(&unit_id, &[p1, p2], &[], false);
        let h2 = ball_hash(&unit_id, &[p2, p1], &[], false);
        assert_ne!(h1, h2);
    }

    #[test]
    fn address_from_definition_round_trips_checksum() {
        let def = serde_json::json!(["sig", {"pubkey": "abc"}]);
        let addr = address_from_definition(&def);
        assert!(verify_address_checksum(&addr));
    }

    #[test]
    fn address_from_definition_is_deterministic() {
        let def = serde_json::json!(["sig", {"pubkey": "abc"}]);
        assert_eq!(address_from_definition(&def), address_from_definition(&def));
    }
}
