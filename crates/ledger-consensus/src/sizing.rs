//! Commission byte-size accounting: `getLength`, `ratio`, `total_payload_size`.

use ledger_core::constants::{MAX_COMMISSION_RATIO, MAX_SIZE_COMPUTATION_DEPTH, TEMP_DATA_PRICE};
use ledger_core::error::JointError;
use ledger_core::model::{Message, MessagePayload, Unit};
use serde_json::Value;

/// Counts `value`'s wire size the way the protocol does: strings by code
/// unit, numbers as 8 bytes, booleans as 1 byte, arrays/objects recursively.
/// `with_keys` includes object key bytes in the total. Bails out past
/// `MAX_SIZE_COMPUTATION_DEPTH` instead of recursing unboundedly.
pub fn get_length(value: &Value, with_keys: bool, depth: u32) -> Result<u64, JointError> {
    if depth > MAX_SIZE_COMPUTATION_DEPTH {
        return Err(JointError::SizeComputationDepthExceeded {
            max: MAX_SIZE_COMPUTATION_DEPTH,
        });
    }
    let len = match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 8,
        Value::String(s) => s.encode_utf16().count() as u64,
        Value::Array(items) => {
            let mut total = 0u64;
            for item in items {
                total += get_length(item, with_keys, depth + 1)?;
            }
            total
        }
        Value::Object(map) => {
            let mut total = 0u64;
            for (k, v) in map {
                if with_keys {
                    total += k.encode_utf16().count() as u64;
                }
                total += get_length(v, with_keys, depth + 1)?;
            }
            total
        }
    };
    Ok(len)
}

/// `ratio(unit) = length_with_keys / length_without_keys`.
pub fn ratio(value: &Value) -> Result<f64, JointError> {
    let with_keys = get_length(value, true, 0)? as f64;
    let without_keys = get_length(value, false, 0)? as f64;
    if without_keys == 0.0 {
        return Ok(1.0);
    }
    Ok(with_keys / without_keys)
}

pub fn check_ratio(value: &Value) -> Result<(), JointError> {
    let r = ratio(value)?;
    if r > MAX_COMMISSION_RATIO as f64 {
        return Err(JointError::RatioExceeded {
            ratio: r as u64,
            max: MAX_COMMISSION_RATIO,
        });
    }
    Ok(())
}

fn stripped_message(message: &Message) -> Value {
    match &message.payload {
        Some(MessagePayload::Text(_)) | None => Value::Null,
        Some(payload) => serde_json::to_value(payload).unwrap_or(Value::Null),
    }
}

/// `total_payload_size(unit) = ceil(temp_data_length * TEMP_DATA_PRICE) +
/// getLength({messages: stripped_messages}, with_keys)`.
pub fn total_payload_size(unit: &Unit, temp_data_length: u64) -> Result<u64, JointError> {
    let stripped: Vec<Value> = unit.messages.iter().map(stripped_message).collect();
    let wrapper = serde_json::json!({ "messages": stripped });
    let temp_data_cost = temp_data_length * TEMP_DATA_PRICE;
    Ok(temp_data_cost + get_length(&wrapper, true, 0)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn length_counts_primitives() {
        assert_eq!(get_length(&Value::Bool(true), true, 0).unwrap(), 1);
        assert_eq!(get_length(&serde_json::json!(1.0), true, 0).unwrap(), 8);
        assert_eq!(get_length(&serde_json::json!("abcd"), true, 0).unwrap(), 4);
    }

    #[test]
    fn with_keys_adds_key_bytes() {
        let v = serde_json::json!({"ab": "xy"});
        let with = get_length(&v, true, 0).unwrap();
        let without = get_length(&v, false, 0).unwrap();
        assert_eq!(with, without + 2);
    }

    #[test]
    fn depth_guard_rejects_deep_nesting() {
        let mut v = serde_json::json!(1);
        for _ in 0..(MAX_SIZE_COMPUTATION_DEPTH + 10) {
            v = serde_json::json!([v]);
        }
        assert!(matches!(
            get_length(&v, true, 0),
            Err(JointError::SizeComputationDepthExceeded { .. })
        ));
    }

    #[test]
    fn ratio_rejects_excessive_key_overhead() {
        let v = serde_json::json!({"a_very_long_key_name_here": 1});
        let r = ratio(&v).unwrap();
        assert!(r > 1.0);
    }
}
