//! One-time static validation of an AA body, performed when its defining
//! unit is accepted (mirrors `ledger-consensus::validation`'s one-time
//! checks for ordinary definitions). Two things are enforced here that the
//! lightweight depth/op-count guard in `ledger-consensus::validation`
//! (`check_aa_formula_budget`) does not attempt: the getter lexical-scope
//! restriction, and the shape of the body object itself
//! (`{"getters": {...}, "messages": [...]}`).

use ledger_core::constants::{MAX_AA_FORMULA_DEPTH, MAX_AA_OPS};
use ledger_core::error::{LedgerError, UnitError};
use ledger_core::model::FormulaTree;

/// Validates `body` (the second element of `["autonomous agent", body]`).
pub fn validate_aa_definition(body: &FormulaTree) -> Result<(), LedgerError> {
    let obj = body
        .as_object()
        .ok_or_else(|| LedgerError::from(UnitError::AaFormulaTooComplex { max: MAX_AA_OPS }))?;

    let messages = obj
        .get("messages")
        .and_then(|v| v.as_array())
        .ok_or_else(|| LedgerError::from(UnitError::AaFormulaTooComplex { max: MAX_AA_OPS }))?;

    let mut ops = 0u64;
    for m in messages {
        walk_budget(m, 0, &mut ops)?;
    }

    if let Some(getters) = obj.get("getters").and_then(|v| v.as_object()) {
        for (_name, getter_body) in getters {
            walk_budget(getter_body, 0, &mut ops)?;
            reject_side_effects_in_getter(getter_body)?;
        }
    }

    Ok(())
}

fn walk_budget(tree: &FormulaTree, depth: u32, ops: &mut u64) -> Result<(), LedgerError> {
    if depth > MAX_AA_FORMULA_DEPTH {
        return Err(UnitError::AaFormulaTooDeep {
            max: MAX_AA_FORMULA_DEPTH,
        }
        .into());
    }
    if let Some(arr) = tree.as_array() {
        if !arr.is_empty() && arr[0].is_string() {
            *ops += 1;
            if *ops > MAX_AA_OPS {
                return Err(UnitError::AaFormulaTooComplex { max: MAX_AA_OPS }.into());
            }
        }
        for child in arr {
            walk_budget(child, depth + 1, ops)?;
        }
    }
    Ok(())
}

/// A getter body may not contain `bounce`, `require`, `set_state_var`, or
/// `send` anywhere within it — including inside a nested `if`/`seq`/`let`,
/// not just at the top level. Walks the whole tree, not just its outermost
/// shape.
fn reject_side_effects_in_getter(tree: &FormulaTree) -> Result<(), LedgerError> {
    if let Some(arr) = tree.as_array() {
        if let Some(op) = arr.first().and_then(|v| v.as_str()) {
            if matches!(op, "bounce" | "require" | "set_state_var" | "send") {
                return Err(UnitError::BounceOrRequireInGetter.into());
            }
        }
        for child in arr {
            reject_side_effects_in_getter(child)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn accepts_well_formed_body() {
        let body = json!({
            "getters": { "balance_of": ["state_var", "balance"] },
            "messages": [
                ["require", ["trigger.amount"], "need funds"],
                ["set_state_var", "balance", ["trigger.amount"]],
            ],
        });
        assert!(validate_aa_definition(&body).is_ok());
    }

    #[test]
    fn rejects_bounce_inside_getter() {
        let body = json!({
            "getters": { "bad": ["seq", ["bounce", "nope"], 1] },
            "messages": [],
        });
        match validate_aa_definition(&body) {
            Err(LedgerError::Unit(UnitError::BounceOrRequireInGetter)) => {}
            other => panic!("expected BounceOrRequireInGetter, got {other:?}"),
        }
    }

    #[test]
    fn rejects_missing_messages_array() {
        let body = json!({ "getters": {} });
        assert!(validate_aa_definition(&body).is_err());
    }

    #[test]
    fn rejects_excessive_depth() {
        let mut tree = json!(1);
        for _ in 0..(MAX_AA_FORMULA_DEPTH + 5) {
            tree = json!(["not", tree]);
        }
        let body = json!({ "getters": {}, "messages": [tree] });
        match validate_aa_definition(&body) {
            Err(LedgerError::Unit(UnitError::AaFormulaTooDeep { max })) => {
                assert_eq!(max, MAX_AA_FORMULA_DEPTH)
            }
            other => panic!("expected AaFormulaTooDeep, got {other:?}"),
        }
    }
}
