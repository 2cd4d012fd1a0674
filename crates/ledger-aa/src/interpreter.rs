//! Tree-walking interpreter for one AA trigger. Mirrors
//! `chronx_state::engine::StateEngine::apply`'s stage-then-commit shape:
//! every read against durable state is immediate, but every write (payments,
//! `state_var` updates) accumulates in an `Effects` value that the caller
//! only persists once the whole trigger evaluates without a fatal error.
//! That staging *is* the rollback: a bounce midway through simply drops the
//! accumulated `Effects` on the floor.

use std::cell::RefCell;
use std::collections::HashMap;

use ledger_core::constants::{AA_YIELD_EVERY_STEPS, MAX_AA_OPS, MAX_LOG_ARGS, MAX_LOG_BYTES};
use ledger_core::model::FormulaTree;
use ledger_core::types::{Address32, Amount, Mci};
use ledger_storage::Storage;
use serde_json::Value;
use tracing::trace;

use crate::error::AaRuntimeError;

/// Everything the triggering unit carries that the formula can observe.
pub struct TriggerContext {
    pub address: Address32,
    pub amount: Amount,
    pub data: Value,
}

/// Accumulated side effects of one successful trigger execution. The caller
/// (ledger-node's `AaTriggerHandler` impl) turns `payments` into the
/// response unit's outputs and persists `state_var_writes` via
/// `Storage::write_aa_state_var`, in the same write-lock section that
/// recorded the bounce/response row.
#[derive(Debug, Default, Clone)]
pub struct AaEffects {
    pub state_var_writes: Vec<(String, Value)>,
    pub payments: Vec<(Address32, Amount)>,
    pub log: Vec<Value>,
}

pub enum AaExecutionOutcome {
    Completed(AaEffects),
    Bounce { message: String, log: Vec<Value> },
}

/// Key for the getter memo table: calling the same getter on the same AA
/// with the same arguments at the same pinned MCI always returns the same
/// value (spec.md §8, property 10).
type GetterKey = (Address32, String, Vec<Value>, Mci);

pub struct AaEngine<'a> {
    storage: &'a Storage,
    self_address: Address32,
    pinned_mci: Mci,
    steps: u64,
    getter_cache: RefCell<HashMap<GetterKey, Value>>,
    effects: AaEffects,
    log_bytes: usize,
    is_getter: bool,
}

impl<'a> AaEngine<'a> {
    /// Runs every expression in `messages` in order against `trigger`,
    /// returning the accumulated effects on success or the bounce message on
    /// the first fatal error. `storage` is read at `pinned_mci` — the last
    /// stable MCI when the trigger fired (spec.md §4.6).
    pub fn run_trigger(
        storage: &'a Storage,
        self_address: &Address32,
        messages: &[FormulaTree],
        trigger: &TriggerContext,
        pinned_mci: Mci,
    ) -> AaExecutionOutcome {
        let mut engine = AaEngine {
            storage,
            self_address: self_address.clone(),
            pinned_mci,
            steps: 0,
            getter_cache: RefCell::new(HashMap::new()),
            effects: AaEffects::default(),
            log_bytes: 0,
            is_getter: false,
        };
        let mut locals = HashMap::new();
        for expr in messages {
            if let Err(e) = engine.eval(expr, &mut locals, trigger) {
                return AaExecutionOutcome::Bounce {
                    message: e.to_string(),
                    log: engine.effects.log,
                };
            }
        }
        AaExecutionOutcome::Completed(engine.effects)
    }

    /// Evaluates a getter body read-only, for `call_getter`'s cache-miss path.
    fn run_getter(
        storage: &'a Storage,
        aa_address: &Address32,
        body: &FormulaTree,
        pinned_mci: Mci,
    ) -> Result<Value, AaRuntimeError> {
        let mut engine = AaEngine {
            storage,
            self_address: aa_address.clone(),
            pinned_mci,
            steps: 0,
            getter_cache: RefCell::new(HashMap::new()),
            effects: AaEffects::default(),
            log_bytes: 0,
            is_getter: true,
        };
        // Getters have no trigger of their own; static validation already
        // guarantees their body never references `trigger.*`.
        let dummy = TriggerContext {
            address: aa_address.clone(),
            amount: 0,
            data: Value::Null,
        };
        let mut locals = HashMap::new();
        engine.eval(body, &mut locals, &dummy)
    }

    fn tick(&mut self) -> Result<(), AaRuntimeError> {
        self.steps += 1;
        if self.steps % AA_YIELD_EVERY_STEPS == 0 {
            trace!(steps = self.steps, "AA interpreter yield point");
        }
        if self.steps > MAX_AA_OPS {
            return Err(AaRuntimeError::StepBudgetExceeded);
        }
        Ok(())
    }

    fn eval(
        &mut self,
        tree: &FormulaTree,
        locals: &mut HashMap<String, Value>,
        trigger: &TriggerContext,
    ) -> Result<Value, AaRuntimeError> {
        if !tree.is_array() {
            return Ok(tree.clone());
        }
        self.tick()?;

        let arr = tree.as_array().unwrap();
        let op = arr
            .first()
            .and_then(|v| v.as_str())
            .ok_or_else(|| AaRuntimeError::Malformed("node missing operator string".into()))?;
        let args = &arr[1..];

        match op {
            "+" | "-" | "*" | "/" | "%" | "^" => self.eval_arith(op, args, locals, trigger),
            "<" | "<=" | ">" | ">=" | "==" | "!=" => self.eval_cmp(op, args, locals, trigger),
            "and" => {
                for a in args {
                    if !self.eval(a, locals, trigger)?.as_bool().unwrap_or(false) {
                        return Ok(Value::Bool(false));
                    }
                }
                Ok(Value::Bool(true))
            }
            "or" => {
                for a in args {
                    if self.eval(a, locals, trigger)?.as_bool().unwrap_or(false) {
                        return Ok(Value::Bool(true));
                    }
                }
                Ok(Value::Bool(false))
            }
            "not" => {
                let v = self.eval(arg(args, 0)?, locals, trigger)?;
                Ok(Value::Bool(!v.as_bool().unwrap_or(false)))
            }
            "if" => {
                let cond = self.eval(arg(args, 0)?, locals, trigger)?;
                if cond.as_bool().unwrap_or(false) {
                    self.eval(arg(args, 1)?, locals, trigger)
                } else {
                    match args.get(2) {
                        Some(e) => self.eval(e, locals, trigger),
                        None => Ok(Value::Null),
                    }
                }
            }
            "seq" => {
                let mut last = Value::Null;
                for a in args {
                    last = self.eval(a, locals, trigger)?;
                }
                Ok(last)
            }
            "let" => {
                let name = arg_str(args, 0)?;
                let value = self.eval(arg(args, 1)?, locals, trigger)?;
                let prior = locals.insert(name.clone(), value);
                let result = self.eval(arg(args, 2)?, locals, trigger);
                match prior {
                    Some(p) => locals.insert(name, p),
                    None => locals.remove(&name),
                };
                result
            }
            "var" => {
                let name = arg_str(args, 0)?;
                locals
                    .get(&name)
                    .cloned()
                    .ok_or(AaRuntimeError::UnknownVar(name))
            }
            "concat" => {
                let mut s = String::new();
                for a in args {
                    s.push_str(&value_to_display(&self.eval(a, locals, trigger)?));
                }
                Ok(Value::String(s))
            }
            "trigger.address" => Ok(Value::String(trigger.address.as_str().to_string())),
            "trigger.amount" => Ok(Value::from(trigger.amount)),
            "trigger.data" => {
                let key = arg_str(args, 0)?;
                Ok(trigger.data.get(&key).cloned().unwrap_or(Value::Null))
            }
            "state_var" => {
                let name = arg_str(args, 0)?;
                Ok(self
                    .storage
                    .read_aa_state_var(&self.self_address, &name)
                    .ok()
                    .flatten()
                    .unwrap_or(Value::Null))
            }
            "set_state_var" => {
                if self.is_getter {
                    return Err(AaRuntimeError::GetterSideEffect);
                }
                let name = arg_str(args, 0)?;
                let value = self.eval(arg(args, 1)?, locals, trigger)?;
                self.effects
                    .state_var_writes
                    .push((name, value.clone()));
                Ok(value)
            }
            "data_feed" => self.eval_data_feed(args, locals, trigger),
            "getter" => self.eval_getter_call(args, locals, trigger),
            "send" => {
                if self.is_getter {
                    return Err(AaRuntimeError::GetterSideEffect);
                }
                let addr_str = match self.eval(arg(args, 0)?, locals, trigger)? {
                    Value::String(s) => s,
                    other => return Err(AaRuntimeError::TypeError(format!("send: address must be a string, got {other}"))),
                };
                let address = Address32::from_string(addr_str)
                    .map_err(|e| AaRuntimeError::TypeError(e.to_string()))?;
                let amount = self.eval(arg(args, 1)?, locals, trigger)?;
                let amount = value_to_amount(&amount)?;
                self.effects.payments.push((address, amount));
                Ok(Value::Null)
            }
            "bounce" => {
                if self.is_getter {
                    return Err(AaRuntimeError::GetterSideEffect);
                }
                let msg = value_to_display(&self.eval(arg(args, 0)?, locals, trigger)?);
                Err(AaRuntimeError::Bounce(msg))
            }
            "require" => {
                if self.is_getter {
                    return Err(AaRuntimeError::GetterSideEffect);
                }
                let cond = self.eval(arg(args, 0)?, locals, trigger)?;
                if !cond.as_bool().unwrap_or(false) {
                    let msg = match args.get(1) {
                        Some(e) => value_to_display(&self.eval(e, locals, trigger)?),
                        None => "require failed".to_string(),
                    };
                    return Err(AaRuntimeError::RequireFailed(msg));
                }
                Ok(Value::Bool(true))
            }
            "log" => {
                if self.is_getter {
                    return Err(AaRuntimeError::GetterSideEffect);
                }
                if args.len() > MAX_LOG_ARGS {
                    return Err(AaRuntimeError::LogArgsExceeded(MAX_LOG_ARGS));
                }
                let mut entries = Vec::with_capacity(args.len());
                for a in args {
                    let v = self.eval(a, locals, trigger)?;
                    self.log_bytes += value_to_display(&v).len();
                    if self.log_bytes > MAX_LOG_BYTES {
                        return Err(AaRuntimeError::LogBytesExceeded(MAX_LOG_BYTES));
                    }
                    entries.push(v);
                }
                self.effects.log.push(Value::Array(entries));
                Ok(Value::Null)
            }
            other => Err(AaRuntimeError::UnknownOp(other.to_string())),
        }
    }

    fn eval_arith(
        &mut self,
        op: &str,
        args: &[FormulaTree],
        locals: &mut HashMap<String, Value>,
        trigger: &TriggerContext,
    ) -> Result<Value, AaRuntimeError> {
        let a = value_to_f64(&self.eval(arg(args, 0)?, locals, trigger)?)?;
        let b = value_to_f64(&self.eval(arg(args, 1)?, locals, trigger)?)?;
        let r = match op {
            "+" => a + b,
            "-" => a - b,
            "*" => a * b,
            "/" => {
                if b == 0.0 {
                    return Err(AaRuntimeError::DivisionByZero);
                }
                a / b
            }
            "%" => {
                if b == 0.0 {
                    return Err(AaRuntimeError::DivisionByZero);
                }
                a % b
            }
            "^" => a.powf(b),
            _ => unreachable!(),
        };
        Ok(serde_json::Number::from_f64(r)
            .map(Value::Number)
            .unwrap_or(Value::Null))
    }

    fn eval_cmp(
        &mut self,
        op: &str,
        args: &[FormulaTree],
        locals: &mut HashMap<String, Value>,
        trigger: &TriggerContext,
    ) -> Result<Value, AaRuntimeError> {
        let a = self.eval(arg(args, 0)?, locals, trigger)?;
        let b = self.eval(arg(args, 1)?, locals, trigger)?;
        let result = if let (Ok(x), Ok(y)) = (value_to_f64(&a), value_to_f64(&b)) {
            match op {
                "<" => x < y,
                "<=" => x <= y,
                ">" => x > y,
                ">=" => x >= y,
                "==" => x == y,
                "!=" => x != y,
                _ => unreachable!(),
            }
        } else {
            match op {
                "==" => a == b,
                "!=" => a != b,
                _ => return Err(AaRuntimeError::TypeError(format!("{op}: non-numeric operands"))),
            }
        };
        Ok(Value::Bool(result))
    }

    fn eval_data_feed(
        &mut self,
        args: &[FormulaTree],
        locals: &mut HashMap<String, Value>,
        trigger: &TriggerContext,
    ) -> Result<Value, AaRuntimeError> {
        let spec = arg(args, 0)?;
        let oracle = spec
            .get("oracle")
            .and_then(|v| v.as_str())
            .ok_or_else(|| AaRuntimeError::Malformed("data_feed: missing 'oracle'".into()))?;
        let feed = spec
            .get("feed")
            .and_then(|v| v.as_str())
            .ok_or_else(|| AaRuntimeError::Malformed("data_feed: missing 'feed'".into()))?;
        let address = Address32::from_string(oracle.to_string())
            .map_err(|e| AaRuntimeError::TypeError(e.to_string()))?;
        let rows = self
            .storage
            .read_data_feed(&address, feed, 0, self.pinned_mci)
            .map_err(|e| AaRuntimeError::TypeError(e.to_string()))?;
        match rows.last() {
            Some((value, _, _)) => Ok(data_feed_to_json(value)),
            None => match spec.get("ifnone") {
                Some(v) => self.eval(v, locals, trigger),
                None => Ok(Value::Null),
            },
        }
    }

    fn eval_getter_call(
        &mut self,
        args: &[FormulaTree],
        locals: &mut HashMap<String, Value>,
        trigger: &TriggerContext,
    ) -> Result<Value, AaRuntimeError> {
        let target = match self.eval(arg(args, 0)?, locals, trigger)? {
            Value::String(s) if s == "this" => self.self_address.clone(),
            Value::String(s) => {
                Address32::from_string(s).map_err(|e| AaRuntimeError::TypeError(e.to_string()))?
            }
            other => return Err(AaRuntimeError::TypeError(format!("getter: bad target {other}"))),
        };
        let name = arg_str(args, 1)?;
        let mut call_args = Vec::with_capacity(args.len().saturating_sub(2));
        for a in &args[2.min(args.len())..] {
            call_args.push(self.eval(a, locals, trigger)?);
        }

        let key: GetterKey = (target.clone(), name.clone(), call_args, self.pinned_mci);
        if let Some(cached) = self.getter_cache.borrow().get(&key) {
            return Ok(cached.clone());
        }

        let record = self
            .storage
            .read_aa_address(&target)
            .map_err(|e| AaRuntimeError::TypeError(e.to_string()))?
            .ok_or_else(|| AaRuntimeError::UnknownGetter(name.clone(), target.to_string()))?;
        let getter_body = record
            .body
            .get("getters")
            .and_then(|g| g.get(&name))
            .ok_or_else(|| AaRuntimeError::UnknownGetter(name.clone(), target.to_string()))?;

        let value = Self::run_getter(self.storage, &target, getter_body, self.pinned_mci)?;
        self.getter_cache.borrow_mut().insert(key, value.clone());
        Ok(value)
    }
}

fn arg(args: &[FormulaTree], i: usize) -> Result<&FormulaTree, AaRuntimeError> {
    args.get(i)
        .ok_or_else(|| AaRuntimeError::Malformed(format!("missing argument {i}")))
}

fn arg_str(args: &[FormulaTree], i: usize) -> Result<String, AaRuntimeError> {
    arg(args, i)?
        .as_str()
        .map(|s| s.to_string())
        .ok_or_else(|| AaRuntimeError::Malformed(format!("argument {i} must be a string")))
}

fn value_to_f64(v: &Value) -> Result<f64, AaRuntimeError> {
    v.as_f64()
        .ok_or_else(|| AaRuntimeError::TypeError(format!("{v} is not a number")))
}

fn value_to_amount(v: &Value) -> Result<Amount, AaRuntimeError> {
    let f = value_to_f64(v)?;
    if f < 0.0 || !f.is_finite() {
        return Err(AaRuntimeError::TypeError(format!("{v} is not a valid amount")));
    }
    Ok(f.round() as Amount)
}

fn value_to_display(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn data_feed_to_json(value: &ledger_core::model::DataFeedValue) -> Value {
    match value {
        ledger_core::model::DataFeedValue::Number(n) => {
            serde_json::Number::from_f64(*n).map(Value::Number).unwrap_or(Value::Null)
        }
        ledger_core::model::DataFeedValue::Text(s) => Value::String(s.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tempdir() -> std::path::PathBuf {
        let mut p = std::env::temp_dir();
        p.push(format!("ledger-aa-interp-test-{}-{}", std::process::id(), line!()));
        p
    }

    fn trigger(amount: Amount) -> TriggerContext {
        TriggerContext {
            address: Address32::from_string("A".repeat(32)).unwrap(),
            amount,
            data: Value::Null,
        }
    }

    #[test]
    fn arithmetic_and_require_pass_through() {
        let dir = tempdir();
        let storage = Storage::open(&dir).unwrap();
        let self_addr = Address32::from_string("B".repeat(32)).unwrap();
        let messages = vec![json!(["require", [">=", ["trigger.amount"], 100], "too small"])];
        let outcome = AaEngine::run_trigger(&storage, &self_addr, &messages, &trigger(150), 0);
        assert!(matches!(outcome, AaExecutionOutcome::Completed(_)));
    }

    #[test]
    fn require_failure_bounces_with_message() {
        let dir = tempdir();
        let storage = Storage::open(&dir).unwrap();
        let self_addr = Address32::from_string("B".repeat(32)).unwrap();
        let messages = vec![json!(["require", [">=", ["trigger.amount"], 100_000], "too small"])];
        let outcome = AaEngine::run_trigger(&storage, &self_addr, &messages, &trigger(10_000), 0);
        match outcome {
            AaExecutionOutcome::Bounce { message, .. } => assert_eq!(message, "too small"),
            _ => panic!("expected bounce"),
        }
    }

    #[test]
    fn state_var_write_is_staged_until_commit() {
        let dir = tempdir();
        let storage = Storage::open(&dir).unwrap();
        let self_addr = Address32::from_string("B".repeat(32)).unwrap();
        let messages = vec![json!(["set_state_var", "count", 1])];
        let outcome = AaEngine::run_trigger(&storage, &self_addr, &messages, &trigger(1), 0);
        match outcome {
            AaExecutionOutcome::Completed(effects) => {
                assert_eq!(effects.state_var_writes, vec![("count".to_string(), json!(1.0))]);
            }
            _ => panic!("expected completion"),
        }
        // Not yet persisted — the caller commits only after a full success.
        assert_eq!(storage.read_aa_state_var(&self_addr, "count").unwrap(), None);
    }

    #[test]
    fn division_by_zero_bounces() {
        let dir = tempdir();
        let storage = Storage::open(&dir).unwrap();
        let self_addr = Address32::from_string("B".repeat(32)).unwrap();
        let messages = vec![json!(["/", 1, 0])];
        let outcome = AaEngine::run_trigger(&storage, &self_addr, &messages, &trigger(1), 0);
        assert!(matches!(outcome, AaExecutionOutcome::Bounce { .. }));
    }

    #[test]
    fn log_overflow_is_fatal() {
        let dir = tempdir();
        let storage = Storage::open(&dir).unwrap();
        let self_addr = Address32::from_string("B".repeat(32)).unwrap();
        let too_many: Vec<Value> = (0..(MAX_LOG_ARGS + 1)).map(Value::from).collect();
        let mut call = vec![Value::String("log".to_string())];
        call.extend(too_many);
        let messages = vec![Value::Array(call)];
        let outcome = AaEngine::run_trigger(&storage, &self_addr, &messages, &trigger(1), 0);
        assert!(matches!(outcome, AaExecutionOutcome::Bounce { .. }));
    }
}
