use std::cmp::Ordering;
use regex::Regex;
use serde_json::{Map, Value};
use crate::core::error::{Error, Result};

/// Evaluates Mango selectors against JSON documents
pub struct SelectorMatcher;

impl SelectorMatcher {
    /// Check if document matches the selector
    pub fn matches(doc: &Map<String, Value>, selector: &Map<String, Value>) -> Result<bool> {
        let root = Value::Object(doc.clone());
        Self::match_selector(Some(&root), selector)
    }

    fn match_selector(value: Option<&Value>, selector: &Map<String, Value>) -> Result<bool> {
        for (key, cond) in selector {
            let matched = match key.as_str() {
                "$and" => {
                    let mut all = true;
                    for sub in Self::selector_list(key, cond)? {
                        all = all && Self::match_selector(value, sub)?;
                    }
                    all
                }
                "$or" => {
                    let mut any = false;
                    for sub in Self::selector_list(key, cond)? {
                        any = any || Self::match_selector(value, sub)?;
                    }
                    any
                }
                "$nor" => {
                    let mut any = false;
                    for sub in Self::selector_list(key, cond)? {
                        any = any || Self::match_selector(value, sub)?;
                    }
                    !any
                }
                "$not" => !Self::match_condition(value, cond)?,
                op if op.starts_with('$') => Self::match_operator(value, op, cond)?,
                field => Self::match_condition(lookup(value, field), cond)?,
            };
            if !matched {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Object conditions are operator objects or implicit nesting, anything
    /// else is an equality
    fn match_condition(value: Option<&Value>, cond: &Value) -> Result<bool> {
        match cond {
            Value::Object(map) => Self::match_selector(value, map),
            other => Ok(value.map(|v| collate(v, other) == Ordering::Equal).unwrap_or(false)),
        }
    }

    fn match_operator(value: Option<&Value>, op: &str, arg: &Value) -> Result<bool> {
        // Only $exists can match a missing field
        if op == "$exists" {
            let wanted = arg
                .as_bool()
                .ok_or_else(|| Error::invalid_filter(format!("$exists expects a boolean, got {}", arg)))?;
            return Ok(value.is_some() == wanted);
        }
        let Some(value) = value else { return Ok(false) };

        let matched = match op {
            "$eq" => collate(value, arg) == Ordering::Equal,
            "$ne" => collate(value, arg) != Ordering::Equal,
            "$gt" => collate(value, arg) == Ordering::Greater,
            "$gte" => collate(value, arg) != Ordering::Less,
            "$lt" => collate(value, arg) == Ordering::Less,
            "$lte" => collate(value, arg) != Ordering::Greater,
            "$in" => Self::operand_list(op, arg)?
                .iter()
                .any(|candidate| collate(value, candidate) == Ordering::Equal),
            "$nin" => !Self::operand_list(op, arg)?
                .iter()
                .any(|candidate| collate(value, candidate) == Ordering::Equal),
            "$regex" => {
                let pattern = arg
                    .as_str()
                    .ok_or_else(|| Error::invalid_filter(format!("$regex expects a string, got {}", arg)))?;
                match value {
                    Value::String(s) => Regex::new(pattern)?.is_match(s),
                    _ => false,
                }
            }
            "$elemMatch" | "$allMatch" => {
                let Value::Array(items) = value else { return Ok(false) };
                let mut results = Vec::with_capacity(items.len());
                for item in items {
                    results.push(Self::match_condition(Some(item), arg)?);
                }
                if op == "$elemMatch" {
                    results.into_iter().any(|r| r)
                } else {
                    !results.is_empty() && results.into_iter().all(|r| r)
                }
            }
            "$all" => {
                let Value::Array(items) = value else { return Ok(false) };
                Self::operand_list(op, arg)?
                    .iter()
                    .all(|wanted| items.iter().any(|v| collate(v, wanted) == Ordering::Equal))
            }
            "$size" => {
                let wanted = arg
                    .as_u64()
                    .ok_or_else(|| Error::invalid_filter(format!("$size expects an integer, got {}", arg)))?;
                matches!(value, Value::Array(items) if items.len() as u64 == wanted)
            }
            "$type" => {
                let wanted = arg
                    .as_str()
                    .ok_or_else(|| Error::invalid_filter(format!("$type expects a string, got {}", arg)))?;
                type_name(value) == wanted
            }
            other => return Err(Error::invalid_filter(format!("Invalid operator: {}", other))),
        };
        Ok(matched)
    }

    fn selector_list<'v>(op: &str, cond: &'v Value) -> Result<Vec<&'v Map<String, Value>>> {
        let items = Self::operand_list(op, cond)?;
        items
            .iter()
            .map(|item| {
                item.as_object()
                    .ok_or_else(|| Error::invalid_filter(format!("{} entries must be selectors, got {}", op, item)))
            })
            .collect()
    }

    fn operand_list<'v>(op: &str, arg: &'v Value) -> Result<&'v Vec<Value>> {
        arg.as_array()
            .ok_or_else(|| Error::invalid_filter(format!("{} expects an array, got {}", op, arg)))
    }
}

/// Resolves a dotted field path
pub fn lookup<'v>(value: Option<&'v Value>, path: &str) -> Option<&'v Value> {
    let mut current = value?;
    for segment in path.split('.') {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(false) => 1,
        Value::Bool(true) => 2,
        Value::Number(_) => 3,
        Value::String(_) => 4,
        Value::Array(_) => 5,
        Value::Object(_) => 6,
    }
}

/// CouchDB view collation: null, false, true, numbers, strings, arrays,
/// objects. Strings compare by code point here rather than by ICU rules.
pub fn collate(a: &Value, b: &Value) -> Ordering {
    let rank = type_rank(a).cmp(&type_rank(b));
    if rank != Ordering::Equal {
        return rank;
    }
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or(f64::NAN);
            let y = y.as_f64().unwrap_or(f64::NAN);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => {
            for (l, r) in x.iter().zip(y.iter()) {
                let ord = collate(l, r);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        }
        (Value::Object(x), Value::Object(y)) => {
            for ((lk, lv), (rk, rv)) in x.iter().zip(y.iter()) {
                let ord = lk.cmp(rk).then_with(|| collate(lv, rv));
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        }
        _ => Ordering::Equal,
    }
}
