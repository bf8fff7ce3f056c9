use serde_json::{Map, Value};
use crate::core::error::{Error, Result};
use crate::query::filter::{Combinator, Filter, OrderSpec, Predicate, RegexLiteral, WhereClause};

/// Filter parser for converting ORM JSON filters to the filter AST
pub struct FilterParser;

impl FilterParser {
    /// Parse a full filter object
    /// Examples:
    /// - `{"where": {"name": "Tony"}}` -> equality
    /// - `{"where": {"age": {"between": [20, 30]}}, "order": "age DESC"}`
    /// - `{"where": {"or": [{"a": 1}, {"b": 2}]}, "limit": 10, "skip": 5}`
    pub fn parse(input: &Value) -> Result<Filter> {
        let map = match input {
            Value::Null => return Ok(Filter::default()),
            Value::Object(map) => map,
            other => {
                return Err(Error::invalid_filter(format!("Filter must be an object, got {}", other)));
            }
        };

        Ok(Filter {
            where_clause: match map.get("where") {
                Some(w) => Self::parse_where(w)?,
                None => None,
            },
            order: match map.get("order") {
                Some(o) => Self::parse_order(o)?,
                None => None,
            },
            limit: Self::parse_count(map, "limit")?,
            skip: match Self::parse_count(map, "skip")? {
                Some(skip) => Some(skip),
                None => Self::parse_count(map, "offset")?,
            },
            include: map.get("include").filter(|v| !v.is_null()).cloned(),
        })
    }

    /// Parse a where object. Anything that is not an object means "no filtering".
    pub fn parse_where(input: &Value) -> Result<Option<WhereClause>> {
        match input {
            Value::Object(map) => Ok(Some(Self::parse_clause(map)?)),
            _ => Ok(None),
        }
    }

    fn parse_clause(map: &Map<String, Value>) -> Result<WhereClause> {
        let mut clause = WhereClause::new();

        for (key, cond) in map {
            if let Some(op) = Combinator::parse(key) {
                let items = cond.as_array().ok_or_else(|| {
                    Error::invalid_filter(format!("\"{}\" expects an array of where objects, got {}", key, cond))
                })?;
                let mut clauses = Vec::with_capacity(items.len());
                for item in items {
                    match item {
                        Value::Object(child) => clauses.push(Self::parse_clause(child)?),
                        Value::Null => clauses.push(WhereClause::new()),
                        other => {
                            return Err(Error::invalid_filter(format!(
                                "\"{}\" entries must be where objects, got {}",
                                key, other
                            )));
                        }
                    }
                }
                clause = clause.with_combinator(op, clauses);
                continue;
            }

            match cond {
                Value::Object(ops) if !ops.is_empty() => {
                    // "options" qualifies the operator, it is not one itself
                    let mut operators = ops.iter().filter(|(op, _)| op.as_str() != "options").peekable();
                    if operators.peek().is_none() {
                        return Err(Error::invalid_filter(format!("No operator given for {}", key)));
                    }
                    for (op, operand) in operators {
                        clause = clause.with_condition(key, Self::parse_predicate(key, op, operand)?);
                    }
                }
                other => {
                    clause = clause.with_condition(key, Predicate::Eq(other.clone()));
                }
            }
        }

        Ok(clause)
    }

    fn parse_predicate(field: &str, op: &str, operand: &Value) -> Result<Predicate> {
        let predicate = match op {
            "between" => match operand.as_array().map(Vec::as_slice) {
                Some([low, high]) => Predicate::Between(low.clone(), high.clone()),
                _ => {
                    return Err(Error::invalid_filter(format!(
                        "between on {} expects [low, high], got {}",
                        field, operand
                    )));
                }
            },
            "inq" | "nin" => {
                let values = operand.as_array().cloned().ok_or_else(|| {
                    Error::invalid_filter(format!("{} on {} expects an array, got {}", op, field, operand))
                })?;
                if op == "inq" { Predicate::In(values) } else { Predicate::NotIn(values) }
            }
            "neq" => Predicate::Ne(operand.clone()),
            "like" | "nlike" => {
                let pattern = operand.as_str().ok_or_else(|| {
                    Error::invalid_filter(format!("{} on {} expects a string, got {}", op, field, operand))
                })?;
                if op == "like" {
                    Predicate::Like(pattern.to_string())
                } else {
                    Predicate::NotLike(pattern.to_string())
                }
            }
            "regexp" => {
                let pattern = operand.as_str().ok_or_else(|| {
                    Error::invalid_filter(format!("regexp on {} expects a pattern string, got {}", field, operand))
                })?;
                Predicate::Regexp(RegexLiteral::parse(pattern))
            }
            other => Predicate::Native {
                op: other.trim_start_matches('$').to_string(),
                operand: operand.clone(),
            },
        };
        Ok(predicate)
    }

    fn parse_order(input: &Value) -> Result<Option<OrderSpec>> {
        match input {
            Value::Null => Ok(None),
            Value::String(s) if s.trim().is_empty() => Ok(None),
            Value::String(s) => Ok(Some(OrderSpec::Text(s.clone()))),
            Value::Array(items) => {
                let mut list = Vec::with_capacity(items.len());
                for item in items {
                    let s = item.as_str().ok_or_else(|| {
                        Error::invalid_filter(format!("order entries must be strings, got {}", item))
                    })?;
                    list.push(s.to_string());
                }
                Ok(Some(OrderSpec::List(list)))
            }
            other => Err(Error::invalid_filter(format!("Unsupported order {}", other))),
        }
    }

    /// Zero reads as absent, so `{"limit": 0}` means no limit.
    fn parse_count(map: &Map<String, Value>, key: &str) -> Result<Option<usize>> {
        match map.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => value
                .as_u64()
                .map(|n| (n > 0).then_some(n as usize))
                .ok_or_else(|| Error::invalid_filter(format!("{} must be a non-negative integer, got {}", key, value))),
        }
    }
}
