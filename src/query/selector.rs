use serde_json::{Map, Value};
use tracing::{debug, warn};
use crate::query::filter::{Predicate, Term, WhereClause};
use crate::registry::binding::ModelBinding;
use crate::schema::schema::FieldType;

const ELEM_MATCH: &str = "$elemMatch";

/// Result of compiling a where tree
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledSelector {
    pub selector: Map<String, Value>,
    /// Set when a pattern operator was used somewhere in the tree
    pub needs_fallback: bool,
}

/// Compiles the filter AST into a Mango selector for one model.
///
/// Every clause, nested combinator children included, starts from the
/// model's base selector so each branch stays scoped to the model. Pattern
/// operators (`like`, `nlike`, `regexp`) make the store unable to order the
/// scan on its own, so a clause containing one is anchored with
/// `_id > null` unless it already constrains `_id`.
pub struct SelectorCompiler<'a> {
    binding: &'a ModelBinding,
}

impl<'a> SelectorCompiler<'a> {
    pub fn new(binding: &'a ModelBinding) -> Self {
        SelectorCompiler { binding }
    }

    pub fn compile(&self, where_clause: Option<&WhereClause>) -> CompiledSelector {
        let compiled = match where_clause {
            Some(clause) => self.compile_clause(clause),
            None => CompiledSelector {
                selector: self.binding.base_selector(),
                needs_fallback: false,
            },
        };
        debug!(
            target: "couchlink::query",
            model = %self.binding.model,
            selector = %serde_json::Value::Object(compiled.selector.clone()),
            needs_fallback = compiled.needs_fallback,
            "Compiled selector"
        );
        compiled
    }

    fn compile_clause(&self, clause: &WhereClause) -> CompiledSelector {
        let mut selector = self.binding.base_selector();
        let mut needs_fallback = false;

        for term in &clause.terms {
            match term {
                Term::Combinator { op, clauses } => {
                    let mut compiled = Vec::with_capacity(clauses.len());
                    for child in clauses {
                        let child = self.compile_clause(child);
                        needs_fallback |= child.needs_fallback;
                        compiled.push(Value::Object(child.selector));
                    }
                    match selector.get_mut(op.native()) {
                        Some(Value::Array(existing)) => existing.extend(compiled),
                        _ => {
                            selector.insert(op.native().to_string(), Value::Array(compiled));
                        }
                    }
                }
                Term::Condition(condition) => {
                    needs_fallback |= condition.predicate.is_pattern();
                    let is_id = condition.field == self.binding.id_field;
                    let value = self.compile_predicate(&condition.field, &condition.predicate, is_id);
                    let path = if is_id {
                        vec!["_id".to_string()]
                    } else {
                        self.resolve_path(&condition.field)
                    };
                    let mut fragment = Map::new();
                    insert_path(&mut fragment, &path, value);
                    if overlaps(&selector, &fragment) {
                        // Same native key twice, e.g. like and nlike on one field
                        push_conjunct(&mut selector, fragment);
                    } else {
                        for (key, value) in fragment {
                            merge_value(&mut selector, &key, value);
                        }
                    }
                }
            }
        }

        if needs_fallback && !selector.contains_key("_id") {
            let mut anchor = Map::new();
            anchor.insert("$gt".to_string(), Value::Null);
            selector.insert("_id".to_string(), Value::Object(anchor));
        }

        CompiledSelector { selector, needs_fallback }
    }

    fn compile_predicate(&self, field: &str, predicate: &Predicate, is_id: bool) -> Value {
        let scalar = |v: &Value| if is_id { stringify_id(v) } else { v.clone() };

        match predicate {
            Predicate::Eq(value) => scalar(value),
            Predicate::Between(low, high) => operator_pair("$gte", scalar(low), "$lte", scalar(high)),
            Predicate::In(values) => operator("$in", Value::Array(values.iter().map(scalar).collect())),
            Predicate::NotIn(values) => operator("$nin", Value::Array(values.iter().map(scalar).collect())),
            Predicate::Ne(value) => operator("$ne", scalar(value)),
            Predicate::Like(pattern) => operator("$regex", Value::String(pattern.clone())),
            Predicate::NotLike(pattern) => operator("$regex", Value::String(format!("[^{}]", pattern))),
            Predicate::Regexp(regex) => {
                if regex.global {
                    warn!(
                        target: "couchlink::query",
                        field,
                        pattern = %regex.source,
                        "Global regex flag is not supported, ignoring it"
                    );
                }
                let pattern = if regex.ignore_case {
                    format!("(?i){}", regex.source)
                } else {
                    regex.source.clone()
                };
                operator("$regex", Value::String(pattern))
            }
            Predicate::Native { op, operand } => operator(&format!("${}", op), scalar(operand)),
        }
    }

    /// Walks a dotted field path against the declared schema and inserts an
    /// elements-match marker after every array-typed segment. Paths the
    /// schema cannot resolve are used as given.
    pub fn resolve_path(&self, field: &str) -> Vec<String> {
        let flat = vec![field.to_string()];
        let segments: Vec<&str> = field.split('.').collect();
        if segments.len() == 1 {
            return flat;
        }

        let caller_path = || -> Vec<String> {
            if segments.contains(&ELEM_MATCH) {
                segments.iter().map(|s| s.to_string()).collect()
            } else {
                flat.clone()
            }
        };

        let Some(root) = self.binding.definition.get_property(segments[0]) else {
            return caller_path();
        };
        let mut current: &FieldType = &root.field_type;
        let mut path = vec![segments[0].to_string()];

        for segment in &segments[1..] {
            if segment.starts_with('$') {
                path.push(segment.to_string());
                continue;
            }
            if current.is_array() && path.last().map(String::as_str) != Some(ELEM_MATCH) {
                path.push(ELEM_MATCH.to_string());
            }
            match current.lookup(segment) {
                Some(next) => current = next,
                None => return caller_path(),
            }
            path.push(segment.to_string());
        }

        if path.iter().any(|s| s == ELEM_MATCH) {
            path
        } else {
            flat
        }
    }
}

fn operator(op: &str, operand: Value) -> Value {
    let mut map = Map::new();
    map.insert(op.to_string(), operand);
    Value::Object(map)
}

fn operator_pair(op1: &str, operand1: Value, op2: &str, operand2: Value) -> Value {
    let mut map = Map::new();
    map.insert(op1.to_string(), operand1);
    map.insert(op2.to_string(), operand2);
    Value::Object(map)
}

/// `_id` is always a string on the store side
fn stringify_id(value: &Value) -> Value {
    match value {
        Value::Number(n) => Value::String(n.to_string()),
        Value::Bool(b) => Value::String(b.to_string()),
        other => other.clone(),
    }
}

/// Inserts `value` at `path`. A path containing an elements-match marker is
/// unfolded into nested objects; a plain dotted path stays one flat key.
fn insert_path(selector: &mut Map<String, Value>, path: &[String], value: Value) {
    if path.len() > 1 && path.iter().any(|s| s == ELEM_MATCH) {
        let mut nested = value;
        for segment in path[1..].iter().rev() {
            let mut wrapper = Map::new();
            wrapper.insert(segment.clone(), nested);
            nested = Value::Object(wrapper);
        }
        merge_value(selector, &path[0], nested);
    } else {
        merge_value(selector, &path.join("."), value);
    }
}

/// True when merging `fragment` into `target` would replace a value
fn overlaps(target: &Map<String, Value>, fragment: &Map<String, Value>) -> bool {
    fragment.iter().any(|(key, incoming)| match (target.get(key), incoming) {
        (None, _) => false,
        (Some(Value::Object(existing)), Value::Object(incoming)) => overlaps(existing, incoming),
        (Some(_), _) => true,
    })
}

fn push_conjunct(selector: &mut Map<String, Value>, fragment: Map<String, Value>) {
    match selector.get_mut("$and") {
        Some(Value::Array(existing)) => existing.push(Value::Object(fragment)),
        _ => {
            selector.insert("$and".to_string(), Value::Array(vec![Value::Object(fragment)]));
        }
    }
}

/// Two object values under the same key are merged key by key, anything
/// else is replaced
fn merge_value(target: &mut Map<String, Value>, key: &str, value: Value) {
    match (target.get_mut(key), value) {
        (Some(Value::Object(existing)), Value::Object(incoming)) => {
            for (k, v) in incoming {
                merge_value(existing, &k, v);
            }
        }
        (_, value) => {
            target.insert(key.to_string(), value);
        }
    }
}
