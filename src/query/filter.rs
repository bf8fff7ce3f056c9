use serde::{Serialize, Deserialize};
use serde_json::Value;

/// Parsed ORM filter: where tree, ordering, paging and include value
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Filter {
    pub where_clause: Option<WhereClause>,
    pub order: Option<OrderSpec>,
    pub limit: Option<usize>,
    pub skip: Option<usize>,
    pub include: Option<Value>,    // Handed to the include hook untouched
}

impl Filter {
    pub fn new() -> Self {
        Filter::default()
    }

    pub fn with_where(mut self, clause: WhereClause) -> Self {
        self.where_clause = Some(clause);
        self
    }

    pub fn with_order(mut self, order: &str) -> Self {
        self.order = Some(OrderSpec::Text(order.to_string()));
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_skip(mut self, skip: usize) -> Self {
        self.skip = Some(skip);
        self
    }
}

/// One where object. Its terms are implicitly ANDed.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WhereClause {
    pub terms: Vec<Term>,
}

impl WhereClause {
    pub fn new() -> Self {
        WhereClause { terms: Vec::new() }
    }

    /// Single `field == value` clause
    pub fn eq(field: &str, value: Value) -> Self {
        WhereClause::new().with_condition(field, Predicate::Eq(value))
    }

    pub fn with_condition(mut self, field: &str, predicate: Predicate) -> Self {
        self.terms.push(Term::Condition(Condition {
            field: field.to_string(),
            predicate,
        }));
        self
    }

    pub fn with_combinator(mut self, op: Combinator, clauses: Vec<WhereClause>) -> Self {
        self.terms.push(Term::Combinator { op, clauses });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Term {
    Condition(Condition),
    Combinator { op: Combinator, clauses: Vec<WhereClause> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Combinator {
    And,
    Or,
    Nor,
}

impl Combinator {
    pub fn parse(key: &str) -> Option<Combinator> {
        match key {
            "and" => Some(Combinator::And),
            "or" => Some(Combinator::Or),
            "nor" => Some(Combinator::Nor),
            _ => None,
        }
    }

    pub fn native(&self) -> &'static str {
        match self {
            Combinator::And => "$and",
            Combinator::Or => "$or",
            Combinator::Nor => "$nor",
        }
    }
}

/// Leaf condition
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub field: String,
    pub predicate: Predicate,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Eq(Value),
    Between(Value, Value),
    In(Vec<Value>),
    NotIn(Vec<Value>),
    Ne(Value),
    Like(String),
    NotLike(String),
    Regexp(RegexLiteral),
    /// Any other operator, forwarded as `$<op>`
    Native { op: String, operand: Value },
}

impl Predicate {
    pub fn is_pattern(&self) -> bool {
        matches!(self, Predicate::Like(_) | Predicate::NotLike(_) | Predicate::Regexp(_))
    }
}

/// Regular expression operand with its JS-style flags
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegexLiteral {
    pub source: String,
    pub ignore_case: bool,
    pub global: bool,
}

impl RegexLiteral {
    pub fn new(source: &str) -> Self {
        RegexLiteral {
            source: source.to_string(),
            ignore_case: false,
            global: false,
        }
    }

    /// Parses `/source/flags`; anything else is taken as a bare pattern
    pub fn parse(input: &str) -> Self {
        if let Some(body) = input.strip_prefix('/') {
            if let Some(end) = body.rfind('/') {
                let flags = &body[end + 1..];
                if flags.chars().all(|c| "gimsuy".contains(c)) {
                    return RegexLiteral {
                        source: body[..end].to_string(),
                        ignore_case: flags.contains('i'),
                        global: flags.contains('g'),
                    };
                }
            }
        }
        RegexLiteral::new(input)
    }
}

/// Ordering as given by the caller: `"a ASC, b DESC"` or a list of items
#[derive(Debug, Clone, PartialEq)]
pub enum OrderSpec {
    Text(String),
    List(Vec<String>),
}

impl OrderSpec {
    pub fn items(&self) -> Vec<String> {
        match self {
            OrderSpec::Text(text) => text.split(',').map(|s| s.trim().to_string()).collect(),
            OrderSpec::List(items) => items.iter().map(|s| s.trim().to_string()).collect(),
        }
    }
}
