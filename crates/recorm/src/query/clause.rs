//! Structured query state.

use crate::raw::{Operand, Raw};
use crate::value::Value;

/// Connector linking a clause to the previous one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Boolean {
    And,
    Or,
}

impl Boolean {
    pub fn as_sql(self) -> &'static str {
        match self {
            Boolean::And => "AND",
            Boolean::Or => "OR",
        }
    }
}

/// One WHERE (or HAVING) predicate.
#[derive(Debug, Clone, PartialEq)]
pub enum WhereClause {
    /// `column operator value`
    Basic {
        column: String,
        operator: String,
        value: Operand,
        boolean: Boolean,
    },
    /// `column [NOT] IN (values...)`
    In {
        column: String,
        values: Vec<Value>,
        negated: bool,
        boolean: Boolean,
    },
    /// `column IS [NOT] NULL`
    Null {
        column: String,
        negated: bool,
        boolean: Boolean,
    },
    /// `column [NOT] BETWEEN low AND high`
    Between {
        column: String,
        low: Value,
        high: Value,
        negated: bool,
        boolean: Boolean,
    },
    /// `first operator second`, both identifiers
    Column {
        first: String,
        operator: String,
        second: String,
        boolean: Boolean,
    },
    /// Verbatim fragment with its own bindings
    Raw { raw: Raw, boolean: Boolean },
    /// Parenthesised group
    Nested {
        clauses: Vec<WhereClause>,
        boolean: Boolean,
    },
}

impl WhereClause {
    pub fn boolean(&self) -> Boolean {
        match self {
            WhereClause::Basic { boolean, .. }
            | WhereClause::In { boolean, .. }
            | WhereClause::Null { boolean, .. }
            | WhereClause::Between { boolean, .. }
            | WhereClause::Column { boolean, .. }
            | WhereClause::Raw { boolean, .. }
            | WhereClause::Nested { boolean, .. } => *boolean,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
    Right,
    Cross,
}

impl JoinKind {
    pub fn as_sql(self) -> &'static str {
        match self {
            JoinKind::Inner => "INNER JOIN",
            JoinKind::Left => "LEFT JOIN",
            JoinKind::Right => "RIGHT JOIN",
            JoinKind::Cross => "CROSS JOIN",
        }
    }
}

/// One `ON` condition of a join.
#[derive(Debug, Clone, PartialEq)]
pub enum JoinCondition {
    /// `first operator second`, both identifiers
    Columns {
        first: String,
        operator: String,
        second: String,
        boolean: Boolean,
    },
    /// `column operator ?`, value bound
    Value {
        column: String,
        operator: String,
        value: Value,
        boolean: Boolean,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct JoinClause {
    pub kind: JoinKind,
    pub table: String,
    pub conditions: Vec<JoinCondition>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    pub fn as_sql(self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }

    /// Parse `"asc"` / `"desc"` (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        if s.eq_ignore_ascii_case("asc") {
            Some(Direction::Asc)
        } else if s.eq_ignore_ascii_case("desc") {
            Some(Direction::Desc)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum OrderByClause {
    Column { column: String, direction: Direction },
    Raw(Raw),
}

/// A selected column.
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    Name(String),
    Raw(Raw),
}

/// Everything a builder accumulates before compilation.
///
/// Bindings are not stored separately: each clause owns its values and the
/// grammar collects them in the order placeholders are emitted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryState {
    pub table: Option<String>,
    pub columns: Vec<Column>,
    pub distinct: bool,
    pub joins: Vec<JoinClause>,
    pub wheres: Vec<WhereClause>,
    pub groups: Vec<String>,
    pub havings: Vec<WhereClause>,
    pub orders: Vec<OrderByClause>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub build_error: Option<String>,
}

const OPERATORS: &[&str] = &[
    "=", "<", ">", "<=", ">=", "<>", "!=", "like", "not like", "ilike", "not ilike", "&", "|",
    "^", "<<", ">>", "similar to", "not similar to", "regexp", "not regexp", "is", "is not",
];

/// Whether `operator` is one the grammar accepts in a comparison.
pub fn is_valid_operator(operator: &str) -> bool {
    let lower = operator.trim().to_ascii_lowercase();
    OPERATORS.contains(&lower.as_str())
}
