//! Raw SQL expressions.

use crate::value::Value;

/// A literal SQL fragment emitted verbatim into compiled queries.
///
/// Nothing is escaped or validated. `?` markers inside the fragment stand for
/// the expression's own bindings and are renumbered for dialects that use
/// `$n` placeholders.
#[derive(Debug, Clone, PartialEq)]
pub struct Raw {
    sql: String,
    bindings: Vec<Value>,
}

/// Create a raw expression without bindings.
///
/// ```ignore
/// qb.select_raw("COUNT(*) AS total", vec![])
///     .update([("seen_at", raw("NOW()"))]);
/// ```
pub fn raw(sql: impl Into<String>) -> Raw {
    Raw::new(sql)
}

impl Raw {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            bindings: Vec::new(),
        }
    }

    /// Create a raw expression carrying its own bindings.
    pub fn with_bindings<I, V>(sql: impl Into<String>, bindings: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self {
            sql: sql.into(),
            bindings: bindings.into_iter().map(Into::into).collect(),
        }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn bindings(&self) -> &[Value] {
        &self.bindings
    }
}

/// Right-hand side of a comparison: a bound value or a raw expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Value(Value),
    Raw(Raw),
}

impl Operand {
    pub fn is_null(&self) -> bool {
        matches!(self, Operand::Value(Value::Null))
    }
}

macro_rules! impl_operand_from {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for Operand {
                fn from(value: $ty) -> Self {
                    Operand::Value(value.into())
                }
            }
        )*
    };
}

impl_operand_from!(
    Value,
    &Value,
    bool,
    i8,
    i16,
    i32,
    i64,
    u8,
    u16,
    u32,
    u64,
    usize,
    f32,
    f64,
    String,
    &str,
    &String,
    uuid::Uuid,
    chrono::DateTime<chrono::Utc>,
    chrono::NaiveDateTime,
    chrono::NaiveDate,
    indexmap::IndexMap<String, Value>,
);

impl<T: Into<Value>> From<Option<T>> for Operand {
    fn from(value: Option<T>) -> Self {
        Operand::Value(value.into())
    }
}

impl<T: Into<Value>> From<Vec<T>> for Operand {
    fn from(values: Vec<T>) -> Self {
        Operand::Value(values.into())
    }
}

impl From<Raw> for Operand {
    fn from(raw: Raw) -> Self {
        Operand::Raw(raw)
    }
}
