//! Fluent query building and SQL compilation.

pub mod builder;
pub mod clause;
pub mod grammar;
pub mod traits;

pub use builder::{DEFAULT_KEY, QueryBuilder};
pub use clause::{
    Boolean, Column, Direction, JoinClause, JoinCondition, JoinKind, OrderByClause, QueryState,
    WhereClause, is_valid_operator,
};
pub use grammar::{AGGREGATE_ALIAS, Aggregate, CompiledQuery, Grammar};
pub use traits::{QueryClauses, WhereGroup};

#[cfg(test)]
mod tests;
