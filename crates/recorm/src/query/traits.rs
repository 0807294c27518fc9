//! Fluent clause methods shared by every builder.

use crate::query::clause::{
    Boolean, Column, Direction, JoinClause, JoinCondition, JoinKind, OrderByClause, QueryState,
    WhereClause, is_valid_operator,
};
use crate::raw::{Operand, Raw};
use crate::value::Value;

/// Fluent configuration of a [`QueryState`].
///
/// Implemented by [`QueryBuilder`](crate::QueryBuilder),
/// [`RecordBuilder`](crate::RecordBuilder) and [`WhereGroup`]. Every method
/// consumes the builder and returns it, appending to the relevant clause list.
/// Nothing here executes SQL.
pub trait QueryClauses: Sized {
    fn state(&self) -> &QueryState;

    fn state_mut(&mut self) -> &mut QueryState;

    // ==================== Table & columns ====================

    /// Set the target table.
    fn from(mut self, table: &str) -> Self {
        self.state_mut().table = Some(table.to_string());
        self
    }

    /// Replace the selected columns.
    fn select(mut self, columns: &[&str]) -> Self {
        self.state_mut().columns = columns.iter().map(|c| Column::Name(c.to_string())).collect();
        self
    }

    /// Append one selected column.
    fn add_select(mut self, column: &str) -> Self {
        self.state_mut().columns.push(Column::Name(column.to_string()));
        self
    }

    /// Append a raw select expression with `?` bindings.
    fn select_raw(mut self, sql: &str, bindings: Vec<Value>) -> Self {
        self.state_mut().columns.push(Column::Raw(Raw::with_bindings(sql, bindings)));
        self
    }

    fn distinct(mut self) -> Self {
        self.state_mut().distinct = true;
        self
    }

    // ==================== WHERE ====================

    /// Add `column operator value`, joined with AND.
    fn where_(self, column: &str, operator: &str, value: impl Into<Operand>) -> Self {
        self.push_basic(column, operator, value.into(), Boolean::And)
    }

    /// Add `column = value`, joined with AND.
    fn where_eq(self, column: &str, value: impl Into<Operand>) -> Self {
        self.push_basic(column, "=", value.into(), Boolean::And)
    }

    fn or_where(self, column: &str, operator: &str, value: impl Into<Operand>) -> Self {
        self.push_basic(column, operator, value.into(), Boolean::Or)
    }

    fn or_where_eq(self, column: &str, value: impl Into<Operand>) -> Self {
        self.push_basic(column, "=", value.into(), Boolean::Or)
    }

    #[doc(hidden)]
    fn push_basic(mut self, column: &str, operator: &str, value: Operand, boolean: Boolean) -> Self {
        check_operator(self.state_mut(), operator);
        self.state_mut().wheres.push(WhereClause::Basic {
            column: column.to_string(),
            operator: operator.to_string(),
            value,
            boolean,
        });
        self
    }

    /// Add `column IN (values...)`. An empty list matches nothing.
    fn where_in<I, V>(self, column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.push_in(column, collect_values(values), false, Boolean::And)
    }

    fn or_where_in<I, V>(self, column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.push_in(column, collect_values(values), false, Boolean::Or)
    }

    /// Add `column NOT IN (values...)`. An empty list matches everything.
    fn where_not_in<I, V>(self, column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.push_in(column, collect_values(values), true, Boolean::And)
    }

    fn or_where_not_in<I, V>(self, column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.push_in(column, collect_values(values), true, Boolean::Or)
    }

    #[doc(hidden)]
    fn push_in(mut self, column: &str, values: Vec<Value>, negated: bool, boolean: Boolean) -> Self {
        self.state_mut().wheres.push(WhereClause::In {
            column: column.to_string(),
            values,
            negated,
            boolean,
        });
        self
    }

    fn where_null(self, column: &str) -> Self {
        self.push_null(column, false, Boolean::And)
    }

    fn or_where_null(self, column: &str) -> Self {
        self.push_null(column, false, Boolean::Or)
    }

    fn where_not_null(self, column: &str) -> Self {
        self.push_null(column, true, Boolean::And)
    }

    fn or_where_not_null(self, column: &str) -> Self {
        self.push_null(column, true, Boolean::Or)
    }

    #[doc(hidden)]
    fn push_null(mut self, column: &str, negated: bool, boolean: Boolean) -> Self {
        self.state_mut().wheres.push(WhereClause::Null {
            column: column.to_string(),
            negated,
            boolean,
        });
        self
    }

    fn where_between(self, column: &str, low: impl Into<Value>, high: impl Into<Value>) -> Self {
        self.push_between(column, low.into(), high.into(), false, Boolean::And)
    }

    fn or_where_between(self, column: &str, low: impl Into<Value>, high: impl Into<Value>) -> Self {
        self.push_between(column, low.into(), high.into(), false, Boolean::Or)
    }

    fn where_not_between(self, column: &str, low: impl Into<Value>, high: impl Into<Value>) -> Self {
        self.push_between(column, low.into(), high.into(), true, Boolean::And)
    }

    #[doc(hidden)]
    fn push_between(
        mut self,
        column: &str,
        low: Value,
        high: Value,
        negated: bool,
        boolean: Boolean,
    ) -> Self {
        self.state_mut().wheres.push(WhereClause::Between {
            column: column.to_string(),
            low,
            high,
            negated,
            boolean,
        });
        self
    }

    /// Compare two columns: `first operator second`.
    fn where_column(mut self, first: &str, operator: &str, second: &str) -> Self {
        check_operator(self.state_mut(), operator);
        self.state_mut().wheres.push(WhereClause::Column {
            first: first.to_string(),
            operator: operator.to_string(),
            second: second.to_string(),
            boolean: Boolean::And,
        });
        self
    }

    /// Add a raw predicate; `?` markers take `bindings` in order.
    fn where_raw(mut self, sql: &str, bindings: Vec<Value>) -> Self {
        self.state_mut().wheres.push(WhereClause::Raw {
            raw: Raw::with_bindings(sql, bindings),
            boolean: Boolean::And,
        });
        self
    }

    fn or_where_raw(mut self, sql: &str, bindings: Vec<Value>) -> Self {
        self.state_mut().wheres.push(WhereClause::Raw {
            raw: Raw::with_bindings(sql, bindings),
            boolean: Boolean::Or,
        });
        self
    }

    /// Add a parenthesised group built by `f`, joined with AND.
    ///
    /// ```ignore
    /// qb.where_eq("active", true)
    ///     .where_nested(|q| q.where_eq("role", "admin").or_where_eq("role", "owner"));
    /// // ... WHERE active = ? AND (role = ? OR role = ?)
    /// ```
    fn where_nested(self, f: impl FnOnce(WhereGroup) -> WhereGroup) -> Self {
        self.push_nested(f(WhereGroup::default()), Boolean::And)
    }

    fn or_where_nested(self, f: impl FnOnce(WhereGroup) -> WhereGroup) -> Self {
        self.push_nested(f(WhereGroup::default()), Boolean::Or)
    }

    #[doc(hidden)]
    fn push_nested(mut self, group: WhereGroup, boolean: Boolean) -> Self {
        let WhereGroup { state } = group;
        if let Some(err) = state.build_error {
            self.state_mut().build_error.get_or_insert(err);
        }
        self.state_mut().wheres.push(WhereClause::Nested {
            clauses: state.wheres,
            boolean,
        });
        self
    }

    // ==================== JOIN ====================

    /// Add `INNER JOIN table ON first operator second`.
    fn join(self, table: &str, first: &str, operator: &str, second: &str) -> Self {
        self.push_join(JoinKind::Inner, table, first, operator, second)
    }

    fn left_join(self, table: &str, first: &str, operator: &str, second: &str) -> Self {
        self.push_join(JoinKind::Left, table, first, operator, second)
    }

    fn right_join(self, table: &str, first: &str, operator: &str, second: &str) -> Self {
        self.push_join(JoinKind::Right, table, first, operator, second)
    }

    fn cross_join(mut self, table: &str) -> Self {
        self.state_mut().joins.push(JoinClause {
            kind: JoinKind::Cross,
            table: table.to_string(),
            conditions: Vec::new(),
        });
        self
    }

    /// Add `INNER JOIN table ON column operator ?` with a bound value.
    fn join_where(
        mut self,
        table: &str,
        column: &str,
        operator: &str,
        value: impl Into<Value>,
    ) -> Self {
        check_operator(self.state_mut(), operator);
        self.state_mut().joins.push(JoinClause {
            kind: JoinKind::Inner,
            table: table.to_string(),
            conditions: vec![JoinCondition::Value {
                column: column.to_string(),
                operator: operator.to_string(),
                value: value.into(),
                boolean: Boolean::And,
            }],
        });
        self
    }

    /// Add a fully specified join (multiple `ON` conditions).
    fn join_clause(mut self, join: JoinClause) -> Self {
        self.state_mut().joins.push(join);
        self
    }

    #[doc(hidden)]
    fn push_join(
        mut self,
        kind: JoinKind,
        table: &str,
        first: &str,
        operator: &str,
        second: &str,
    ) -> Self {
        check_operator(self.state_mut(), operator);
        self.state_mut().joins.push(JoinClause {
            kind,
            table: table.to_string(),
            conditions: vec![JoinCondition::Columns {
                first: first.to_string(),
                operator: operator.to_string(),
                second: second.to_string(),
                boolean: Boolean::And,
            }],
        });
        self
    }

    // ==================== Ordering & grouping ====================

    fn order_by(mut self, column: &str, direction: Direction) -> Self {
        self.state_mut().orders.push(OrderByClause::Column {
            column: column.to_string(),
            direction,
        });
        self
    }

    fn order_by_desc(self, column: &str) -> Self {
        self.order_by(column, Direction::Desc)
    }

    fn order_by_raw(mut self, sql: &str, bindings: Vec<Value>) -> Self {
        self.state_mut().orders.push(OrderByClause::Raw(Raw::with_bindings(sql, bindings)));
        self
    }

    /// Newest first by `column`.
    fn latest(self, column: &str) -> Self {
        self.order_by(column, Direction::Desc)
    }

    /// Oldest first by `column`.
    fn oldest(self, column: &str) -> Self {
        self.order_by(column, Direction::Asc)
    }

    /// Drop every ORDER BY clause.
    fn reorder(mut self) -> Self {
        self.state_mut().orders.clear();
        self
    }

    fn group_by(mut self, columns: &[&str]) -> Self {
        self.state_mut().groups.extend(columns.iter().map(|c| c.to_string()));
        self
    }

    fn having(self, column: &str, operator: &str, value: impl Into<Operand>) -> Self {
        self.push_having(column, operator, value.into(), Boolean::And)
    }

    fn or_having(self, column: &str, operator: &str, value: impl Into<Operand>) -> Self {
        self.push_having(column, operator, value.into(), Boolean::Or)
    }

    fn having_raw(mut self, sql: &str, bindings: Vec<Value>) -> Self {
        self.state_mut().havings.push(WhereClause::Raw {
            raw: Raw::with_bindings(sql, bindings),
            boolean: Boolean::And,
        });
        self
    }

    #[doc(hidden)]
    fn push_having(mut self, column: &str, operator: &str, value: Operand, boolean: Boolean) -> Self {
        check_operator(self.state_mut(), operator);
        self.state_mut().havings.push(WhereClause::Basic {
            column: column.to_string(),
            operator: operator.to_string(),
            value,
            boolean,
        });
        self
    }

    // ==================== Limit & offset ====================

    fn limit(mut self, n: u64) -> Self {
        self.state_mut().limit = Some(n);
        self
    }

    /// Alias for [`QueryClauses::limit`].
    fn take(self, n: u64) -> Self {
        self.limit(n)
    }

    fn offset(mut self, n: u64) -> Self {
        self.state_mut().offset = Some(n);
        self
    }

    /// Alias for [`QueryClauses::offset`].
    fn skip(self, n: u64) -> Self {
        self.offset(n)
    }

    /// Set limit/offset for a 1-based `page`. The offset saturates at `u64::MAX`.
    fn for_page(self, page: u64, per_page: u64) -> Self {
        let offset = page.saturating_sub(1).saturating_mul(per_page);
        self.offset(offset).limit(per_page)
    }

    // ==================== Conditional ====================

    /// Apply `f` only when `condition` holds.
    fn when(self, condition: bool, f: impl FnOnce(Self) -> Self) -> Self {
        if condition { f(self) } else { self }
    }
}

/// A bare clause list used to build nested `( ... )` groups.
#[derive(Debug, Clone, Default)]
pub struct WhereGroup {
    state: QueryState,
}

impl QueryClauses for WhereGroup {
    fn state(&self) -> &QueryState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut QueryState {
        &mut self.state
    }
}

fn check_operator(state: &mut QueryState, operator: &str) {
    if !is_valid_operator(operator) && state.build_error.is_none() {
        state.build_error = Some(format!("invalid operator '{operator}'"));
    }
}

fn collect_values<I, V>(values: I) -> Vec<Value>
where
    I: IntoIterator<Item = V>,
    V: Into<Value>,
{
    values.into_iter().map(Into::into).collect()
}
