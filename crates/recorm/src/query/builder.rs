//! The table-level query builder.

use crate::connection::Connection;
use crate::error::OrmResult;
use crate::query::clause::QueryState;
use crate::query::grammar::{AGGREGATE_ALIAS, Aggregate, CompiledQuery, Grammar};
use crate::query::traits::QueryClauses;
use crate::raw::{Operand, Raw};
use crate::value::{Attributes, Row, Value};
use indexmap::IndexSet;
use std::fmt;

/// Primary key used by [`QueryBuilder::find`].
pub const DEFAULT_KEY: &str = "id";

/// Fluent SELECT/INSERT/UPDATE/DELETE builder bound to a connection.
///
/// Cloning copies every clause list and binding; only the connection handle is
/// shared.
#[derive(Clone)]
pub struct QueryBuilder {
    connection: Connection,
    state: QueryState,
}

impl fmt::Debug for QueryBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryBuilder")
            .field("connection", &self.connection)
            .field("state", &self.state)
            .finish()
    }
}

impl QueryClauses for QueryBuilder {
    fn state(&self) -> &QueryState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut QueryState {
        &mut self.state
    }
}

impl QueryBuilder {
    pub fn new(connection: Connection) -> Self {
        Self {
            connection,
            state: QueryState::default(),
        }
    }

    pub fn table(connection: Connection, table: &str) -> Self {
        Self::new(connection).from(table)
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    pub fn grammar(&self) -> Grammar {
        Grammar::new(self.connection.dialect())
    }

    pub fn into_state(self) -> QueryState {
        self.state
    }

    // ==================== Compilation ====================

    /// Compile the SELECT statement with its bindings.
    pub fn to_compiled(&self) -> OrmResult<CompiledQuery> {
        self.grammar().compile_select(&self.state)
    }

    /// The SELECT statement this builder would run.
    pub fn to_sql(&self) -> OrmResult<String> {
        Ok(self.to_compiled()?.sql)
    }

    /// Bindings in placeholder order for [`QueryBuilder::to_sql`].
    pub fn bindings(&self) -> OrmResult<Vec<Value>> {
        Ok(self.to_compiled()?.bindings)
    }

    // ==================== Reads ====================

    /// Execute the SELECT and return all rows.
    pub async fn get(&self) -> OrmResult<Vec<Row>> {
        let compiled = self.to_compiled()?;
        self.connection.run_select(&compiled).await
    }

    /// Execute with `LIMIT 1` and return the row, if any.
    pub async fn first(&self) -> OrmResult<Option<Row>> {
        let rows = self.clone().limit(1).get().await?;
        Ok(rows.into_iter().next())
    }

    /// Shorthand for `where_eq("id", id).first()`.
    pub async fn find(&self, id: impl Into<Value>) -> OrmResult<Option<Row>> {
        self.clone().where_eq(DEFAULT_KEY, id.into()).first().await
    }

    /// First row's value of `column`.
    pub async fn value(&self, column: &str) -> OrmResult<Option<Value>> {
        let row = self.clone().select(&[column]).first().await?;
        Ok(row.and_then(|row| first_cell(row, column)))
    }

    /// All values of `column`.
    pub async fn pluck(&self, column: &str) -> OrmResult<Vec<Value>> {
        let rows = self.clone().select(&[column]).get().await?;
        Ok(rows
            .into_iter()
            .map(|row| first_cell(row, column).unwrap_or_default())
            .collect())
    }

    pub async fn exists(&self) -> OrmResult<bool> {
        let compiled = self.grammar().compile_exists(&self.state)?;
        let rows = self.connection.run_select(&compiled).await?;
        Ok(!rows.is_empty())
    }

    pub async fn doesnt_exist(&self) -> OrmResult<bool> {
        Ok(!self.exists().await?)
    }

    // ==================== Aggregates ====================

    /// Run an aggregate and return its raw value (`None` when no row or NULL).
    pub async fn aggregate(&self, aggregate: Aggregate, column: &str) -> OrmResult<Option<Value>> {
        let compiled = self
            .grammar()
            .compile_aggregate(&self.state, aggregate, column)?;
        let rows = self.connection.run_select(&compiled).await?;
        Ok(rows
            .into_iter()
            .next()
            .and_then(|row| first_cell(row, AGGREGATE_ALIAS))
            .filter(|v| !v.is_null()))
    }

    /// `COUNT(*)`; `0` when nothing matches.
    pub async fn count(&self) -> OrmResult<u64> {
        let value = self.aggregate(Aggregate::Count, "*").await?;
        Ok(value
            .and_then(|v| v.to_number())
            .map_or(0, |n| n.max(0.0) as u64))
    }

    /// `SUM(column)`; `0` when nothing matches.
    pub async fn sum(&self, column: &str) -> OrmResult<f64> {
        let value = self.aggregate(Aggregate::Sum, column).await?;
        Ok(value.and_then(|v| v.to_number()).unwrap_or(0.0))
    }

    /// `AVG(column)`; `None` when nothing matches.
    pub async fn avg(&self, column: &str) -> OrmResult<Option<f64>> {
        let value = self.aggregate(Aggregate::Avg, column).await?;
        Ok(value.and_then(|v| v.to_number()))
    }

    /// `MIN(column)`; `None` when nothing matches.
    pub async fn min(&self, column: &str) -> OrmResult<Option<Value>> {
        self.aggregate(Aggregate::Min, column).await
    }

    /// `MAX(column)`; `None` when nothing matches.
    pub async fn max(&self, column: &str) -> OrmResult<Option<Value>> {
        self.aggregate(Aggregate::Max, column).await
    }

    // ==================== Writes ====================

    /// Insert one row; returns the affected-row count.
    pub async fn insert<I, K, V>(&self, values: I) -> OrmResult<u64>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Operand>,
    {
        let (columns, row) = split_assignments(values);
        let compiled = self.grammar().compile_insert(&self.state, &columns, &[row])?;
        self.connection.run_insert(&compiled).await
    }

    /// Insert many rows in one statement. The column list is every key of
    /// every row in first-seen order; a row missing a column inserts NULL.
    pub async fn insert_many(&self, rows: impl IntoIterator<Item = Attributes>) -> OrmResult<u64> {
        let rows: Vec<Attributes> = rows.into_iter().collect();
        if rows.is_empty() {
            return Ok(0);
        }
        let columns: Vec<String> = rows
            .iter()
            .flat_map(|row| row.keys())
            .collect::<IndexSet<&String>>()
            .into_iter()
            .cloned()
            .collect();
        let operands: Vec<Vec<Operand>> = rows
            .iter()
            .map(|row| {
                columns
                    .iter()
                    .map(|c| Operand::Value(row.get(c).cloned().unwrap_or_default()))
                    .collect()
            })
            .collect();
        let compiled = self
            .grammar()
            .compile_insert(&self.state, &columns, &operands)?;
        self.connection.run_insert(&compiled).await
    }

    /// Insert one row and return the generated `id`.
    pub async fn insert_get_id<I, K, V>(&self, values: I) -> OrmResult<Option<Value>>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Operand>,
    {
        self.insert_get_id_with(values, DEFAULT_KEY).await
    }

    /// Insert one row and return the generated value of `key`.
    pub async fn insert_get_id_with<I, K, V>(&self, values: I, key: &str) -> OrmResult<Option<Value>>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Operand>,
    {
        let (columns, row) = split_assignments(values);
        let compiled = self.grammar().compile_insert(&self.state, &columns, &[row])?;
        self.connection.run_insert_get_id(&compiled, key).await
    }

    /// Update matching rows; returns the affected-row count.
    pub async fn update<I, K, V>(&self, values: I) -> OrmResult<u64>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Operand>,
    {
        let assignments: Vec<(String, Operand)> = values
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        let compiled = self.grammar().compile_update(&self.state, &assignments)?;
        self.connection.run_update(&compiled).await
    }

    /// `SET column = column + amount` on matching rows.
    pub async fn increment(&self, column: &str, amount: impl Into<Value>) -> OrmResult<u64> {
        let expr = Raw::with_bindings(format!("{column} + ?"), [amount.into()]);
        self.update([(column, expr)]).await
    }

    /// `SET column = column - amount` on matching rows.
    pub async fn decrement(&self, column: &str, amount: impl Into<Value>) -> OrmResult<u64> {
        let expr = Raw::with_bindings(format!("{column} - ?"), [amount.into()]);
        self.update([(column, expr)]).await
    }

    /// Delete matching rows; returns the affected-row count.
    pub async fn delete(&self) -> OrmResult<u64> {
        let compiled = self.grammar().compile_delete(&self.state)?;
        self.connection.run_delete(&compiled).await
    }

    /// Remove every row of the table.
    pub async fn truncate(&self) -> OrmResult<()> {
        let compiled = self.grammar().compile_truncate(&self.state)?;
        self.connection.run_statement(&compiled).await?;
        Ok(())
    }
}

/// Take `column` from a row, falling back to its first cell (drivers may
/// strip table qualifiers from returned column names).
fn first_cell(mut row: Row, column: &str) -> Option<Value> {
    let bare = column.rsplit('.').next().unwrap_or(column);
    if let Some(value) = row.shift_remove(bare) {
        return Some(value);
    }
    row.shift_remove_index(0).map(|(_, v)| v)
}

fn split_assignments<I, K, V>(values: I) -> (Vec<String>, Vec<Operand>)
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<Operand>,
{
    values.into_iter().map(|(k, v)| (k.into(), v.into())).unzip()
}
