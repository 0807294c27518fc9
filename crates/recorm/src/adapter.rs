//! The execution contract consumed by the query builder.
//!
//! The builder never talks to a driver directly: it compiles SQL text plus a
//! bindings slice positioned for the adapter's placeholder style and hands both
//! to an [`Adapter`]. Adapters own connections, pooling and transactions.

use crate::error::{OrmError, OrmResult};
use crate::value::{Row, Value};
use async_trait::async_trait;
use std::sync::Arc;

/// SQL flavour spoken by an adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// `$1, $2, ...` placeholders, `RETURNING` support.
    Postgres,
    /// `?` placeholders.
    MySql,
    /// `?` placeholders, `RETURNING` support.
    Sqlite,
    /// `?` placeholders, no dialect-specific statements.
    Generic,
}

/// How bind placeholders are written into compiled SQL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderStyle {
    /// `?`
    Question,
    /// `$1, $2, ...`
    Numbered,
}

impl Dialect {
    pub fn placeholder_style(self) -> PlaceholderStyle {
        match self {
            Dialect::Postgres => PlaceholderStyle::Numbered,
            Dialect::MySql | Dialect::Sqlite | Dialect::Generic => PlaceholderStyle::Question,
        }
    }

    pub fn supports_returning(self) -> bool {
        matches!(self, Dialect::Postgres | Dialect::Sqlite)
    }
}

/// Result of a raw `query` call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOutput {
    pub rows: Vec<Row>,
    pub row_count: u64,
}

impl QueryOutput {
    pub fn from_rows(rows: Vec<Row>) -> Self {
        let row_count = rows.len() as u64;
        Self { rows, row_count }
    }

    pub fn affected(row_count: u64) -> Self {
        Self {
            rows: Vec::new(),
            row_count,
        }
    }
}

/// Column metadata returned by [`Adapter::get_table_info`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
    pub default: Option<String>,
    pub primary_key: bool,
}

/// Table metadata returned by [`Adapter::get_table_info`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableInfo {
    pub name: String,
    pub columns: Vec<ColumnInfo>,
}

/// A database adapter.
///
/// Only [`Adapter::query`] and the lifecycle/transaction methods are required;
/// the statement-kind helpers default to `query`. Errors are returned as-is to
/// the caller: the builder never classifies or retries them.
#[async_trait]
pub trait Adapter: Send + Sync {
    /// SQL flavour used to compile statements for this adapter.
    fn dialect(&self) -> Dialect;

    /// Driver name, for diagnostics.
    fn driver_name(&self) -> &'static str;

    async fn connect(&self) -> OrmResult<()>;

    async fn disconnect(&self) -> OrmResult<()>;

    fn is_connected(&self) -> bool;

    /// Execute a statement and return its rows and affected-row count.
    async fn query(&self, sql: &str, bindings: &[Value]) -> OrmResult<QueryOutput>;

    async fn select(&self, sql: &str, bindings: &[Value]) -> OrmResult<Vec<Row>> {
        Ok(self.query(sql, bindings).await?.rows)
    }

    async fn insert(&self, sql: &str, bindings: &[Value]) -> OrmResult<u64> {
        Ok(self.query(sql, bindings).await?.row_count)
    }

    /// Execute an INSERT and return the generated key.
    ///
    /// The default appends `RETURNING <key>` for dialects that support it.
    async fn insert_get_id(
        &self,
        sql: &str,
        bindings: &[Value],
        key: &str,
    ) -> OrmResult<Option<Value>> {
        if !self.dialect().supports_returning() {
            return Err(OrmError::configuration(format!(
                "{} adapter does not implement insert_get_id",
                self.driver_name()
            )));
        }
        let sql = format!("{sql} RETURNING {key}");
        let output = self.query(&sql, bindings).await?;
        Ok(output
            .rows
            .into_iter()
            .next()
            .and_then(|mut row| row.shift_remove(key)))
    }

    async fn update(&self, sql: &str, bindings: &[Value]) -> OrmResult<u64> {
        Ok(self.query(sql, bindings).await?.row_count)
    }

    async fn delete(&self, sql: &str, bindings: &[Value]) -> OrmResult<u64> {
        Ok(self.query(sql, bindings).await?.row_count)
    }

    /// An adapter bound to one connection for the length of a transaction.
    ///
    /// [`Connection::transaction`](crate::Connection::transaction) runs
    /// `BEGIN`, the callback's statements and `COMMIT`/`ROLLBACK` on the
    /// returned adapter, so other users of `self` stay outside the
    /// transaction. `None` runs them on `self`.
    async fn transaction_scope(&self) -> OrmResult<Option<Arc<dyn Adapter>>> {
        Ok(None)
    }

    async fn begin_transaction(&self) -> OrmResult<()>;

    async fn commit(&self) -> OrmResult<()>;

    async fn rollback(&self) -> OrmResult<()>;

    async fn get_tables(&self) -> OrmResult<Vec<String>>;

    async fn get_table_info(&self, table: &str) -> OrmResult<TableInfo>;
}
