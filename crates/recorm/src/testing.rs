//! In-memory adapter for unit tests.
//!
//! Records every statement it receives and answers from a fixed set of rows:
//! queued responses win, `COUNT(` statements count the rows, selects honour
//! `LIMIT`/`OFFSET`, a simple `WHERE col > ?` / `WHERE col IN (...)` filter,
//! and inserts report one affected row with an incrementing id.

use crate::adapter::{Adapter, ColumnInfo, Dialect, QueryOutput, TableInfo};
use crate::connection::Connection;
use crate::error::{OrmError, OrmResult};
use crate::value::{Row, Value};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub bindings: Vec<Value>,
}

#[derive(Debug)]
pub struct FakeAdapter {
    dialect: Dialect,
    rows: Mutex<Vec<Row>>,
    responses: Mutex<VecDeque<OrmResult<QueryOutput>>>,
    log: Mutex<Vec<Statement>>,
    next_id: AtomicI64,
    scope: Option<Arc<FakeAdapter>>,
}

impl FakeAdapter {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            rows: Mutex::new(Vec::new()),
            responses: Mutex::new(VecDeque::new()),
            log: Mutex::new(Vec::new()),
            next_id: AtomicI64::new(1),
            scope: None,
        }
    }

    /// Hand out `scope` from `transaction_scope`, as pooled adapters do.
    pub fn with_transaction_scope(mut self, scope: Arc<FakeAdapter>) -> Self {
        self.scope = Some(scope);
        self
    }

    pub fn with_rows(self, rows: Vec<Row>) -> Self {
        let next = rows
            .iter()
            .filter_map(|r| r.get("id").and_then(Value::as_i64))
            .max()
            .unwrap_or(0);
        self.next_id.store(next + 1, Ordering::SeqCst);
        *self.rows.lock().unwrap() = rows;
        self
    }

    /// Queue a response for the next statement, ahead of the table logic.
    pub fn respond(&self, output: QueryOutput) {
        self.responses.lock().unwrap().push_back(Ok(output));
    }

    pub fn fail_next(&self, message: &str) {
        self.responses
            .lock()
            .unwrap()
            .push_back(Err(OrmError::adapter(message.to_string())));
    }

    pub fn statements(&self) -> Vec<Statement> {
        self.log.lock().unwrap().clone()
    }

    pub fn last(&self) -> Option<Statement> {
        self.log.lock().unwrap().last().cloned()
    }

    pub fn sql_log(&self) -> Vec<String> {
        self.statements().into_iter().map(|s| s.sql).collect()
    }

    fn answer(&self, sql: &str, bindings: &[Value]) -> QueryOutput {
        let upper = sql.to_ascii_uppercase();
        if upper.starts_with("INSERT") {
            let id = self.next_id.fetch_add(1, Ordering::SeqCst);
            if upper.contains(" RETURNING ") {
                let key = sql.rsplit(' ').next().unwrap_or("id").to_string();
                let mut row = Row::new();
                row.insert(key, Value::Int(id));
                return QueryOutput::from_rows(vec![row]);
            }
            return QueryOutput::affected(1);
        }
        if !upper.starts_with("SELECT") {
            return QueryOutput::affected(self.rows.lock().unwrap().len() as u64);
        }

        let rows = filter_rows(self.rows.lock().unwrap().clone(), &upper, sql, bindings);
        if upper.contains("COUNT(") {
            let mut row = Row::new();
            row.insert("aggregate".to_string(), Value::Int(rows.len() as i64));
            return QueryOutput::from_rows(vec![row]);
        }

        let offset = number_after(&upper, " OFFSET ").unwrap_or(0) as usize;
        let limit = number_after(&upper, " LIMIT ").map_or(usize::MAX, |n| n as usize);
        QueryOutput::from_rows(rows.into_iter().skip(offset).take(limit).collect())
    }
}

#[async_trait]
impl Adapter for FakeAdapter {
    fn dialect(&self) -> Dialect {
        self.dialect
    }

    fn driver_name(&self) -> &'static str {
        "fake"
    }

    async fn connect(&self) -> OrmResult<()> {
        Ok(())
    }

    async fn disconnect(&self) -> OrmResult<()> {
        Ok(())
    }

    fn is_connected(&self) -> bool {
        true
    }

    async fn query(&self, sql: &str, bindings: &[Value]) -> OrmResult<QueryOutput> {
        self.log.lock().unwrap().push(Statement {
            sql: sql.to_string(),
            bindings: bindings.to_vec(),
        });
        if let Some(response) = self.responses.lock().unwrap().pop_front() {
            return response;
        }
        Ok(self.answer(sql, bindings))
    }

    async fn transaction_scope(&self) -> OrmResult<Option<Arc<dyn Adapter>>> {
        Ok(self
            .scope
            .clone()
            .map(|scope| scope as Arc<dyn Adapter>))
    }

    async fn begin_transaction(&self) -> OrmResult<()> {
        self.query("BEGIN", &[]).await.map(|_| ())
    }

    async fn commit(&self) -> OrmResult<()> {
        self.query("COMMIT", &[]).await.map(|_| ())
    }

    async fn rollback(&self) -> OrmResult<()> {
        self.query("ROLLBACK", &[]).await.map(|_| ())
    }

    async fn get_tables(&self) -> OrmResult<Vec<String>> {
        Ok(vec!["users".to_string()])
    }

    async fn get_table_info(&self, table: &str) -> OrmResult<TableInfo> {
        let columns = self
            .rows
            .lock()
            .unwrap()
            .first()
            .map(|row| {
                row.iter()
                    .map(|(name, value)| ColumnInfo {
                        name: name.clone(),
                        data_type: value.type_name().to_string(),
                        nullable: true,
                        default: None,
                        primary_key: name == "id",
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(TableInfo {
            name: table.to_string(),
            columns,
        })
    }
}

/// A connection over a fresh fake adapter, plus a handle for assertions.
pub fn fake(dialect: Dialect) -> (Connection, Arc<FakeAdapter>) {
    fake_with_rows(dialect, Vec::new())
}

pub fn fake_with_rows(dialect: Dialect, rows: Vec<Row>) -> (Connection, Arc<FakeAdapter>) {
    let adapter = Arc::new(FakeAdapter::new(dialect).with_rows(rows));
    (Connection::from_arc(adapter.clone()), adapter)
}

/// `n` rows `{id: 1..=n, name: "user-<id>"}`.
pub fn numbered_rows(n: i64) -> Vec<Row> {
    (1..=n)
        .map(|id| crate::attrs! { "id" => id, "name" => format!("user-{id}") })
        .collect()
}

fn number_after(upper: &str, keyword: &str) -> Option<u64> {
    let start = upper.rfind(keyword)? + keyword.len();
    upper[start..]
        .split_whitespace()
        .next()
        .and_then(|n| n.parse().ok())
}

/// Apply a leading `WHERE col > $1` / `WHERE col IN (...)` predicate, the
/// shapes produced by keyset chunking and eager loading.
fn filter_rows(rows: Vec<Row>, upper: &str, sql: &str, bindings: &[Value]) -> Vec<Row> {
    let Some(start) = upper.find(" WHERE ") else {
        return rows;
    };
    let predicate = &sql[start + 7..];
    let mut parts = predicate.split_whitespace();
    let (Some(column), Some(op)) = (parts.next(), parts.next()) else {
        return rows;
    };
    let column = column.trim_start_matches('(');
    match op.to_ascii_uppercase().as_str() {
        ">" => match bindings.last() {
            Some(bound) => rows
                .into_iter()
                .filter(|r| {
                    r.get(column)
                        .is_some_and(|v| v.compare(bound) == std::cmp::Ordering::Greater)
                })
                .collect(),
            None => rows,
        },
        "IN" => rows
            .into_iter()
            .filter(|r| r.get(column).is_some_and(|v| bindings.contains(v)))
            .collect(),
        _ => rows,
    }
}
