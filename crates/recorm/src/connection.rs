//! Connection handles and the named-connection registry.

use crate::adapter::{Adapter, Dialect};
use crate::error::{OrmError, OrmResult};
use crate::model::{Model, RecordBuilder};
use crate::query::{CompiledQuery, QueryBuilder};
use crate::value::{Row, Value};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// A cheap, clonable handle to an adapter.
///
/// Builders hold a `Connection` so every clone of a builder executes against
/// the same adapter.
#[derive(Clone)]
pub struct Connection {
    adapter: Arc<dyn Adapter>,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("driver", &self.adapter.driver_name())
            .field("dialect", &self.adapter.dialect())
            .finish()
    }
}

impl Connection {
    pub fn new(adapter: impl Adapter + 'static) -> Self {
        Self {
            adapter: Arc::new(adapter),
        }
    }

    pub fn from_arc(adapter: Arc<dyn Adapter>) -> Self {
        Self { adapter }
    }

    pub fn adapter(&self) -> &dyn Adapter {
        self.adapter.as_ref()
    }

    pub fn dialect(&self) -> Dialect {
        self.adapter.dialect()
    }

    /// Start a query builder against `table`.
    pub fn table(&self, table: &str) -> QueryBuilder {
        QueryBuilder::table(self.clone(), table)
    }

    /// Start a query builder with no table set.
    pub fn query(&self) -> QueryBuilder {
        QueryBuilder::new(self.clone())
    }

    /// Start a record builder for `M`.
    pub fn model<M: Model>(&self) -> RecordBuilder<M> {
        RecordBuilder::new(self.clone())
    }

    /// Run `f` inside a transaction: commit on `Ok`, roll back on `Err`.
    ///
    /// The callback receives a connection scoped to the transaction (see
    /// [`Adapter::transaction_scope`]); statements issued through `self`
    /// meanwhile run outside it.
    pub async fn transaction<F, Fut, T>(&self, f: F) -> OrmResult<T>
    where
        F: FnOnce(Connection) -> Fut,
        Fut: Future<Output = OrmResult<T>>,
    {
        let tx = match self.adapter.transaction_scope().await? {
            Some(adapter) => Connection::from_arc(adapter),
            None => self.clone(),
        };
        tx.adapter.begin_transaction().await?;
        match f(tx.clone()).await {
            Ok(value) => {
                tx.adapter.commit().await?;
                Ok(value)
            }
            Err(error) => match tx.adapter.rollback().await {
                Ok(()) => Err(error),
                Err(rollback_err) => Err(OrmError::Other(format!(
                    "{error} (rollback failed: {rollback_err})"
                ))),
            },
        }
    }

    pub async fn disconnect(&self) -> OrmResult<()> {
        self.adapter.disconnect().await
    }

    // ==================== Dispatch ====================

    pub(crate) async fn run_select(&self, compiled: &CompiledQuery) -> OrmResult<Vec<Row>> {
        log_statement("select", compiled);
        self.adapter
            .select(&compiled.sql, &compiled.bindings)
            .await
            .inspect_err(|e| log_failure("select", e))
    }

    pub(crate) async fn run_insert(&self, compiled: &CompiledQuery) -> OrmResult<u64> {
        log_statement("insert", compiled);
        self.adapter
            .insert(&compiled.sql, &compiled.bindings)
            .await
            .inspect_err(|e| log_failure("insert", e))
    }

    pub(crate) async fn run_insert_get_id(
        &self,
        compiled: &CompiledQuery,
        key: &str,
    ) -> OrmResult<Option<Value>> {
        log_statement("insert", compiled);
        self.adapter
            .insert_get_id(&compiled.sql, &compiled.bindings, key)
            .await
            .inspect_err(|e| log_failure("insert", e))
    }

    pub(crate) async fn run_update(&self, compiled: &CompiledQuery) -> OrmResult<u64> {
        log_statement("update", compiled);
        self.adapter
            .update(&compiled.sql, &compiled.bindings)
            .await
            .inspect_err(|e| log_failure("update", e))
    }

    pub(crate) async fn run_delete(&self, compiled: &CompiledQuery) -> OrmResult<u64> {
        log_statement("delete", compiled);
        self.adapter
            .delete(&compiled.sql, &compiled.bindings)
            .await
            .inspect_err(|e| log_failure("delete", e))
    }

    pub(crate) async fn run_statement(&self, compiled: &CompiledQuery) -> OrmResult<u64> {
        log_statement("statement", compiled);
        self.adapter
            .query(&compiled.sql, &compiled.bindings)
            .await
            .map(|output| output.row_count)
            .inspect_err(|e| log_failure("statement", e))
    }
}

fn log_statement(kind: &'static str, compiled: &CompiledQuery) {
    tracing::debug!(
        target: "recorm.sql",
        kind,
        sql = %compiled.sql,
        bindings = ?compiled.bindings,
        "dispatching statement"
    );
}

fn log_failure(kind: &'static str, error: &OrmError) {
    tracing::warn!(target: "recorm.sql", kind, error = %error, "statement failed");
}

/// Registry of named connections.
#[derive(Debug, Default, Clone)]
pub struct DatabaseManager {
    connections: HashMap<String, Connection>,
    default: Option<String>,
}

impl DatabaseManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection. The first registered connection becomes the default.
    pub fn add(&mut self, name: impl Into<String>, connection: Connection) -> &mut Self {
        let name = name.into();
        if self.default.is_none() {
            self.default = Some(name.clone());
        }
        self.connections.insert(name, connection);
        self
    }

    pub fn set_default(&mut self, name: &str) -> OrmResult<()> {
        if !self.connections.contains_key(name) {
            return Err(unknown_connection(name));
        }
        self.default = Some(name.to_string());
        Ok(())
    }

    pub fn connection(&self, name: &str) -> OrmResult<Connection> {
        self.connections
            .get(name)
            .cloned()
            .ok_or_else(|| unknown_connection(name))
    }

    pub fn default_connection(&self) -> OrmResult<Connection> {
        let name = self
            .default
            .as_deref()
            .ok_or_else(|| OrmError::configuration("no connections registered"))?;
        self.connection(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.connections.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Disconnect every registered adapter, returning the first failure.
    pub async fn disconnect_all(&self) -> OrmResult<()> {
        let mut first_error = None;
        for (name, connection) in &self.connections {
            if let Err(err) = connection.disconnect().await {
                tracing::warn!(target: "recorm", connection = %name, error = %err, "disconnect failed");
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

fn unknown_connection(name: &str) -> OrmError {
    OrmError::configuration(format!("connection '{name}' is not registered"))
}
