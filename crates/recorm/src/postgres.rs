//! PostgreSQL adapter on tokio-postgres (optionally pooled with deadpool-postgres).

use crate::adapter::{Adapter, ColumnInfo, Dialect, QueryOutput, TableInfo};
use crate::error::{OrmError, OrmResult};
use crate::value::{Row, Value};
use async_trait::async_trait;
use bytes::BytesMut;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use std::error::Error;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use tokio_postgres::types::{IsNull, ToSql, Type};
use tokio_postgres::{Client, NoTls};
use uuid::Uuid;

enum Source {
    Config(Box<tokio_postgres::Config>),
    #[cfg(feature = "pool")]
    Pool(deadpool_postgres::Pool),
    /// One pooled connection checked out for a single transaction.
    #[cfg(feature = "pool")]
    Pinned,
}

enum PgConn {
    Client(Client),
    #[cfg(feature = "pool")]
    Pooled(deadpool_postgres::Object),
}

impl PgConn {
    fn client(&self) -> &Client {
        match self {
            PgConn::Client(client) => client,
            #[cfg(feature = "pool")]
            PgConn::Pooled(object) => object,
        }
    }
}

/// [`Adapter`] for PostgreSQL.
///
/// With a direct connection every statement runs on that one client, so a
/// transaction opened through it spans every user of the adapter. With a pool
/// each statement checks out a connection, and
/// [`Connection::transaction`](crate::Connection::transaction) runs on a
/// separate adapter pinned to one pooled connection from `BEGIN` until
/// `COMMIT`/`ROLLBACK`. Statements on a pinned or direct connection are
/// serialised.
pub struct PgAdapter {
    source: Source,
    conn: Mutex<Option<PgConn>>,
    connected: AtomicBool,
}

impl fmt::Debug for PgAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let source = match self.source {
            Source::Config(_) => "client",
            #[cfg(feature = "pool")]
            Source::Pool(_) => "pool",
            #[cfg(feature = "pool")]
            Source::Pinned => "transaction",
        };
        f.debug_struct("PgAdapter")
            .field("source", &source)
            .field("connected", &self.connected.load(Ordering::Relaxed))
            .finish()
    }
}

impl PgAdapter {
    /// Adapter that opens its own connection on first use.
    pub fn new(config: tokio_postgres::Config) -> Self {
        Self {
            source: Source::Config(Box::new(config)),
            conn: Mutex::new(None),
            connected: AtomicBool::new(false),
        }
    }

    pub fn from_url(database_url: &str) -> OrmResult<Self> {
        let config: tokio_postgres::Config = database_url
            .parse()
            .map_err(|e: tokio_postgres::Error| OrmError::Connection(e.to_string()))?;
        Ok(Self::new(config))
    }

    /// Adapter over an already connected client. The caller drives the
    /// client's connection future.
    pub fn from_client(client: Client) -> Self {
        Self {
            source: Source::Config(Box::default()),
            conn: Mutex::new(Some(PgConn::Client(client))),
            connected: AtomicBool::new(true),
        }
    }

    #[cfg(feature = "pool")]
    pub fn from_pool(pool: deadpool_postgres::Pool) -> Self {
        Self {
            source: Source::Pool(pool),
            conn: Mutex::new(None),
            connected: AtomicBool::new(true),
        }
    }

    #[cfg(feature = "pool")]
    fn pinned(object: deadpool_postgres::Object) -> Self {
        Self {
            source: Source::Pinned,
            conn: Mutex::new(Some(PgConn::Pooled(object))),
            connected: AtomicBool::new(true),
        }
    }

    async fn open(config: &tokio_postgres::Config) -> OrmResult<Client> {
        let (client, connection) = config
            .connect(NoTls)
            .await
            .map_err(|e| OrmError::Connection(e.to_string()))?;
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!(target: "recorm", error = %e, "postgres connection closed with error");
            }
        });
        Ok(client)
    }

    /// Run one statement on the pinned connection, opening or checking out
    /// one as needed.
    async fn run(&self, sql: &str, bindings: &[Value]) -> OrmResult<QueryOutput> {
        let mut guard = self.conn.lock().await;
        if let Some(conn) = guard.as_ref() {
            return execute(conn.client(), sql, bindings).await;
        }
        match &self.source {
            Source::Config(config) => {
                let client = Self::open(config).await?;
                self.connected.store(true, Ordering::Relaxed);
                let conn = guard.insert(PgConn::Client(client));
                execute(conn.client(), sql, bindings).await
            }
            #[cfg(feature = "pool")]
            Source::Pool(pool) => {
                drop(guard);
                let object = pool.get().await?;
                execute(&object, sql, bindings).await
            }
            #[cfg(feature = "pool")]
            Source::Pinned => Err(released()),
        }
    }

    async fn control(&self, statement: &str) -> OrmResult<()> {
        let guard = self.conn.lock().await;
        let conn = guard
            .as_ref()
            .ok_or_else(|| OrmError::Connection(format!("{statement} without an open transaction")))?;
        tracing::debug!(target: "recorm.sql", kind = "transaction", sql = statement, "dispatching statement");
        conn.client().batch_execute(statement).await?;
        Ok(())
    }

    /// Release a pinned pooled connection back to the pool.
    async fn unpin(&self) {
        #[cfg(feature = "pool")]
        if matches!(self.source, Source::Pool(_) | Source::Pinned) {
            self.conn.lock().await.take();
        }
    }
}

#[async_trait]
impl Adapter for PgAdapter {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    fn driver_name(&self) -> &'static str {
        "postgres"
    }

    async fn connect(&self) -> OrmResult<()> {
        match &self.source {
            Source::Config(config) => {
                let mut guard = self.conn.lock().await;
                if guard.is_none() {
                    *guard = Some(PgConn::Client(Self::open(config).await?));
                }
            }
            #[cfg(feature = "pool")]
            Source::Pool(pool) => {
                drop(pool.get().await?);
            }
            #[cfg(feature = "pool")]
            Source::Pinned => {
                if self.conn.lock().await.is_none() {
                    return Err(released());
                }
            }
        }
        self.connected.store(true, Ordering::Relaxed);
        Ok(())
    }

    async fn disconnect(&self) -> OrmResult<()> {
        self.conn.lock().await.take();
        #[cfg(feature = "pool")]
        if let Source::Pool(pool) = &self.source {
            pool.close();
        }
        self.connected.store(false, Ordering::Relaxed);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    async fn query(&self, sql: &str, bindings: &[Value]) -> OrmResult<QueryOutput> {
        self.run(sql, bindings).await
    }

    async fn transaction_scope(&self) -> OrmResult<Option<Arc<dyn Adapter>>> {
        #[cfg(feature = "pool")]
        if let Source::Pool(pool) = &self.source {
            let object = pool.get().await?;
            return Ok(Some(Arc::new(PgAdapter::pinned(object))));
        }
        Ok(None)
    }

    async fn begin_transaction(&self) -> OrmResult<()> {
        {
            let mut guard = self.conn.lock().await;
            if guard.is_none() {
                match &self.source {
                    Source::Config(config) => {
                        *guard = Some(PgConn::Client(Self::open(config).await?));
                    }
                    #[cfg(feature = "pool")]
                    Source::Pool(pool) => {
                        *guard = Some(PgConn::Pooled(pool.get().await?));
                    }
                    #[cfg(feature = "pool")]
                    Source::Pinned => return Err(released()),
                }
            }
        }
        self.control("BEGIN").await
    }

    async fn commit(&self) -> OrmResult<()> {
        let result = self.control("COMMIT").await;
        self.unpin().await;
        result
    }

    async fn rollback(&self) -> OrmResult<()> {
        let result = self.control("ROLLBACK").await;
        self.unpin().await;
        result
    }

    async fn get_tables(&self) -> OrmResult<Vec<String>> {
        let output = self
            .run(
                "SELECT table_name::text AS table_name FROM information_schema.tables \
                 WHERE table_schema = current_schema() AND table_type = 'BASE TABLE' \
                 ORDER BY table_name",
                &[],
            )
            .await?;
        Ok(output
            .rows
            .into_iter()
            .filter_map(|row| row.get("table_name").map(Value::to_string))
            .collect())
    }

    async fn get_table_info(&self, table: &str) -> OrmResult<TableInfo> {
        let output = self
            .run(
                "SELECT c.column_name::text AS name, c.data_type::text AS data_type, \
                 c.is_nullable = 'YES' AS nullable, c.column_default::text AS column_default, \
                 EXISTS (SELECT 1 FROM information_schema.table_constraints tc \
                   JOIN information_schema.key_column_usage k \
                     ON k.constraint_name = tc.constraint_name AND k.table_schema = tc.table_schema \
                   WHERE tc.constraint_type = 'PRIMARY KEY' AND tc.table_schema = c.table_schema \
                     AND tc.table_name = c.table_name AND k.column_name = c.column_name) AS primary_key \
                 FROM information_schema.columns c \
                 WHERE c.table_schema = current_schema() AND c.table_name = $1 \
                 ORDER BY c.ordinal_position",
                &[Value::from(table)],
            )
            .await?;
        if output.rows.is_empty() {
            return Err(OrmError::not_found(format!("table '{table}' does not exist")));
        }
        let columns = output
            .rows
            .into_iter()
            .map(|row| ColumnInfo {
                name: text(&row, "name"),
                data_type: text(&row, "data_type"),
                nullable: row.get("nullable").and_then(Value::as_bool).unwrap_or(true),
                default: row
                    .get("column_default")
                    .filter(|v| !v.is_null())
                    .map(Value::to_string),
                primary_key: row.get("primary_key").and_then(Value::as_bool).unwrap_or(false),
            })
            .collect();
        Ok(TableInfo {
            name: table.to_string(),
            columns,
        })
    }
}

#[cfg(feature = "pool")]
fn released() -> OrmError {
    OrmError::Connection("transaction connection was already released".to_string())
}

fn text(row: &Row, column: &str) -> String {
    row.get(column).map(Value::to_string).unwrap_or_default()
}

/// Whether `sql` produces rows (so must go through `query`, not `execute`).
fn returns_rows(sql: &str) -> bool {
    let head = sql.trim_start();
    let keyword: String = head
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect::<String>()
        .to_ascii_uppercase();
    matches!(keyword.as_str(), "SELECT" | "WITH" | "VALUES" | "SHOW" | "TABLE" | "EXPLAIN")
        || head.to_ascii_uppercase().contains(" RETURNING ")
}

async fn execute(client: &Client, sql: &str, bindings: &[Value]) -> OrmResult<QueryOutput> {
    let params: Vec<&(dyn ToSql + Sync)> =
        bindings.iter().map(|v| v as &(dyn ToSql + Sync)).collect();
    if returns_rows(sql) {
        let rows = client.query(sql, &params).await?;
        let rows = rows.iter().map(decode_row).collect::<OrmResult<Vec<Row>>>()?;
        Ok(QueryOutput::from_rows(rows))
    } else {
        let affected = client.execute(sql, &params).await?;
        Ok(QueryOutput::affected(affected))
    }
}

// ==================== Decoding ====================

fn decode_row(row: &tokio_postgres::Row) -> OrmResult<Row> {
    let mut out = Row::with_capacity(row.len());
    for (idx, column) in row.columns().iter().enumerate() {
        let value = decode_cell(row, idx, column.type_())
            .map_err(|e| OrmError::decode(column.name(), e.to_string()))?;
        out.insert(column.name().to_string(), value);
    }
    Ok(out)
}

fn decode_cell(
    row: &tokio_postgres::Row,
    idx: usize,
    ty: &Type,
) -> Result<Value, tokio_postgres::Error> {
    let value = match *ty {
        Type::BOOL => row.try_get::<_, Option<bool>>(idx)?.into(),
        Type::CHAR => row.try_get::<_, Option<i8>>(idx)?.into(),
        Type::INT2 => row.try_get::<_, Option<i16>>(idx)?.into(),
        Type::INT4 => row.try_get::<_, Option<i32>>(idx)?.into(),
        Type::INT8 => row.try_get::<_, Option<i64>>(idx)?.into(),
        Type::OID => row.try_get::<_, Option<u32>>(idx)?.into(),
        Type::FLOAT4 => row.try_get::<_, Option<f32>>(idx)?.into(),
        Type::FLOAT8 => row.try_get::<_, Option<f64>>(idx)?.into(),
        Type::NUMERIC => row
            .try_get::<_, Option<Decimal>>(idx)?
            .and_then(|d| d.to_f64())
            .into(),
        Type::UUID => row.try_get::<_, Option<Uuid>>(idx)?.into(),
        Type::TIMESTAMPTZ => row.try_get::<_, Option<DateTime<Utc>>>(idx)?.into(),
        Type::TIMESTAMP => row.try_get::<_, Option<NaiveDateTime>>(idx)?.into(),
        Type::DATE => row.try_get::<_, Option<NaiveDate>>(idx)?.into(),
        Type::JSON | Type::JSONB => row
            .try_get::<_, Option<serde_json::Value>>(idx)?
            .map_or(Value::Null, Value::from),
        Type::BOOL_ARRAY => row.try_get::<_, Option<Vec<Option<bool>>>>(idx)?.into(),
        Type::INT2_ARRAY => row.try_get::<_, Option<Vec<Option<i16>>>>(idx)?.into(),
        Type::INT4_ARRAY => row.try_get::<_, Option<Vec<Option<i32>>>>(idx)?.into(),
        Type::INT8_ARRAY => row.try_get::<_, Option<Vec<Option<i64>>>>(idx)?.into(),
        Type::FLOAT8_ARRAY => row.try_get::<_, Option<Vec<Option<f64>>>>(idx)?.into(),
        Type::UUID_ARRAY => row.try_get::<_, Option<Vec<Option<Uuid>>>>(idx)?.into(),
        Type::TEXT_ARRAY | Type::VARCHAR_ARRAY => {
            row.try_get::<_, Option<Vec<Option<String>>>>(idx)?.into()
        }
        // text-like and anything else with a text representation
        _ => row.try_get::<_, Option<String>>(idx)?.into(),
    };
    Ok(value)
}

// ==================== Encoding ====================

type BoxedError = Box<dyn Error + Sync + Send>;

impl ToSql for Value {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxedError> {
        match self {
            Value::Null => Ok(IsNull::Yes),
            Value::Bool(b) => b.to_sql(ty, out),
            Value::Int(i) => encode_int(*i, ty, out),
            Value::Float(f) => encode_float(*f, ty, out),
            Value::Text(s) => encode_text(s, ty, out),
            Value::Uuid(u) => match *ty {
                Type::UUID => u.to_sql(ty, out),
                _ => u.to_string().to_sql(ty, out),
            },
            Value::Timestamp(t) => match *ty {
                Type::TIMESTAMP => t.naive_utc().to_sql(ty, out),
                Type::DATE => t.date_naive().to_sql(ty, out),
                Type::TEXT | Type::VARCHAR => t.to_rfc3339().to_sql(ty, out),
                _ => t.to_sql(ty, out),
            },
            Value::Array(items) => match ty.kind() {
                tokio_postgres::types::Kind::Array(_) => items.to_sql(ty, out),
                _ => serde_json::Value::from(self.clone()).to_sql(ty, out),
            },
            Value::Object(_) => serde_json::Value::from(self.clone()).to_sql(ty, out),
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    tokio_postgres::types::to_sql_checked!();
}

fn encode_int(i: i64, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxedError> {
    match *ty {
        Type::INT2 => i16::try_from(i)?.to_sql(ty, out),
        Type::INT4 => i32::try_from(i)?.to_sql(ty, out),
        Type::OID => u32::try_from(i)?.to_sql(ty, out),
        Type::FLOAT4 => (i as f32).to_sql(ty, out),
        Type::FLOAT8 => (i as f64).to_sql(ty, out),
        Type::NUMERIC => Decimal::from(i).to_sql(ty, out),
        Type::BOOL => (i != 0).to_sql(ty, out),
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME => i.to_string().to_sql(ty, out),
        Type::JSON | Type::JSONB => serde_json::Value::from(i).to_sql(ty, out),
        _ => i.to_sql(ty, out),
    }
}

fn encode_float(f: f64, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxedError> {
    match *ty {
        Type::FLOAT4 => (f as f32).to_sql(ty, out),
        Type::NUMERIC => Decimal::try_from(f)?.to_sql(ty, out),
        Type::INT2 | Type::INT4 | Type::INT8 if f.fract() == 0.0 => encode_int(f as i64, ty, out),
        Type::TEXT | Type::VARCHAR | Type::BPCHAR => f.to_string().to_sql(ty, out),
        Type::JSON | Type::JSONB => serde_json::json!(f).to_sql(ty, out),
        _ => f.to_sql(ty, out),
    }
}

fn encode_text(s: &str, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxedError> {
    match *ty {
        Type::UUID => Uuid::parse_str(s)?.to_sql(ty, out),
        Type::JSON | Type::JSONB => serde_json::from_str::<serde_json::Value>(s)
            .unwrap_or_else(|_| serde_json::Value::String(s.to_string()))
            .to_sql(ty, out),
        Type::NUMERIC => s.parse::<Decimal>()?.to_sql(ty, out),
        Type::INT2 | Type::INT4 | Type::INT8 => encode_int(s.trim().parse::<i64>()?, ty, out),
        Type::FLOAT4 | Type::FLOAT8 => encode_float(s.trim().parse::<f64>()?, ty, out),
        Type::TIMESTAMPTZ => DateTime::parse_from_rfc3339(s)?
            .with_timezone(&Utc)
            .to_sql(ty, out),
        Type::TIMESTAMP => NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")?.to_sql(ty, out),
        Type::DATE => NaiveDate::parse_from_str(s, "%Y-%m-%d")?.to_sql(ty, out),
        _ => s.to_sql(ty, out),
    }
}
