//! # recorm
//!
//! A fluent SQL query builder with an active-record layer on top.
//!
//! ## Features
//!
//! - **Adapter-agnostic**: builders compile to SQL text plus ordered bindings;
//!   any [`Adapter`] executes them (Postgres ships behind the `postgres` feature)
//! - **Fixed clause order**: `having` before `where` in the chain still
//!   compiles to `WHERE ... HAVING ...` with bindings in placeholder order
//! - **Models**: dirty tracking, casts, visibility, timestamps, soft deletes
//! - **Record builder**: hydration, pagination, chunking, eager loading
//! - **Collections**: key-indexed, grouping, stable sorting, aggregates
//!
//! ## Query builder
//!
//! ```ignore
//! use recorm::prelude::*;
//!
//! let conn = DatabaseConfig::from_env()?.connect().await?;
//!
//! let rows = conn
//!     .table("users")
//!     .select(&["id", "name"])
//!     .where_eq("active", true)
//!     .where_in("role", ["admin", "owner"])
//!     .order_by_desc("created_at")
//!     .limit(10)
//!     .get()
//!     .await?;
//!
//! let total = conn.table("orders").where_("amount", ">", 100).count().await?;
//!
//! conn.table("users")
//!     .where_eq("id", 7)
//!     .update([("seen_at", raw("NOW()"))])
//!     .await?;
//! ```
//!
//! ## Models
//!
//! ```ignore
//! #[derive(Debug, Clone, Model)]
//! #[orm(table = "posts", timestamps)]
//! struct Post {
//!     record: Record,
//! }
//!
//! let page = Post::query(&conn).latest("created_at").paginate(20, 1).await?;
//! println!("{} of {}", page.data.len(), page.total);
//! ```

extern crate self as recorm;

pub mod adapter;
pub mod collection;
pub mod config;
pub mod connection;
pub mod eager;
pub mod error;
pub mod model;
pub mod paginator;
pub mod prelude;
pub mod query;
pub mod raw;
pub mod value;

#[cfg(feature = "postgres")]
pub mod postgres;

#[cfg(test)]
pub(crate) mod testing;

pub use adapter::{Adapter, ColumnInfo, Dialect, PlaceholderStyle, QueryOutput, TableInfo};
pub use collection::Collection;
pub use config::DatabaseConfig;
pub use connection::{Connection, DatabaseManager};
pub use eager::{Relation, RelationKind, RelationLoader};
pub use error::{BoxError, OrmError, OrmResult};
pub use model::{Cast, Model, Record, RecordBuilder, Related, Relations};
pub use paginator::Paginator;
pub use query::{
    Aggregate, CompiledQuery, Direction, Grammar, QueryBuilder, QueryClauses, WhereGroup,
};
pub use raw::{Operand, Raw, raw};
pub use value::{Attributes, Row, Value};

#[cfg(feature = "pool")]
pub use config::create_pool;

#[cfg(feature = "postgres")]
pub use postgres::PgAdapter;

#[cfg(feature = "derive")]
pub use recorm_derive::Model;

// Re-exported for adapters built outside this crate.
pub use async_trait::async_trait;

#[cfg(feature = "postgres")]
pub use tokio_postgres;
