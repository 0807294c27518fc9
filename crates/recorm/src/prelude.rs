//! Common imports:
//!
//! ```ignore
//! use recorm::prelude::*;
//! ```

pub use crate::{
    Attributes, Cast, Collection, Connection, DatabaseConfig, Direction, Model, OrmError,
    OrmResult, Paginator, QueryBuilder, QueryClauses, Record, RecordBuilder, Relation, Relations,
    Value, attrs, raw,
};

#[cfg(feature = "postgres")]
pub use crate::PgAdapter;
