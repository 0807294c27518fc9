//! Active-record models.
//!
//! A model is any type that owns a [`Record`] and implements [`Model`],
//! usually through `#[derive(Model)]`:
//!
//! ```ignore
//! use recorm::prelude::*;
//!
//! #[derive(Debug, Clone, Model)]
//! #[orm(table = "users", timestamps, soft_deletes, hidden("password"))]
//! struct User {
//!     record: Record,
//! }
//!
//! let mut user = User::make(attrs! { "name" => "ada", "password" => "secret" });
//! user.save(&conn).await?;
//! assert!(user.exists());
//!
//! let active = User::query(&conn).where_eq("active", true).get().await?;
//! ```

mod builder;
mod cast;
mod persist;
mod record;


pub use builder::RecordBuilder;
pub use cast::Cast;
pub use record::{Record, Related};

use crate::connection::Connection;
use crate::eager::RelationLoader;
use crate::error::OrmResult;
use crate::value::{Attributes, Row, Value};
use std::future::Future;
use std::sync::Arc;

/// Relation loaders declared by a model, keyed by relation name.
pub type Relations = Vec<(&'static str, Arc<dyn RelationLoader>)>;

/// Binds a Rust type to a table.
///
/// Only the table name and the three record accessors are required. Every
/// attribute read through [`Model::get`] and written through [`Model::set`]
/// passes through the model's [`Model::casts`].
pub trait Model: Sized + Send + Sync + 'static {
    const TABLE: &'static str;
    const PRIMARY_KEY: &'static str = "id";
    /// Maintain `created_at` / `updated_at` on save.
    const TIMESTAMPS: bool = false;
    /// Deleting sets `deleted_at` instead of removing the row, and queries
    /// exclude rows where it is set.
    const SOFT_DELETES: bool = false;
    const CREATED_AT: &'static str = "created_at";
    const UPDATED_AT: &'static str = "updated_at";
    const DELETED_AT: &'static str = "deleted_at";

    /// Attributes left out of [`Model::to_object`].
    fn hidden() -> &'static [&'static str] {
        &[]
    }

    /// When non-empty, the only attributes [`Model::to_object`] emits.
    fn visible() -> &'static [&'static str] {
        &[]
    }

    fn casts() -> &'static [(&'static str, Cast)] {
        &[]
    }

    /// Relations available to [`RecordBuilder::with`].
    fn relations() -> Relations {
        Vec::new()
    }

    fn from_record(record: Record) -> Self;

    fn record(&self) -> &Record;

    fn record_mut(&mut self) -> &mut Record;

    // ==================== Construction ====================

    /// An empty record configured for this model.
    fn blank_record() -> Record {
        Record::new(Self::TABLE, Self::PRIMARY_KEY).with_visibility(Self::hidden(), Self::visible())
    }

    /// A new, non-persisted instance.
    fn new() -> Self {
        Self::from_record(Self::blank_record())
    }

    /// A new, non-persisted instance filled with `attributes`.
    fn make(attributes: Attributes) -> Self {
        let mut model = Self::new();
        model.fill(attributes);
        model
    }

    /// An existing instance loaded from `row`, with no pending changes.
    fn hydrate(row: Row) -> Self {
        Self::from_record(Self::blank_record().hydrate(row))
    }

    // ==================== Attributes ====================

    /// Attribute value with its cast applied.
    fn get(&self, key: &str) -> Option<Value> {
        let value = self.record().get(key)?.clone();
        Some(match cast_for::<Self>(key) {
            Some(cast) => cast.apply(value),
            None => value,
        })
    }

    /// Assign an attribute, applying its cast.
    fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        let key = key.into();
        let value = value.into();
        let value = match cast_for::<Self>(&key) {
            Some(cast) => cast.apply(value),
            None => value,
        };
        self.record_mut().set(key, value);
        self
    }

    fn fill(&mut self, attributes: Attributes) -> &mut Self {
        for (key, value) in attributes {
            self.set(key, value);
        }
        self
    }

    fn get_key(&self) -> Option<&Value> {
        self.record().get_key()
    }

    fn exists(&self) -> bool {
        self.record().exists()
    }

    fn is_dirty(&self) -> bool {
        self.record().is_dirty()
    }

    fn get_dirty(&self) -> Attributes {
        self.record().get_dirty()
    }

    /// Whether a soft-deleted model has been trashed.
    fn trashed(&self) -> bool {
        Self::SOFT_DELETES
            && self
                .record()
                .get(Self::DELETED_AT)
                .is_some_and(|v| !v.is_null())
    }

    /// Visible attributes, casts applied, plus loaded relations.
    fn to_object(&self) -> Attributes {
        let mut object = self.record().to_object();
        for (column, cast) in Self::casts() {
            if let Some(value) = object.get_mut(*column) {
                *value = cast.apply(std::mem::take(value));
            }
        }
        object
    }

    fn to_json(&self) -> serde_json::Value {
        Value::Object(self.to_object()).into()
    }

    // ==================== Persistence ====================

    fn query(conn: &Connection) -> RecordBuilder<Self> {
        RecordBuilder::new(conn.clone())
    }

    /// Insert a new model or update the dirty attributes of an existing one.
    fn save(&mut self, conn: &Connection) -> impl Future<Output = OrmResult<()>> + Send {
        persist::save(self, conn)
    }

    /// Delete the model (soft delete when enabled). Returns whether a row
    /// was affected.
    fn delete(&mut self, conn: &Connection) -> impl Future<Output = OrmResult<bool>> + Send {
        persist::delete(self, conn)
    }

    /// Remove the row even for soft-deleting models.
    fn force_delete(&mut self, conn: &Connection) -> impl Future<Output = OrmResult<bool>> + Send {
        persist::force_delete(self, conn)
    }

    /// Clear `deleted_at` on a soft-deleted model.
    fn restore(&mut self, conn: &Connection) -> impl Future<Output = OrmResult<bool>> + Send {
        persist::restore(self, conn)
    }

    /// Reload attributes from the database.
    fn refresh(&mut self, conn: &Connection) -> impl Future<Output = OrmResult<()>> + Send {
        persist::refresh(self, conn)
    }
}

fn cast_for<M: Model>(key: &str) -> Option<Cast> {
    M::casts()
        .iter()
        .find(|(name, _)| *name == key)
        .map(|(_, cast)| *cast)
}
