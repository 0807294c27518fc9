//! Eager loading of relations.
//!
//! A [`RelationLoader`] runs after hydration with every parent record of the
//! page and attaches related records under the relation name. The built-in
//! [`Relation`] descriptors issue exactly one extra `WHERE key IN (...)`
//! query per relation, regardless of how many parents were loaded.
//!
//! ```ignore
//! impl Model for User {
//!     const TABLE: &'static str = "users";
//!
//!     fn relations() -> Relations {
//!         vec![
//!             ("posts", Relation::has_many::<Post>("user_id").into_loader()),
//!             ("team", Relation::belongs_to::<Team>("team_id").into_loader()),
//!         ]
//!     }
//!     // ...
//! }
//!
//! let users = User::query(&conn).with(&["posts"]).get().await?;
//! ```

use crate::connection::Connection;
use crate::error::OrmResult;
use crate::model::{Model, Record, Related};
use crate::query::{QueryBuilder, QueryClauses};
use crate::value::{Row, Value};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// Loads one named relation for a batch of parents.
#[async_trait]
pub trait RelationLoader: Send + Sync {
    /// Attach related records to `parents` under `name`.
    async fn load(&self, conn: &Connection, name: &str, parents: &mut [Record]) -> OrmResult<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    /// Related rows carry a foreign key pointing at the parent.
    HasMany,
    /// As `HasMany`, attaching at most one record.
    HasOne,
    /// The parent carries a foreign key pointing at the related row.
    BelongsTo,
}

/// Key-based relation between a parent model and `related_table`.
#[derive(Debug, Clone)]
pub struct Relation {
    kind: RelationKind,
    related_table: &'static str,
    related_primary_key: &'static str,
    hidden: &'static [&'static str],
    visible: &'static [&'static str],
    soft_deletes: Option<&'static str>,
    /// Column on the related table matched against `local_key`.
    foreign_key: String,
    /// Attribute on the parent supplying the match values; the parent's
    /// primary key when unset.
    local_key: Option<String>,
}

impl Relation {
    fn to<R: Model>(kind: RelationKind, foreign_key: String, local_key: Option<String>) -> Self {
        Self {
            kind,
            related_table: R::TABLE,
            related_primary_key: R::PRIMARY_KEY,
            hidden: R::hidden(),
            visible: R::visible(),
            soft_deletes: R::SOFT_DELETES.then_some(R::DELETED_AT),
            foreign_key,
            local_key,
        }
    }

    /// `R.foreign_key = parent.<primary key>`, many per parent.
    pub fn has_many<R: Model>(foreign_key: &str) -> Self {
        Self::to::<R>(RelationKind::HasMany, foreign_key.into(), None)
    }

    /// `R.foreign_key = parent.local_key`, many per parent.
    pub fn has_many_by<R: Model>(foreign_key: &str, local_key: &str) -> Self {
        Self::to::<R>(RelationKind::HasMany, foreign_key.into(), Some(local_key.into()))
    }

    /// `R.foreign_key = parent.<primary key>`, at most one per parent.
    pub fn has_one<R: Model>(foreign_key: &str) -> Self {
        Self::to::<R>(RelationKind::HasOne, foreign_key.into(), None)
    }

    pub fn has_one_by<R: Model>(foreign_key: &str, local_key: &str) -> Self {
        Self::to::<R>(RelationKind::HasOne, foreign_key.into(), Some(local_key.into()))
    }

    /// `R.primary_key = parent.foreign_key`.
    pub fn belongs_to<R: Model>(foreign_key: &str) -> Self {
        Self::to::<R>(RelationKind::BelongsTo, R::PRIMARY_KEY.into(), Some(foreign_key.into()))
    }

    pub fn kind(&self) -> RelationKind {
        self.kind
    }

    pub fn related_table(&self) -> &str {
        self.related_table
    }

    pub fn into_loader(self) -> Arc<dyn RelationLoader> {
        Arc::new(self)
    }

    /// The single query that fetches every related row for `keys`.
    pub fn query(&self, conn: &Connection, keys: Vec<Value>) -> QueryBuilder {
        let mut query = conn
            .table(self.related_table)
            .where_in(&self.foreign_key, keys);
        if let Some(deleted_at) = self.soft_deletes {
            query = query.where_null(deleted_at);
        }
        query
    }

    fn local_value<'a>(&self, parent: &'a Record) -> Option<&'a Value> {
        let key = self.local_key.as_deref().unwrap_or(parent.primary_key());
        parent.get(key).filter(|k| !k.is_null())
    }

    fn related_record(&self, row: Row) -> Record {
        Record::new(self.related_table, self.related_primary_key)
            .with_visibility(self.hidden, self.visible)
            .hydrate(row)
    }
}

#[async_trait]
impl RelationLoader for Relation {
    async fn load(&self, conn: &Connection, name: &str, parents: &mut [Record]) -> OrmResult<()> {
        let mut keys: Vec<Value> = Vec::new();
        for parent in parents.iter() {
            if let Some(key) = self.local_value(parent) {
                if !keys.contains(key) {
                    keys.push(key.clone());
                }
            }
        }

        let mut by_key: HashMap<String, Vec<Record>> = HashMap::new();
        if !keys.is_empty() {
            let rows = self.query(conn, keys).get().await?;
            for row in rows {
                let Some(fk) = row.get(&self.foreign_key).filter(|k| !k.is_null()) else {
                    continue;
                };
                let group = fk.to_string();
                by_key
                    .entry(group)
                    .or_default()
                    .push(self.related_record(row));
            }
        }

        for parent in parents.iter_mut() {
            let group = self
                .local_value(parent)
                .and_then(|k| by_key.get(&k.to_string()));
            let related = match self.kind {
                RelationKind::HasMany => Related::Many(group.cloned().unwrap_or_default()),
                RelationKind::HasOne | RelationKind::BelongsTo => {
                    Related::One(group.and_then(|records| records.first().cloned()))
                }
            };
            parent.set_relation(name, related);
        }
        Ok(())
    }
}
