//! Query builder specialised to a model type.

use crate::collection::Collection;
use crate::connection::Connection;
use crate::eager::RelationLoader;
use crate::error::{OrmError, OrmResult};
use crate::model::{Model, Record};
use crate::paginator::Paginator;
use crate::query::{
    Boolean, CompiledQuery, Direction, QueryBuilder, QueryClauses, QueryState, WhereClause,
};
use crate::raw::Operand;
use crate::value::{Attributes, Row, Value};
use chrono::Utc;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TrashedScope {
    Exclude,
    Include,
    Only,
}

/// A [`QueryBuilder`] bound to `M::TABLE` that returns hydrated models.
///
/// Every clause method of [`QueryClauses`] is available. Soft-delete scoping
/// is applied when the builder executes, so `with_trashed` may be called at
/// any point in the chain.
pub struct RecordBuilder<M: Model> {
    query: QueryBuilder,
    eager: Vec<String>,
    loaders: HashMap<String, Arc<dyn RelationLoader>>,
    trashed: TrashedScope,
    _model: PhantomData<fn() -> M>,
}

impl<M: Model> Clone for RecordBuilder<M> {
    fn clone(&self) -> Self {
        Self {
            query: self.query.clone(),
            eager: self.eager.clone(),
            loaders: self.loaders.clone(),
            trashed: self.trashed,
            _model: PhantomData,
        }
    }
}

impl<M: Model> fmt::Debug for RecordBuilder<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut loaders: Vec<&str> = self.loaders.keys().map(String::as_str).collect();
        loaders.sort_unstable();
        f.debug_struct("RecordBuilder")
            .field("model", &M::TABLE)
            .field("query", &self.query)
            .field("eager", &self.eager)
            .field("loaders", &loaders)
            .field("trashed", &self.trashed)
            .finish()
    }
}

impl<M: Model> QueryClauses for RecordBuilder<M> {
    fn state(&self) -> &QueryState {
        self.query.state()
    }

    fn state_mut(&mut self) -> &mut QueryState {
        self.query.state_mut()
    }
}

impl<M: Model> RecordBuilder<M> {
    pub fn new(connection: Connection) -> Self {
        Self {
            query: QueryBuilder::table(connection, M::TABLE),
            eager: Vec::new(),
            loaders: HashMap::new(),
            trashed: TrashedScope::Exclude,
            _model: PhantomData,
        }
    }

    pub fn connection(&self) -> &Connection {
        self.query.connection()
    }

    /// The underlying builder, without soft-delete scoping.
    pub fn query(&self) -> &QueryBuilder {
        &self.query
    }

    /// The builder that will actually run, scoping applied.
    pub fn to_query(&self) -> QueryBuilder {
        self.scoped(self.trashed)
    }

    pub fn to_compiled(&self) -> OrmResult<CompiledQuery> {
        self.to_query().to_compiled()
    }

    pub fn to_sql(&self) -> OrmResult<String> {
        self.to_query().to_sql()
    }

    /// Relation names registered with [`RecordBuilder::with`].
    pub fn eager_loads(&self) -> &[String] {
        &self.eager
    }

    // ==================== Scoping ====================

    /// Include soft-deleted rows.
    pub fn with_trashed(mut self) -> Self {
        self.trashed = TrashedScope::Include;
        self
    }

    /// Only soft-deleted rows.
    pub fn only_trashed(mut self) -> Self {
        self.trashed = TrashedScope::Only;
        self
    }

    fn scoped(&self, scope: TrashedScope) -> QueryBuilder {
        let mut query = self.query.clone();
        if !M::SOFT_DELETES || scope == TrashedScope::Include {
            return query;
        }
        let column = self.qualify(M::DELETED_AT);
        isolate_wheres(query.state_mut());
        query.state_mut().wheres.push(WhereClause::Null {
            column,
            negated: scope == TrashedScope::Only,
            boolean: Boolean::And,
        });
        query
    }

    /// Prefix `column` with the table once joins make it ambiguous.
    fn qualify(&self, column: &str) -> String {
        if self.query.state().joins.is_empty() {
            column.to_string()
        } else {
            format!("{}.{}", M::TABLE, column)
        }
    }

    // ==================== Eager loading ====================

    /// Load `relations` after hydration. Each name must be declared by
    /// [`Model::relations`] or registered with [`RecordBuilder::with_loader`].
    pub fn with(mut self, relations: &[&str]) -> Self {
        for name in relations {
            if !self.eager.iter().any(|n| n == name) {
                self.eager.push(name.to_string());
            }
        }
        self
    }

    /// Register a loader for `name`, overriding the model's declaration.
    pub fn with_loader(mut self, name: &str, loader: impl RelationLoader + 'static) -> Self {
        self.loaders.insert(name.to_string(), Arc::new(loader));
        self
    }

    fn resolve_loader(&self, name: &str) -> OrmResult<Arc<dyn RelationLoader>> {
        if let Some(loader) = self.loaders.get(name) {
            return Ok(Arc::clone(loader));
        }
        M::relations()
            .into_iter()
            .find(|(declared, _)| *declared == name)
            .map(|(_, loader)| loader)
            .ok_or_else(|| {
                OrmError::configuration(format!(
                    "relation '{name}' is not defined on model {}",
                    M::TABLE
                ))
            })
    }

    async fn load_relations(&self, records: &mut [Record]) -> OrmResult<()> {
        if records.is_empty() {
            return Ok(());
        }
        for name in &self.eager {
            let loader = self.resolve_loader(name)?;
            tracing::trace!(target: "recorm", model = M::TABLE, relation = %name, parents = records.len(), "eager loading");
            loader.load(self.connection(), name, records).await?;
        }
        Ok(())
    }

    /// Turn rows into models, then run the registered relation loaders.
    pub async fn hydrate(&self, rows: Vec<Row>) -> OrmResult<Collection<M>> {
        let mut records: Vec<Record> = rows
            .into_iter()
            .map(|row| M::blank_record().hydrate(row))
            .collect();
        self.load_relations(&mut records).await?;
        Ok(records.into_iter().map(M::from_record).collect())
    }

    // ==================== Retrieval ====================

    pub async fn get(&self) -> OrmResult<Collection<M>> {
        let rows = self.to_query().get().await?;
        self.hydrate(rows).await
    }

    pub async fn first(&self) -> OrmResult<Option<M>> {
        let models = self.clone().limit(1).get().await?;
        Ok(models.into_iter().next())
    }

    pub async fn find(&self, id: impl Into<Value>) -> OrmResult<Option<M>> {
        let key = self.qualify(M::PRIMARY_KEY);
        self.clone().where_eq(&key, id.into()).first().await
    }

    pub async fn find_many<I, V>(&self, ids: I) -> OrmResult<Collection<M>>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let key = self.qualify(M::PRIMARY_KEY);
        self.clone().where_in(&key, ids).get().await
    }

    /// Like [`RecordBuilder::find`], but a missing row is [`OrmError::NotFound`].
    pub async fn find_or_fail(&self, id: impl Into<Value>) -> OrmResult<M> {
        let id = id.into();
        self.find(id.clone()).await?.ok_or_else(|| {
            OrmError::not_found(format!(
                "{} with {} = {} not found",
                M::TABLE,
                M::PRIMARY_KEY,
                id
            ))
        })
    }

    pub async fn first_or_fail(&self) -> OrmResult<M> {
        self.first()
            .await?
            .ok_or_else(|| OrmError::not_found(format!("no {} row matches the query", M::TABLE)))
    }

    /// Make, insert and return a new model.
    pub async fn create(&self, attributes: Attributes) -> OrmResult<M> {
        let mut model = M::make(attributes);
        model.save(self.connection()).await?;
        Ok(model)
    }

    // ==================== Pagination & chunking ====================

    /// Count the matching rows, then fetch page `page` (1-based).
    ///
    /// The count and the page are two statements; rows written between them
    /// can make `total` disagree with `data`.
    pub async fn paginate(&self, per_page: u64, page: u64) -> OrmResult<Paginator<M>> {
        if per_page == 0 {
            return Err(OrmError::validation("per_page must be greater than zero"));
        }
        let page = page.max(1);
        let total = self.clone().count().await?;
        let data = self.clone().for_page(page, per_page).get().await?;
        tracing::trace!(target: "recorm", model = M::TABLE, page, per_page, total, rows = data.len(), "paginated");
        Ok(Paginator::new(data, total, per_page, page))
    }

    /// Feed `callback` pages of `size` models (by LIMIT/OFFSET) until a page
    /// comes back empty or short, or the callback returns `false`.
    ///
    /// Concurrent inserts or deletes can shift rows between pages; use
    /// [`RecordBuilder::chunk_by_id`] when that matters.
    pub async fn chunk<F, Fut>(&self, size: u64, mut callback: F) -> OrmResult<()>
    where
        F: FnMut(Collection<M>) -> Fut,
        Fut: Future<Output = OrmResult<bool>>,
    {
        if size == 0 {
            return Err(OrmError::validation("chunk size must be greater than zero"));
        }
        let mut page = 1;
        loop {
            let models = self.clone().for_page(page, size).get().await?;
            let count = models.len() as u64;
            if count == 0 {
                break;
            }
            tracing::trace!(target: "recorm", model = M::TABLE, page, rows = count, "chunk");
            if !callback(models).await? || count < size {
                break;
            }
            page += 1;
        }
        Ok(())
    }

    /// Like [`RecordBuilder::chunk`], but pages by `primary key > last seen`
    /// so rows are neither skipped nor repeated under concurrent writes.
    /// Any existing ordering is replaced by the primary key.
    pub async fn chunk_by_id<F, Fut>(&self, size: u64, mut callback: F) -> OrmResult<()>
    where
        F: FnMut(Collection<M>) -> Fut,
        Fut: Future<Output = OrmResult<bool>>,
    {
        if size == 0 {
            return Err(OrmError::validation("chunk size must be greater than zero"));
        }
        let key = self.qualify(M::PRIMARY_KEY);
        let mut last: Option<Value> = None;
        loop {
            let mut page = self
                .clone()
                .reorder()
                .order_by(&key, Direction::Asc)
                .limit(size);
            page.query.state_mut().offset = None;
            if let Some(last) = last.take() {
                isolate_wheres(page.state_mut());
                page = page.where_(&key, ">", last);
            }

            let models = page.get().await?;
            let count = models.len() as u64;
            if count == 0 {
                break;
            }
            last = match models.last().and_then(|m| m.get_key()) {
                Some(id) if !id.is_null() => Some(id.clone()),
                _ => {
                    return Err(OrmError::validation(format!(
                        "chunk_by_id needs '{}' in the selected columns",
                        M::PRIMARY_KEY
                    )));
                }
            };
            tracing::trace!(target: "recorm", model = M::TABLE, rows = count, "chunk by id");
            if !callback(models).await? || count < size {
                break;
            }
        }
        Ok(())
    }

    // ==================== Delegated reads ====================

    pub async fn count(&self) -> OrmResult<u64> {
        self.to_query().count().await
    }

    pub async fn sum(&self, column: &str) -> OrmResult<f64> {
        self.to_query().sum(column).await
    }

    pub async fn avg(&self, column: &str) -> OrmResult<Option<f64>> {
        self.to_query().avg(column).await
    }

    pub async fn min(&self, column: &str) -> OrmResult<Option<Value>> {
        self.to_query().min(column).await
    }

    pub async fn max(&self, column: &str) -> OrmResult<Option<Value>> {
        self.to_query().max(column).await
    }

    pub async fn pluck(&self, column: &str) -> OrmResult<Vec<Value>> {
        self.to_query().pluck(column).await
    }

    pub async fn value(&self, column: &str) -> OrmResult<Option<Value>> {
        self.to_query().value(column).await
    }

    pub async fn exists(&self) -> OrmResult<bool> {
        self.to_query().exists().await
    }

    pub async fn doesnt_exist(&self) -> OrmResult<bool> {
        self.to_query().doesnt_exist().await
    }

    // ==================== Delegated writes ====================

    /// Update every matching row. Touches `updated_at` for timestamped models.
    pub async fn update<I, K, V>(&self, values: I) -> OrmResult<u64>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Operand>,
    {
        let mut assignments: Vec<(String, Operand)> = values
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        if M::TIMESTAMPS && !assignments.iter().any(|(k, _)| k == M::UPDATED_AT) {
            assignments.push((M::UPDATED_AT.to_string(), Value::Timestamp(Utc::now()).into()));
        }
        self.to_query().update(assignments).await
    }

    pub async fn increment(&self, column: &str, amount: impl Into<Value>) -> OrmResult<u64> {
        self.to_query().increment(column, amount).await
    }

    pub async fn decrement(&self, column: &str, amount: impl Into<Value>) -> OrmResult<u64> {
        self.to_query().decrement(column, amount).await
    }

    /// Delete matching rows; soft-deleting models get `deleted_at` set instead.
    pub async fn delete(&self) -> OrmResult<u64> {
        if M::SOFT_DELETES {
            self.update([(M::DELETED_AT, Value::Timestamp(Utc::now()))])
                .await
        } else {
            self.to_query().delete().await
        }
    }

    /// Remove matching rows even for soft-deleting models.
    pub async fn force_delete(&self) -> OrmResult<u64> {
        self.to_query().delete().await
    }

    /// Clear `deleted_at` on matching trashed rows.
    pub async fn restore(&self) -> OrmResult<u64> {
        if !M::SOFT_DELETES {
            return Ok(0);
        }
        let query = self.scoped(TrashedScope::Only);
        let mut assignments = vec![(M::DELETED_AT.to_string(), Operand::Value(Value::Null))];
        if M::TIMESTAMPS {
            assignments.push((M::UPDATED_AT.to_string(), Value::Timestamp(Utc::now()).into()));
        }
        query.update(assignments).await
    }
}

/// Wrap existing wheres in one group when any of them is OR-joined or a raw
/// fragment (which may carry its own OR), so an appended AND clause applies
/// to the whole predicate.
fn isolate_wheres(state: &mut QueryState) {
    let needs_group = state
        .wheres
        .iter()
        .any(|w| w.boolean() == Boolean::Or || matches!(w, WhereClause::Raw { .. }));
    if needs_group {
        let clauses = std::mem::take(&mut state.wheres);
        state.wheres.push(WhereClause::Nested {
            clauses,
            boolean: Boolean::And,
        });
    }
}
