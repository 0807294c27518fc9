use crate::connection::Connection;
use crate::error::{OrmError, OrmResult};
use crate::model::Model;
use crate::query::{QueryBuilder, QueryClauses};
use crate::value::Value;
use chrono::Utc;

pub(super) async fn save<M: Model>(model: &mut M, conn: &Connection) -> OrmResult<()> {
    if model.exists() {
        update(model, conn).await
    } else {
        insert(model, conn).await
    }
}

async fn insert<M: Model>(model: &mut M, conn: &Connection) -> OrmResult<()> {
    if M::TIMESTAMPS {
        let now = Value::Timestamp(Utc::now());
        let record = model.record_mut();
        if record.get(M::CREATED_AT).is_none_or(Value::is_null) {
            record.set(M::CREATED_AT, now.clone());
        }
        if record.get(M::UPDATED_AT).is_none_or(Value::is_null) {
            record.set(M::UPDATED_AT, now);
        }
    }

    let qb = QueryBuilder::table(conn.clone(), M::TABLE);
    let record = model.record_mut();
    let has_key = record.get_key().is_some_and(|k| !k.is_null());

    if has_key {
        let values: Vec<(String, Value)> = record
            .attributes()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        qb.insert(values).await?;
    } else {
        let values: Vec<(String, Value)> = record
            .attributes()
            .iter()
            .filter(|(k, _)| k.as_str() != M::PRIMARY_KEY)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        if let Some(id) = qb.insert_get_id_with(values, M::PRIMARY_KEY).await? {
            record.set(M::PRIMARY_KEY, id);
        }
    }

    record.set_exists(true);
    record.sync_original();
    tracing::trace!(target: "recorm", table = M::TABLE, "model inserted");
    Ok(())
}

async fn update<M: Model>(model: &mut M, conn: &Connection) -> OrmResult<()> {
    if !model.is_dirty() {
        return Ok(());
    }
    if M::TIMESTAMPS && !model.record().is_dirty_key(M::UPDATED_AT) {
        model.record_mut().set(M::UPDATED_AT, Value::Timestamp(Utc::now()));
    }

    let key = key_of(model)?;
    let dirty = model.get_dirty();
    QueryBuilder::table(conn.clone(), M::TABLE)
        .where_eq(M::PRIMARY_KEY, key)
        .update(dirty)
        .await?;

    model.record_mut().sync_original();
    Ok(())
}

pub(super) async fn delete<M: Model>(model: &mut M, conn: &Connection) -> OrmResult<bool> {
    if !model.exists() {
        return Ok(false);
    }
    if !M::SOFT_DELETES {
        return force_delete(model, conn).await;
    }

    let key = key_of(model)?;
    let now = Value::Timestamp(Utc::now());
    let mut values = vec![(M::DELETED_AT, now.clone())];
    if M::TIMESTAMPS {
        values.push((M::UPDATED_AT, now));
    }
    let affected = QueryBuilder::table(conn.clone(), M::TABLE)
        .where_eq(M::PRIMARY_KEY, key)
        .update(values.iter().cloned())
        .await?;

    let record = model.record_mut();
    for (column, value) in values {
        record.set(column, value);
    }
    record.sync_original();
    Ok(affected > 0)
}

pub(super) async fn force_delete<M: Model>(model: &mut M, conn: &Connection) -> OrmResult<bool> {
    if !model.exists() {
        return Ok(false);
    }
    let key = key_of(model)?;
    let affected = QueryBuilder::table(conn.clone(), M::TABLE)
        .where_eq(M::PRIMARY_KEY, key)
        .delete()
        .await?;
    model.record_mut().set_exists(false);
    Ok(affected > 0)
}

pub(super) async fn restore<M: Model>(model: &mut M, conn: &Connection) -> OrmResult<bool> {
    if !M::SOFT_DELETES || !model.exists() {
        return Ok(false);
    }
    model.record_mut().set(M::DELETED_AT, Value::Null);
    save(model, conn).await?;
    Ok(true)
}

pub(super) async fn refresh<M: Model>(model: &mut M, conn: &Connection) -> OrmResult<()> {
    let key = key_of(model)?;
    let row = QueryBuilder::table(conn.clone(), M::TABLE)
        .where_eq(M::PRIMARY_KEY, key.clone())
        .first()
        .await?
        .ok_or_else(|| {
            OrmError::not_found(format!(
                "{} with {} = {} no longer exists",
                M::TABLE,
                M::PRIMARY_KEY,
                key
            ))
        })?;
    model.record_mut().replace_attributes(row);
    Ok(())
}

fn key_of<M: Model>(model: &M) -> OrmResult<Value> {
    match model.get_key() {
        Some(key) if !key.is_null() => Ok(key.clone()),
        _ => Err(OrmError::validation(format!(
            "{} model has no value for primary key '{}'",
            M::TABLE,
            M::PRIMARY_KEY
        ))),
    }
}
