use crate::adapter::{Dialect, QueryOutput};
use crate::query::{Aggregate, Direction, Grammar, QueryClauses};
use crate::raw::raw;
use crate::testing::{fake, fake_with_rows, numbered_rows};
use crate::value::Value;
use crate::{OrmError, attrs};

fn placeholders(sql: &str) -> usize {
    sql.matches('$').count()
}

#[test]
fn test_select_basic() {
    let (conn, _) = fake(Dialect::Postgres);
    assert_eq!(conn.table("users").to_sql().unwrap(), "SELECT * FROM users");
}

#[test]
fn test_clause_order_is_fixed() {
    let (conn, _) = fake(Dialect::Postgres);
    let qb = conn
        .table("orders")
        .limit(5)
        .having("SUM(amount)", ">", 100)
        .select(&["user_id"])
        .where_eq("status", "paid")
        .order_by_desc("user_id")
        .group_by(&["user_id"])
        .offset(10);

    let compiled = qb.to_compiled().unwrap();
    assert_eq!(
        compiled.sql,
        "SELECT user_id FROM orders WHERE status = $1 GROUP BY user_id \
         HAVING SUM(amount) > $2 ORDER BY user_id DESC LIMIT 5 OFFSET 10"
    );
    assert_eq!(compiled.bindings, vec![Value::from("paid"), Value::Int(100)]);
}

#[test]
fn test_bindings_follow_emission_order() {
    let (conn, _) = fake(Dialect::Postgres);
    let qb = conn
        .table("users")
        .order_by_raw("FIELD(users.id, ?, ?)", vec![3.into(), 1.into()])
        .where_eq("users.active", true)
        .join_where("teams", "teams.kind", "=", "pro")
        .select_raw("COALESCE(nick, ?) AS nick", vec!["anon".into()]);

    let compiled = qb.to_compiled().unwrap();
    assert_eq!(
        compiled.sql,
        "SELECT COALESCE(nick, $1) AS nick FROM users INNER JOIN teams ON teams.kind = $2 \
         WHERE users.active = $3 ORDER BY FIELD(users.id, $4, $5)"
    );
    assert_eq!(
        compiled.bindings,
        vec![
            Value::from("anon"),
            Value::from("pro"),
            Value::Bool(true),
            Value::Int(3),
            Value::Int(1),
        ]
    );
    assert_eq!(placeholders(&compiled.sql), compiled.bindings.len());
}

#[test]
fn test_question_placeholders() {
    let (conn, _) = fake(Dialect::Generic);
    let qb = conn
        .table("users")
        .where_("age", ">=", 18)
        .or_where_eq("role", "admin")
        .where_between("score", 1, 10);

    let compiled = qb.to_compiled().unwrap();
    assert_eq!(
        compiled.sql,
        "SELECT * FROM users WHERE age >= ? OR role = ? AND score BETWEEN ? AND ?"
    );
    assert_eq!(compiled.sql.matches('?').count(), compiled.bindings.len());
}

#[test]
fn test_raw_markers_are_renumbered_outside_quotes() {
    let (conn, _) = fake(Dialect::Postgres);
    let qb = conn
        .table("users")
        .where_eq("a", 1)
        .where_raw("name <> '?' AND age > ?", vec![21.into()]);

    assert_eq!(
        qb.to_sql().unwrap(),
        "SELECT * FROM users WHERE a = $1 AND name <> '?' AND age > $2"
    );
}

#[test]
fn test_raw_binding_count_mismatch_is_validation_error() {
    let (conn, _) = fake(Dialect::Postgres);
    let err = conn
        .table("users")
        .where_raw("a = ?", vec![1.into(), 2.into()])
        .to_sql()
        .unwrap_err();
    assert!(matches!(err, OrmError::Validation(_)));
}

#[test]
fn test_empty_where_in_matches_nothing() {
    let (conn, _) = fake(Dialect::Postgres);
    let compiled = conn
        .table("users")
        .where_in("id", Vec::<i64>::new())
        .to_compiled()
        .unwrap();
    assert_eq!(compiled.sql, "SELECT * FROM users WHERE 0 = 1");
    assert!(compiled.bindings.is_empty());

    let sql = conn
        .table("users")
        .where_not_in("id", Vec::<i64>::new())
        .to_sql()
        .unwrap();
    assert_eq!(sql, "SELECT * FROM users WHERE 1 = 1");
}

#[test]
fn test_where_in_binds_each_value() {
    let (conn, _) = fake(Dialect::Postgres);
    let compiled = conn
        .table("users")
        .where_in("id", [1, 2, 3])
        .or_where_not_in("role", ["guest"])
        .to_compiled()
        .unwrap();
    assert_eq!(
        compiled.sql,
        "SELECT * FROM users WHERE id IN ($1, $2, $3) OR role NOT IN ($4)"
    );
    assert_eq!(compiled.bindings.len(), 4);
}

#[test]
fn test_null_comparisons_compile_to_is_null() {
    let (conn, _) = fake(Dialect::Postgres);
    let compiled = conn
        .table("users")
        .where_("deleted_at", "=", Value::Null)
        .where_("banned_at", "!=", Value::Null)
        .where_eq("nick", None::<String>)
        .where_not_null("email")
        .to_compiled()
        .unwrap();
    assert_eq!(
        compiled.sql,
        "SELECT * FROM users WHERE deleted_at IS NULL AND banned_at IS NOT NULL \
         AND nick IS NULL AND email IS NOT NULL"
    );
    assert!(compiled.bindings.is_empty());
}

#[test]
fn test_nested_groups() {
    let (conn, _) = fake(Dialect::Postgres);
    let qb = conn
        .table("users")
        .where_eq("active", true)
        .where_nested(|q| q.where_eq("role", "admin").or_where_eq("role", "owner"))
        .where_nested(|q| q);

    assert_eq!(
        qb.to_sql().unwrap(),
        "SELECT * FROM users WHERE active = $1 AND (role = $2 OR role = $3)"
    );

    let only_empty = conn.table("users").where_nested(|q| q);
    assert_eq!(only_empty.to_sql().unwrap(), "SELECT * FROM users");
}

#[test]
fn test_joins() {
    let (conn, _) = fake(Dialect::Postgres);
    let sql = conn
        .table("users")
        .select(&["users.id", "posts.title"])
        .join("posts", "posts.user_id", "=", "users.id")
        .left_join("teams", "teams.id", "=", "users.team_id")
        .cross_join("regions")
        .where_column("posts.created_at", ">", "users.created_at")
        .to_sql()
        .unwrap();
    assert_eq!(
        sql,
        "SELECT users.id, posts.title FROM users \
         INNER JOIN posts ON posts.user_id = users.id \
         LEFT JOIN teams ON teams.id = users.team_id \
         CROSS JOIN regions \
         WHERE posts.created_at > users.created_at"
    );
}

#[test]
fn test_missing_table_is_configuration_error() {
    let (conn, _) = fake(Dialect::Postgres);
    let err = conn.query().where_eq("a", 1).to_sql().unwrap_err();
    assert!(err.is_configuration());
}

#[test]
fn test_invalid_operator_surfaces_at_compile() {
    let (conn, _) = fake(Dialect::Postgres);
    let qb = conn.table("users").where_("a", "=~", 1);
    assert!(matches!(qb.to_sql(), Err(OrmError::Validation(_))));

    let nested = conn
        .table("users")
        .where_nested(|q| q.where_("a", "===", 1));
    assert!(matches!(nested.to_sql(), Err(OrmError::Validation(_))));
}

#[test]
fn test_clone_is_independent() {
    let (conn, _) = fake(Dialect::Postgres);
    let base = conn.table("users").where_eq("a", 1);
    let derived = base.clone().where_eq("b", 2).limit(3);
    let base = base.where_eq("c", 3);

    assert_eq!(
        base.to_sql().unwrap(),
        "SELECT * FROM users WHERE a = $1 AND c = $2"
    );
    assert_eq!(
        derived.to_sql().unwrap(),
        "SELECT * FROM users WHERE a = $1 AND b = $2 LIMIT 3"
    );
    assert_eq!(base.bindings().unwrap(), vec![Value::Int(1), Value::Int(3)]);
    assert_eq!(derived.bindings().unwrap(), vec![Value::Int(1), Value::Int(2)]);
}

#[test]
fn test_mysql_offset_without_limit() {
    let (conn, _) = fake(Dialect::MySql);
    assert_eq!(
        conn.table("t").offset(5).to_sql().unwrap(),
        "SELECT * FROM t LIMIT 18446744073709551615 OFFSET 5"
    );
}

#[test]
fn test_for_page_and_when() {
    let (conn, _) = fake(Dialect::Postgres);
    let sql = conn
        .table("t")
        .when(true, |q| q.where_eq("a", 1))
        .when(false, |q| q.where_eq("b", 2))
        .for_page(3, 10)
        .to_sql()
        .unwrap();
    assert_eq!(sql, "SELECT * FROM t WHERE a = $1 LIMIT 10 OFFSET 20");
}

#[test]
fn test_for_page_saturates_offset() {
    let (conn, _) = fake(Dialect::Postgres);
    let sql = conn.table("t").for_page(u64::MAX, 10).to_sql().unwrap();
    assert_eq!(sql, format!("SELECT * FROM t LIMIT 10 OFFSET {}", u64::MAX));

    let sql = conn.table("t").for_page(0, 10).to_sql().unwrap();
    assert_eq!(sql, "SELECT * FROM t LIMIT 10 OFFSET 0");
}

#[test]
fn test_reorder_and_latest() {
    let (conn, _) = fake(Dialect::Postgres);
    let qb = conn.table("t").latest("created_at").oldest("id");
    assert_eq!(
        qb.to_sql().unwrap(),
        "SELECT * FROM t ORDER BY created_at DESC, id ASC"
    );
    assert_eq!(
        qb.reorder().order_by("name", Direction::Asc).to_sql().unwrap(),
        "SELECT * FROM t ORDER BY name ASC"
    );
}

#[test]
fn test_aggregate_drops_columns_orders_and_limits() {
    let (conn, _) = fake(Dialect::Postgres);
    let qb = conn
        .table("orders")
        .select(&["id"])
        .where_eq("status", "paid")
        .order_by_desc("id")
        .limit(3);
    let compiled = Grammar::new(Dialect::Postgres)
        .compile_aggregate(qb.state(), Aggregate::Sum, "amount")
        .unwrap();
    assert_eq!(
        compiled.sql,
        "SELECT SUM(amount) AS aggregate FROM orders WHERE status = $1"
    );
}

#[test]
fn test_grouped_count_wraps_subquery() {
    let (conn, _) = fake(Dialect::Postgres);
    let qb = conn
        .table("orders")
        .where_eq("status", "paid")
        .group_by(&["user_id"])
        .having("COUNT(*)", ">", 2)
        .order_by("user_id", Direction::Asc);
    let compiled = Grammar::new(Dialect::Postgres)
        .compile_aggregate(qb.state(), Aggregate::Count, "*")
        .unwrap();
    assert_eq!(
        compiled.sql,
        "SELECT COUNT(*) AS aggregate FROM (SELECT 1 FROM orders WHERE status = $1 \
         GROUP BY user_id HAVING COUNT(*) > $2) AS aggregate_table"
    );
    assert_eq!(compiled.bindings.len(), 2);
}

#[test]
fn test_exists_compiles_select_one() {
    let (conn, _) = fake(Dialect::Postgres);
    let qb = conn.table("users").where_eq("a", 1).order_by_desc("id");
    let compiled = Grammar::new(Dialect::Postgres)
        .compile_exists(qb.state())
        .unwrap();
    assert_eq!(compiled.sql, "SELECT 1 FROM users WHERE a = $1 LIMIT 1");
}

#[test]
fn test_truncate_per_dialect() {
    let (pg, _) = fake(Dialect::Postgres);
    let state = pg.table("users").into_state();
    assert_eq!(
        Grammar::new(Dialect::Postgres).compile_truncate(&state).unwrap().sql,
        "TRUNCATE TABLE users"
    );
    assert_eq!(
        Grammar::new(Dialect::Sqlite).compile_truncate(&state).unwrap().sql,
        "DELETE FROM users"
    );
}

// ==================== Execution ====================

#[tokio::test]
async fn test_update_binds_set_before_where() {
    let (conn, adapter) = fake(Dialect::Postgres);
    conn.table("users")
        .where_eq("id", 7)
        .update([("name", Value::from("bob")), ("age", Value::from(30))])
        .await
        .unwrap();

    let stmt = adapter.last().unwrap();
    assert_eq!(stmt.sql, "UPDATE users SET name = $1, age = $2 WHERE id = $3");
    assert_eq!(
        stmt.bindings,
        vec![Value::from("bob"), Value::Int(30), Value::Int(7)]
    );
}

#[tokio::test]
async fn test_update_accepts_raw_values() {
    let (conn, adapter) = fake(Dialect::Postgres);
    let users = conn.table("users").where_eq("id", 7);
    users.update([("seen_at", raw("NOW()"))]).await.unwrap();
    assert_eq!(
        adapter.last().unwrap().sql,
        "UPDATE users SET seen_at = NOW() WHERE id = $1"
    );

    users.increment("visits", 2).await.unwrap();
    let stmt = adapter.last().unwrap();
    assert_eq!(stmt.sql, "UPDATE users SET visits = visits + $1 WHERE id = $2");
    assert_eq!(stmt.bindings, vec![Value::Int(2), Value::Int(7)]);

    users.decrement("credits", 1).await.unwrap();
    assert_eq!(
        adapter.last().unwrap().sql,
        "UPDATE users SET credits = credits - $1 WHERE id = $2"
    );
}

#[tokio::test]
async fn test_update_and_delete_reject_joins() {
    let (conn, _) = fake(Dialect::Postgres);
    let joined = conn
        .table("users")
        .join("posts", "posts.user_id", "=", "users.id");
    assert!(matches!(
        joined.update([("a", 1)]).await,
        Err(OrmError::Validation(_))
    ));
    assert!(matches!(joined.delete().await, Err(OrmError::Validation(_))));
}

#[tokio::test]
async fn test_insert_many_fills_missing_columns_with_null() {
    let (conn, adapter) = fake(Dialect::Postgres);
    conn.table("users")
        .insert_many(vec![
            attrs! { "name" => "a", "age" => 1 },
            attrs! { "name" => "b" },
        ])
        .await
        .unwrap();

    let stmt = adapter.last().unwrap();
    assert_eq!(
        stmt.sql,
        "INSERT INTO users (name, age) VALUES ($1, $2), ($3, $4)"
    );
    assert_eq!(stmt.bindings[3], Value::Null);

    conn.table("t")
        .insert_many(vec![attrs! { "a" => 1 }, attrs! { "a" => 2, "b" => "keep" }])
        .await
        .unwrap();
    let stmt = adapter.last().unwrap();
    assert_eq!(stmt.sql, "INSERT INTO t (a, b) VALUES ($1, $2), ($3, $4)");
    assert_eq!(
        stmt.bindings,
        vec![Value::Int(1), Value::Null, Value::Int(2), Value::from("keep")]
    );

    let before = adapter.statements().len();
    assert_eq!(conn.table("users").insert_many(Vec::new()).await.unwrap(), 0);
    assert_eq!(adapter.statements().len(), before);
}

#[tokio::test]
async fn test_insert_get_id() {
    let (conn, adapter) = fake(Dialect::Postgres);
    let id = conn
        .table("users")
        .insert_get_id([("name", "ada")])
        .await
        .unwrap();
    assert_eq!(id, Some(Value::Int(1)));
    assert_eq!(
        adapter.last().unwrap().sql,
        "INSERT INTO users (name) VALUES ($1) RETURNING id"
    );

    let (generic, _) = fake(Dialect::Generic);
    let err = generic
        .table("users")
        .insert_get_id([("name", "ada")])
        .await
        .unwrap_err();
    assert!(err.is_configuration());
}

#[tokio::test]
async fn test_delete_and_truncate() {
    let (conn, adapter) = fake(Dialect::Postgres);
    conn.table("users").where_eq("id", 3).delete().await.unwrap();
    assert_eq!(adapter.last().unwrap().sql, "DELETE FROM users WHERE id = $1");

    conn.table("users").truncate().await.unwrap();
    assert_eq!(adapter.last().unwrap().sql, "TRUNCATE TABLE users");
}

#[tokio::test]
async fn test_reads() {
    let (conn, adapter) = fake_with_rows(Dialect::Postgres, numbered_rows(3));
    let users = conn.table("users");

    assert_eq!(users.get().await.unwrap().len(), 3);

    let first = users.first().await.unwrap().unwrap();
    assert_eq!(first.get("id"), Some(&Value::Int(1)));
    assert_eq!(adapter.last().unwrap().sql, "SELECT * FROM users LIMIT 1");

    users.find(2).await.unwrap();
    assert_eq!(
        adapter.last().unwrap().sql,
        "SELECT * FROM users WHERE id = $1 LIMIT 1"
    );

    let names = users.pluck("name").await.unwrap();
    assert_eq!(names.len(), 3);
    assert_eq!(names[2], Value::from("user-3"));
    assert_eq!(adapter.last().unwrap().sql, "SELECT name FROM users");

    assert_eq!(users.value("name").await.unwrap(), Some(Value::from("user-1")));
    assert!(users.exists().await.unwrap());
    assert!(!users.doesnt_exist().await.unwrap());
}

#[tokio::test]
async fn test_aggregates() {
    let (conn, adapter) = fake_with_rows(Dialect::Postgres, numbered_rows(4));
    assert_eq!(conn.table("users").count().await.unwrap(), 4);
    assert_eq!(
        adapter.last().unwrap().sql,
        "SELECT COUNT(*) AS aggregate FROM users"
    );

    let (empty, adapter) = fake(Dialect::Postgres);
    assert_eq!(empty.table("users").count().await.unwrap(), 0);

    let null_aggregate = || {
        QueryOutput::from_rows(vec![attrs! { "aggregate" => Value::Null }])
    };
    adapter.respond(null_aggregate());
    assert_eq!(empty.table("users").sum("amount").await.unwrap(), 0.0);
    adapter.respond(null_aggregate());
    assert_eq!(empty.table("users").avg("amount").await.unwrap(), None);
    adapter.respond(null_aggregate());
    assert_eq!(empty.table("users").max("amount").await.unwrap(), None);

    adapter.respond(QueryOutput::from_rows(vec![attrs! { "aggregate" => "12.5" }]));
    assert_eq!(empty.table("users").avg("amount").await.unwrap(), Some(12.5));
}

#[tokio::test]
async fn test_adapter_errors_propagate() {
    let (conn, adapter) = fake(Dialect::Postgres);
    adapter.fail_next("connection reset");
    let err = conn.table("users").get().await.unwrap_err();
    assert!(err.is_adapter());
    assert!(err.to_string().contains("connection reset"));
}

#[tokio::test]
async fn test_transaction_commits_or_rolls_back() {
    let (conn, adapter) = fake(Dialect::Postgres);
    conn.transaction(|tx| async move {
        tx.table("users").where_eq("id", 1).delete().await?;
        Ok(())
    })
    .await
    .unwrap();
    assert_eq!(
        adapter.sql_log(),
        vec!["BEGIN", "DELETE FROM users WHERE id = $1", "COMMIT"]
    );

    let (conn, adapter) = fake(Dialect::Postgres);
    let result: Result<(), _> = conn
        .transaction(|_| async { Err(OrmError::validation("nope")) })
        .await;
    assert!(result.is_err());
    assert_eq!(adapter.sql_log(), vec!["BEGIN", "ROLLBACK"]);
}
