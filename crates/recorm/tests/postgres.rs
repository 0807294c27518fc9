//! Round trips against a live PostgreSQL server.
//!
//! Skipped unless `DATABASE_URL` is set (a `.env` file is honoured).

#![cfg(feature = "postgres")]

use recorm::prelude::*;
use recorm::{Adapter, Related};

#[derive(Debug, Clone, Model)]
#[orm(table = "recorm_test_authors", timestamps, soft_deletes, cast(age = "integer"))]
#[orm(has_many(Book, foreign_key = "author_id"))]
struct Author {
    record: Record,
}

#[derive(Debug, Clone, Model)]
#[orm(table = "recorm_test_books", belongs_to(Author, foreign_key = "author_id"))]
struct Book {
    record: Record,
}

const SCHEMA: &[&str] = &[
    "DROP TABLE IF EXISTS recorm_test_books",
    "DROP TABLE IF EXISTS recorm_test_authors",
    "CREATE TABLE recorm_test_authors (
        id BIGSERIAL PRIMARY KEY,
        name TEXT NOT NULL,
        age INT,
        created_at TIMESTAMPTZ,
        updated_at TIMESTAMPTZ,
        deleted_at TIMESTAMPTZ
    )",
    "CREATE TABLE recorm_test_books (
        id BIGSERIAL PRIMARY KEY,
        author_id BIGINT NOT NULL,
        title TEXT NOT NULL,
        pages INT NOT NULL DEFAULT 0
    )",
];

async fn run_all(conn: &Connection, statements: &[&str]) -> OrmResult<()> {
    for sql in statements {
        conn.adapter().query(sql, &[]).await?;
    }
    Ok(())
}

#[tokio::test]
async fn postgres_roundtrip() -> OrmResult<()> {
    dotenvy::dotenv().ok();
    let database_url = match std::env::var("DATABASE_URL") {
        Ok(v) => v,
        Err(_) => {
            eprintln!("DATABASE_URL is not set; skipping postgres_roundtrip");
            return Ok(());
        }
    };

    let conn = DatabaseConfig::new(database_url.clone()).connect().await?;
    run_all(&conn, SCHEMA).await?;

    // ---- models ----
    let mut ada = Author::query(&conn)
        .create(attrs! { "name" => "ada", "age" => 36 })
        .await?;
    let bob = Author::query(&conn)
        .create(attrs! { "name" => "bob", "age" => "41" })
        .await?;
    Author::query(&conn)
        .create(attrs! { "name" => "cy" })
        .await?;
    assert!(ada.get_key().is_some());
    assert!(matches!(ada.get("created_at"), Some(Value::Timestamp(_))));

    ada.set("name", "ada l.");
    ada.save(&conn).await?;
    ada.refresh(&conn).await?;
    assert_eq!(ada.get("name"), Some(Value::from("ada l.")));
    assert_eq!(ada.get("age"), Some(Value::Int(36)));

    // ---- query builder ----
    let ada_id = ada.get_key().cloned().unwrap_or_default();
    let bob_id = bob.get_key().cloned().unwrap_or_default();
    conn.table("recorm_test_books")
        .insert_many(vec![
            attrs! { "author_id" => ada_id.clone(), "title" => "notes", "pages" => 120 },
            attrs! { "author_id" => ada_id.clone(), "title" => "letters", "pages" => 80 },
            attrs! { "author_id" => bob_id.clone(), "title" => "essays", "pages" => 200 },
        ])
        .await?;

    let books = conn.table("recorm_test_books");
    assert_eq!(books.count().await?, 3);
    assert_eq!(books.sum("pages").await?, 400.0);
    assert_eq!(
        books.clone().where_eq("author_id", ada_id.clone()).avg("pages").await?,
        Some(100.0)
    );
    assert_eq!(
        books.clone().where_in("id", Vec::<i64>::new()).count().await?,
        0
    );
    books
        .clone()
        .where_eq("title", "essays")
        .increment("pages", 5)
        .await?;
    assert_eq!(
        books.clone().where_eq("title", "essays").value("pages").await?,
        Some(Value::Int(205))
    );

    // ---- eager loading ----
    let authors = Author::query(&conn)
        .with(&["books"])
        .order_by("id", Direction::Asc)
        .get()
        .await?;
    let counts: Vec<usize> = authors.map_into(|a| match a.record().relation("books") {
        Some(Related::Many(books)) => books.len(),
        _ => usize::MAX,
    });
    assert_eq!(counts, vec![2, 1, 0]);

    let with_author = Book::query(&conn).with(&["author"]).first_or_fail().await?;
    assert!(matches!(
        with_author.record().relation("author"),
        Some(Related::One(Some(_)))
    ));

    // ---- pagination & chunking ----
    let page = Author::query(&conn)
        .order_by("id", Direction::Asc)
        .paginate(2, 2)
        .await?;
    assert_eq!((page.total, page.last_page, page.from, page.to), (3, 2, 3, 3));

    let mut sizes = Vec::new();
    Author::query(&conn)
        .chunk_by_id(2, |chunk| {
            sizes.push(chunk.len());
            async { Ok(true) }
        })
        .await?;
    assert_eq!(sizes, vec![2, 1]);

    // ---- soft deletes ----
    ada.delete(&conn).await?;
    assert!(ada.trashed());
    assert_eq!(Author::query(&conn).count().await?, 2);
    assert_eq!(Author::query(&conn).with_trashed().count().await?, 3);
    assert_eq!(Author::query(&conn).only_trashed().count().await?, 1);
    ada.restore(&conn).await?;
    assert_eq!(Author::query(&conn).count().await?, 3);

    // ---- transactions ----
    let result: OrmResult<()> = conn
        .transaction(|tx| async move {
            tx.table("recorm_test_books").delete().await?;
            Err(OrmError::validation("roll back"))
        })
        .await;
    assert!(result.is_err());
    assert_eq!(conn.table("recorm_test_books").count().await?, 3);

    // ---- pooled transactions keep to their own connection ----
    let pooled = DatabaseConfig::new(database_url)
        .max_pool_size(4)
        .connect()
        .await?;
    let outside = pooled.clone();
    let draft_author = ada_id.clone();
    let result: OrmResult<()> = pooled
        .transaction(|tx| async move {
            tx.table("recorm_test_books")
                .insert([("author_id", draft_author), ("title", Value::from("draft"))])
                .await?;
            assert_eq!(tx.table("recorm_test_books").count().await?, 4);
            assert_eq!(outside.table("recorm_test_books").count().await?, 3);
            Err(OrmError::validation("roll back"))
        })
        .await;
    assert!(result.is_err());
    assert_eq!(pooled.table("recorm_test_books").count().await?, 3);
    pooled.disconnect().await?;

    let tables = conn.adapter().get_tables().await?;
    assert!(tables.iter().any(|t| t == "recorm_test_books"));
    let info = conn.adapter().get_table_info("recorm_test_books").await?;
    assert!(info.columns.iter().any(|c| c.name == "id" && c.primary_key));

    run_all(&conn, &SCHEMA[..2]).await?;
    conn.disconnect().await
}
