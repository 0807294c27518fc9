#![cfg(feature = "derive")]

use recorm::prelude::*;
use recorm::Related;

#[derive(Debug, Clone, Model)]
#[orm(table = "users", timestamps, hidden("password"))]
#[orm(cast(age = "integer", settings = "json", active = "bool"))]
#[orm(has_many(Post, foreign_key = "user_id"), has_one(Profile, foreign_key = "user_id"))]
struct User {
    record: Record,
}

#[derive(Debug, Clone, Model)]
#[orm(soft_deletes, belongs_to(User, foreign_key = "user_id", name = "author"))]
struct Post {
    record: Record,
}

#[derive(Debug, Clone, Model)]
#[orm(primary_key = "user_id", visible("user_id", "bio"))]
struct Profile {
    #[orm(record)]
    inner: Record,
    loaded_at: Option<u64>,
}

#[derive(Debug, Clone, Model)]
struct BlogCategory {
    record: Record,
}

fn relation_names<M: Model>() -> Vec<&'static str> {
    M::relations().into_iter().map(|(name, _)| name).collect()
}

#[test]
fn derive_sets_table_and_flags() {
    assert_eq!(User::TABLE, "users");
    assert!(User::TIMESTAMPS);
    assert!(!User::SOFT_DELETES);
    assert_eq!(User::PRIMARY_KEY, "id");

    assert_eq!(Post::TABLE, "posts");
    assert!(Post::SOFT_DELETES);

    assert_eq!(Profile::TABLE, "profiles");
    assert_eq!(Profile::PRIMARY_KEY, "user_id");

    assert_eq!(BlogCategory::TABLE, "blog_categories");
}

#[test]
fn derive_declares_relations() {
    assert_eq!(relation_names::<User>(), ["posts", "profile"]);
    assert_eq!(relation_names::<Post>(), ["author"]);
    assert!(relation_names::<BlogCategory>().is_empty());
}

#[test]
fn derive_applies_casts() {
    let user = User::hydrate(attrs! {
        "id" => 1,
        "age" => "31",
        "active" => "yes",
        "settings" => r#"{"theme":"dark"}"#,
    });
    assert_eq!(user.get("age"), Some(Value::Int(31)));
    assert_eq!(user.get("active"), Some(Value::Bool(true)));
    assert_eq!(
        user.get("settings"),
        Some(Value::Object(attrs! { "theme" => "dark" }))
    );
    assert_eq!(User::casts().len(), 3);
}

#[test]
fn derive_wires_visibility() {
    let user = User::hydrate(attrs! { "id" => 1, "name" => "ada", "password" => "x" });
    assert!(!user.to_object().contains_key("password"));

    let profile = Profile::hydrate(attrs! { "user_id" => 1, "bio" => "hi", "secret" => 1 });
    assert_eq!(
        profile.to_object().keys().collect::<Vec<_>>(),
        ["user_id", "bio"]
    );
    assert_eq!(profile.get_key(), Some(&Value::Int(1)));
}

#[test]
fn derive_defaults_extra_fields() {
    let mut profile = Profile::make(attrs! { "bio" => "hi" });
    assert_eq!(profile.loaded_at, None);
    assert!(!profile.exists());

    profile.record_mut().set_relation("owner", Related::One(None));
    assert!(profile.inner.relation_loaded("owner"));
}
