//! Derive macros for recorm
//!
//! Provides `#[derive(Model)]`.

use proc_macro::TokenStream;
use syn::{DeriveInput, parse_macro_input};

mod model;

/// Derive the `recorm::Model` trait for a struct that owns a `Record`.
///
/// # Example
///
/// ```ignore
/// use recorm::{Model, Record};
///
/// #[derive(Debug, Clone, Model)]
/// #[orm(table = "users", timestamps, soft_deletes)]
/// #[orm(hidden("password"), cast(age = "integer", settings = "json"))]
/// #[orm(has_many(Post, foreign_key = "user_id", name = "posts"))]
/// struct User {
///     record: Record,
/// }
/// ```
///
/// # Attributes
///
/// - `#[orm(table = "name")]` - Table name (default: snake_case plural of the type name)
/// - `#[orm(primary_key = "name")]` - Primary key column (default: `id`)
/// - `#[orm(timestamps)]` - Maintain `created_at` / `updated_at`
/// - `#[orm(soft_deletes)]` - Delete by setting `deleted_at`
/// - `#[orm(hidden("a", "b"))]` / `#[orm(visible("a", "b"))]` - Export filtering
/// - `#[orm(cast(column = "integer" | "float" | "boolean" | "string" | "json" | "datetime"))]`
/// - `#[orm(has_many(Model, foreign_key = "...", local_key = "...", name = "..."))]`,
///   `has_one(...)`, `belongs_to(Model, foreign_key = "...", name = "...")` - Relations
/// - `#[orm(record)]` on a field - The `Record` field (default: the field named
///   `record` or typed `Record`). Every other field must implement `Default`.
#[proc_macro_derive(Model, attributes(orm))]
pub fn derive_model(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    model::expand(input)
        .unwrap_or_else(|e| e.to_compile_error())
        .into()
}
