//! Relation declarations:
//!
//! - `#[orm(has_many(Post, foreign_key = "user_id"))]`
//! - `#[orm(has_one(Profile, foreign_key = "user_id", name = "profile"))]`
//! - `#[orm(belongs_to(Team, foreign_key = "team_id"))]`

use heck::ToSnakeCase;
use proc_macro2::TokenStream;
use quote::quote;
use syn::ext::IdentExt;
use syn::{LitStr, Result, Token};

#[derive(Clone, Copy, PartialEq, Eq)]
pub(super) enum RelationKind {
    HasMany,
    HasOne,
    BelongsTo,
}

pub(super) struct RelationAttr {
    kind: RelationKind,
    model: syn::Path,
    foreign_key: String,
    local_key: Option<String>,
    name: String,
}

impl RelationAttr {
    /// Parse a relation entry; `Ok(None)` when `meta` is not a relation.
    pub fn parse(meta: &syn::meta::ParseNestedMeta<'_>) -> Result<Option<Self>> {
        let kind = if meta.path.is_ident("has_many") {
            RelationKind::HasMany
        } else if meta.path.is_ident("has_one") {
            RelationKind::HasOne
        } else if meta.path.is_ident("belongs_to") {
            RelationKind::BelongsTo
        } else {
            return Ok(None);
        };

        let content;
        syn::parenthesized!(content in meta.input);
        let model: syn::Path = content.parse()?;

        let mut foreign_key = None;
        let mut local_key = None;
        let mut name = None;
        while content.peek(Token![,]) {
            let _: Token![,] = content.parse()?;
            if content.is_empty() {
                break;
            }
            let key = syn::Ident::parse_any(&content)?;
            let _: Token![=] = content.parse()?;
            let value: LitStr = content.parse()?;
            if key == "foreign_key" {
                foreign_key = Some(value.value());
            } else if key == "local_key" {
                local_key = Some(value.value());
            } else if key == "name" || key == "as" {
                name = Some(value.value());
            } else {
                return Err(syn::Error::new(key.span(), "expected foreign_key, local_key or name"));
            }
        }

        let foreign_key = foreign_key
            .ok_or_else(|| meta.error("relation requires foreign_key = \"...\""))?;
        if kind == RelationKind::BelongsTo && local_key.is_some() {
            return Err(meta.error("belongs_to does not take local_key"));
        }

        let model_name = model
            .segments
            .last()
            .map(|s| s.ident.to_string().to_snake_case())
            .unwrap_or_default();
        let name = name.unwrap_or_else(|| match kind {
            RelationKind::HasMany => format!("{model_name}s"),
            RelationKind::HasOne | RelationKind::BelongsTo => model_name,
        });

        Ok(Some(RelationAttr {
            kind,
            model,
            foreign_key,
            local_key,
            name,
        }))
    }

    /// `("name", Relation::...::<Model>(...).into_loader())`
    pub fn to_entry(&self) -> TokenStream {
        let RelationAttr {
            model,
            foreign_key,
            name,
            ..
        } = self;
        let relation = match (self.kind, &self.local_key) {
            (RelationKind::HasMany, None) => {
                quote!(::recorm::Relation::has_many::<#model>(#foreign_key))
            }
            (RelationKind::HasMany, Some(local)) => {
                quote!(::recorm::Relation::has_many_by::<#model>(#foreign_key, #local))
            }
            (RelationKind::HasOne, None) => {
                quote!(::recorm::Relation::has_one::<#model>(#foreign_key))
            }
            (RelationKind::HasOne, Some(local)) => {
                quote!(::recorm::Relation::has_one_by::<#model>(#foreign_key, #local))
            }
            (RelationKind::BelongsTo, _) => {
                quote!(::recorm::Relation::belongs_to::<#model>(#foreign_key))
            }
        };
        quote!((#name, #relation.into_loader()))
    }
}
