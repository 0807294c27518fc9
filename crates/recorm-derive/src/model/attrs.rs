//! Struct-level `#[orm(...)]` attribute parsing.

use super::relations::RelationAttr;
use heck::ToSnakeCase;
use syn::punctuated::Punctuated;
use syn::{DeriveInput, LitStr, Result, Token};

/// Everything declared in the struct-level `#[orm(...)]` attributes.
#[derive(Default)]
pub(super) struct ModelAttrs {
    pub table: Option<String>,
    pub primary_key: Option<String>,
    pub timestamps: bool,
    pub soft_deletes: bool,
    pub hidden: Vec<String>,
    pub visible: Vec<String>,
    pub casts: Vec<(String, syn::Ident)>,
    pub relations: Vec<RelationAttr>,
}

impl ModelAttrs {
    pub fn parse(input: &DeriveInput) -> Result<Self> {
        let mut attrs = ModelAttrs::default();
        for attr in &input.attrs {
            if !attr.path().is_ident("orm") {
                continue;
            }
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("table") {
                    attrs.table = Some(meta.value()?.parse::<LitStr>()?.value());
                } else if meta.path.is_ident("primary_key") {
                    attrs.primary_key = Some(meta.value()?.parse::<LitStr>()?.value());
                } else if meta.path.is_ident("timestamps") {
                    attrs.timestamps = true;
                } else if meta.path.is_ident("soft_deletes") {
                    attrs.soft_deletes = true;
                } else if meta.path.is_ident("hidden") {
                    attrs.hidden.extend(string_list(&meta)?);
                } else if meta.path.is_ident("visible") {
                    attrs.visible.extend(string_list(&meta)?);
                } else if meta.path.is_ident("cast") {
                    meta.parse_nested_meta(|cast| {
                        let column = cast
                            .path
                            .get_ident()
                            .ok_or_else(|| cast.error("expected a column name"))?
                            .to_string();
                        let kind: LitStr = cast.value()?.parse()?;
                        attrs.casts.push((column, cast_variant(&kind)?));
                        Ok(())
                    })?;
                } else if let Some(relation) = RelationAttr::parse(&meta)? {
                    attrs.relations.push(relation);
                } else {
                    return Err(meta.error("unsupported orm attribute"));
                }
                Ok(())
            })?;
        }
        Ok(attrs)
    }

    /// Explicit table name, or the snake_case plural of the type name.
    pub fn table_name(&self, ident: &syn::Ident) -> String {
        self.table
            .clone()
            .unwrap_or_else(|| pluralize(&ident.to_string().to_snake_case()))
    }
}

fn string_list(meta: &syn::meta::ParseNestedMeta<'_>) -> Result<Vec<String>> {
    let content;
    syn::parenthesized!(content in meta.input);
    let list = Punctuated::<LitStr, Token![,]>::parse_terminated(&content)?;
    Ok(list.into_iter().map(|s| s.value()).collect())
}

fn cast_variant(kind: &LitStr) -> Result<syn::Ident> {
    let variant = match kind.value().to_ascii_lowercase().as_str() {
        "int" | "integer" => "Integer",
        "float" | "double" | "real" => "Float",
        "bool" | "boolean" => "Boolean",
        "string" | "text" => "String",
        "json" | "array" | "object" => "Json",
        "datetime" | "timestamp" | "date" => "DateTime",
        other => {
            return Err(syn::Error::new(
                kind.span(),
                format!("unknown cast '{other}'"),
            ));
        }
    };
    Ok(syn::Ident::new(variant, kind.span()))
}

fn pluralize(word: &str) -> String {
    if let Some(stem) = word.strip_suffix('y') {
        if !stem.ends_with(['a', 'e', 'i', 'o', 'u']) {
            return format!("{stem}ies");
        }
    }
    if word.ends_with('s')
        || word.ends_with('x')
        || word.ends_with('z')
        || word.ends_with("ch")
        || word.ends_with("sh")
    {
        return format!("{word}es");
    }
    format!("{word}s")
}

#[cfg(test)]
mod tests {
    use super::pluralize;

    #[test]
    fn pluralizes_table_names() {
        assert_eq!(pluralize("user"), "users");
        assert_eq!(pluralize("category"), "categories");
        assert_eq!(pluralize("day"), "days");
        assert_eq!(pluralize("address"), "addresses");
        assert_eq!(pluralize("blog_post"), "blog_posts");
    }
}
