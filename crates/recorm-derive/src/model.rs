//! Model derive macro implementation
//!
//! - `attrs`: struct-level attribute parsing
//! - `relations`: has_many / has_one / belongs_to parsing

mod attrs;
mod relations;

use attrs::ModelAttrs;
use proc_macro2::TokenStream;
use quote::quote;
use syn::{Data, DeriveInput, Fields, Result};

pub fn expand(input: DeriveInput) -> Result<TokenStream> {
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => &fields.named,
            _ => {
                return Err(syn::Error::new_spanned(
                    &input,
                    "Model can only be derived for structs with named fields",
                ));
            }
        },
        _ => {
            return Err(syn::Error::new_spanned(
                &input,
                "Model can only be derived for structs",
            ));
        }
    };

    let record_field = find_record_field(fields).ok_or_else(|| {
        syn::Error::new_spanned(
            &input,
            "Model requires a `record: Record` field (or a field marked #[orm(record)])",
        )
    })?;

    let attrs = ModelAttrs::parse(&input)?;
    let table = attrs.table_name(name);
    let primary_key = attrs.primary_key.clone().unwrap_or_else(|| "id".to_string());
    let timestamps = attrs.timestamps;
    let soft_deletes = attrs.soft_deletes;
    let hidden = &attrs.hidden;
    let visible = &attrs.visible;
    let cast_columns = attrs.casts.iter().map(|(column, _)| column);
    let cast_variants = attrs.casts.iter().map(|(_, variant)| variant);

    let relations_fn = if attrs.relations.is_empty() {
        quote!()
    } else {
        let entries = attrs.relations.iter().map(|r| r.to_entry());
        quote! {
            fn relations() -> ::recorm::Relations {
                vec![#(#entries),*]
            }
        }
    };

    let other_fields = fields
        .iter()
        .filter_map(|f| f.ident.as_ref())
        .filter(|ident| *ident != record_field);

    Ok(quote! {
        impl #impl_generics ::recorm::Model for #name #ty_generics #where_clause {
            const TABLE: &'static str = #table;
            const PRIMARY_KEY: &'static str = #primary_key;
            const TIMESTAMPS: bool = #timestamps;
            const SOFT_DELETES: bool = #soft_deletes;

            fn hidden() -> &'static [&'static str] {
                &[#(#hidden),*]
            }

            fn visible() -> &'static [&'static str] {
                &[#(#visible),*]
            }

            fn casts() -> &'static [(&'static str, ::recorm::Cast)] {
                &[#((#cast_columns, ::recorm::Cast::#cast_variants)),*]
            }

            #relations_fn

            fn from_record(record: ::recorm::Record) -> Self {
                Self {
                    #record_field: record,
                    #(#other_fields: ::core::default::Default::default(),)*
                }
            }

            fn record(&self) -> &::recorm::Record {
                &self.#record_field
            }

            fn record_mut(&mut self) -> &mut ::recorm::Record {
                &mut self.#record_field
            }
        }
    })
}

/// The field marked `#[orm(record)]`, else one named `record`, else the
/// first whose type is `Record`.
fn find_record_field(
    fields: &syn::punctuated::Punctuated<syn::Field, syn::Token![,]>,
) -> Option<&syn::Ident> {
    let marked = fields.iter().find(|f| {
        f.attrs.iter().any(|attr| {
            attr.path().is_ident("orm")
                && attr
                    .parse_args::<syn::Ident>()
                    .is_ok_and(|ident| ident == "record")
        })
    });
    let named = || {
        fields
            .iter()
            .find(|f| f.ident.as_ref().is_some_and(|i| i == "record"))
    };
    let typed = || {
        fields.iter().find(|f| match &f.ty {
            syn::Type::Path(p) => p
                .path
                .segments
                .last()
                .is_some_and(|s| s.ident == "Record"),
            _ => false,
        })
    };
    marked
        .or_else(named)
        .or_else(typed)
        .and_then(|f| f.ident.as_ref())
}
