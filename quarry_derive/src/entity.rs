use proc_macro::TokenStream;
use quote::quote;
use syn::{Data, DeriveInput, Fields, Meta, parse_macro_input, spanned::Spanned};

use crate::shared::{import_quarry, quarry_args, snake_case, string_value};

struct EntityAttr {
    name: String,
    table: String,
    primary_key: String,
}

enum FieldDecl {
    Scalar,
    Array,
    Relation {
        target: String,
        many: bool,
        local: Option<String>,
        foreign: Option<String>,
    },
}

fn parse_entity_attr(input: &DeriveInput) -> syn::Result<EntityAttr> {
    let mut name = None;
    let mut table = None;
    let mut primary_key = None;

    for meta in quarry_args(&input.attrs)? {
        let path = meta.path();
        if path.is_ident("name") {
            name = string_value(&meta)?;
        } else if path.is_ident("table") {
            table = string_value(&meta)?;
        } else if path.is_ident("primary_key") {
            primary_key = string_value(&meta)?;
        } else {
            return Err(syn::Error::new_spanned(
                path,
                "expected `name`, `table` or `primary_key`",
            ));
        }
    }

    let name = name.unwrap_or_else(|| input.ident.to_string());
    let table = table.unwrap_or_else(|| format!("{}s", snake_case(&name)));
    Ok(EntityAttr {
        name,
        table,
        primary_key: primary_key.unwrap_or_else(|| "id".to_string()),
    })
}

fn parse_field(field: &syn::Field) -> syn::Result<Option<FieldDecl>> {
    let mut skip = false;
    let mut array = false;
    let mut many = false;
    let mut one = false;
    let mut target = None;
    let mut local = None;
    let mut foreign = None;

    for meta in quarry_args(&field.attrs)? {
        match &meta {
            Meta::Path(p) if p.is_ident("skip") => skip = true,
            Meta::Path(p) if p.is_ident("array") => array = true,
            Meta::Path(p) if p.is_ident("many") => many = true,
            Meta::Path(p) if p.is_ident("one") => one = true,
            Meta::NameValue(nv) if nv.path.is_ident("relation") => target = string_value(&meta)?,
            Meta::NameValue(nv) if nv.path.is_ident("local") => local = string_value(&meta)?,
            Meta::NameValue(nv) if nv.path.is_ident("foreign") => foreign = string_value(&meta)?,
            other => {
                return Err(syn::Error::new_spanned(
                    other,
                    "expected `skip`, `array`, `relation = \"..\"`, `one`, `many`, `local = \"..\"` or `foreign = \"..\"`",
                ));
            }
        }
    }

    if skip {
        return Ok(None);
    }
    if many && one {
        return Err(syn::Error::new(
            field.span(),
            "a relation is either `one` or `many`",
        ));
    }
    match target {
        Some(target) => Ok(Some(FieldDecl::Relation {
            target,
            many,
            local,
            foreign,
        })),
        None if many || one || local.is_some() || foreign.is_some() => Err(syn::Error::new(
            field.span(),
            "`one`, `many`, `local` and `foreign` need `relation = \"Target\"`",
        )),
        None if array => Ok(Some(FieldDecl::Array)),
        None => Ok(Some(FieldDecl::Scalar)),
    }
}

fn expand(input: &DeriveInput) -> syn::Result<proc_macro2::TokenStream> {
    let quarry = import_quarry();
    let ident = &input.ident;

    let fields = match &input.data {
        Data::Struct(s) => match &s.fields {
            Fields::Named(f) => &f.named,
            _ => {
                return Err(syn::Error::new_spanned(
                    ident,
                    "Entity only supports structs with named fields",
                ));
            }
        },
        _ => return Err(syn::Error::new_spanned(ident, "Entity only supports structs")),
    };

    let entity = parse_entity_attr(input)?;
    let owner_key = format!("{}_id", snake_case(&entity.name));

    let mut declarations = Vec::new();
    for field in fields {
        let Some(field_ident) = field.ident.as_ref() else {
            continue;
        };
        let column = field_ident.to_string().trim_start_matches("r#").to_string();
        let declaration = match parse_field(field)? {
            None => continue,
            Some(FieldDecl::Scalar) => quote! { .with_field(#column) },
            Some(FieldDecl::Array) => quote! { .with_array_field(#column) },
            Some(FieldDecl::Relation {
                target,
                many: true,
                local,
                foreign,
            }) => {
                let local = local.unwrap_or_else(|| entity.primary_key.clone());
                let foreign = foreign.unwrap_or_else(|| owner_key.clone());
                quote! {
                    .with_relation(#column, #quarry::schema::Relation::many(#target, #local, #foreign))
                }
            }
            Some(FieldDecl::Relation {
                target,
                local,
                foreign,
                ..
            }) => {
                let local = local.unwrap_or_else(|| format!("{column}_id"));
                let foreign = foreign.unwrap_or_else(|| "id".to_string());
                quote! {
                    .with_relation(#column, #quarry::schema::Relation::one(#target, #local, #foreign))
                }
            }
        };
        declarations.push(declaration);
    }

    let EntityAttr {
        name,
        table,
        primary_key,
    } = entity;

    Ok(quote! {
        impl #quarry::schema::Entity for #ident {
            const NAME: &'static str = #name;

            fn shape() -> #quarry::schema::Shape {
                #quarry::schema::Shape::new(#name, #table)
                    .with_primary_key(#primary_key)
                    #(#declarations)*
            }
        }
    })
}

pub fn derive(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    expand(&input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}
