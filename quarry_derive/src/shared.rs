use proc_macro_crate::{FoundCrate, crate_name};
use quote::quote;
use syn::{Attribute, Expr, ExprLit, Lit, Meta, punctuated::Punctuated};

pub fn import_quarry() -> proc_macro2::TokenStream {
    // the user may have renamed the dependency
    let found_crate = crate_name("quarry").unwrap_or(FoundCrate::Itself);

    match found_crate {
        FoundCrate::Itself => quote! { ::quarry },
        FoundCrate::Name(name) => {
            let ident = syn::Ident::new(&name, proc_macro2::Span::call_site());
            quote! { ::#ident }
        }
    }
}

/// Every item of every `#[quarry(...)]` attribute, in order.
pub fn quarry_args(attrs: &[Attribute]) -> syn::Result<Vec<Meta>> {
    let mut out = Vec::new();
    for attr in attrs.iter().filter(|a| a.path().is_ident("quarry")) {
        let nested =
            attr.parse_args_with(Punctuated::<Meta, syn::Token![,]>::parse_terminated)?;
        out.extend(nested);
    }
    Ok(out)
}

pub fn string_value(meta: &Meta) -> syn::Result<Option<String>> {
    let Meta::NameValue(nv) = meta else {
        return Ok(None);
    };
    match &nv.value {
        Expr::Lit(ExprLit {
            lit: Lit::Str(s), ..
        }) => Ok(Some(s.value())),
        other => Err(syn::Error::new_spanned(
            other,
            format!(
                "`{}` must be a string literal",
                nv.path
                    .get_ident()
                    .map(ToString::to_string)
                    .unwrap_or_default()
            ),
        )),
    }
}

/// `UserProfile` -> `user_profile`
pub fn snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for (i, ch) in name.chars().enumerate() {
        if ch.is_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.extend(ch.to_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}
