//! Procedural macros for unistore

use darling::{FromDeriveInput, FromVariant};
use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{parse_macro_input, DeriveInput};

/// Container-level attributes for #[derive(Action)]
#[derive(Debug, FromDeriveInput)]
#[darling(attributes(action), supports(enum_any))]
struct ActionOpts {
    ident: syn::Ident,
    generics: syn::Generics,
    data: darling::ast::Data<ActionVariant, ()>,

    /// Prepended to every generated name, e.g. `"Search."`
    #[darling(default)]
    prefix: Option<String>,
}

/// Variant-level attributes
#[derive(Debug, FromVariant)]
#[darling(attributes(action))]
struct ActionVariant {
    ident: syn::Ident,
    fields: darling::ast::Fields<()>,

    /// Explicit name override
    #[darling(default)]
    name: Option<String>,
}

/// Derive the `Action` trait for an enum.
///
/// `name()` returns the variant name, or the `#[action(name = "...")]`
/// override. `#[action(prefix = "...")]` on the enum prefixes every name.
///
/// ```ignore
/// #[derive(Action, Clone, Debug)]
/// #[action(prefix = "Search.")]
/// enum SearchAction {
///     QueryChanged(String),       // "Search.QueryChanged"
///     #[action(name = "Results")]
///     DidSearch { hits: Vec<String> }, // "Search.Results"
/// }
/// ```
#[proc_macro_derive(Action, attributes(action))]
pub fn derive_action(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    let opts = match ActionOpts::from_derive_input(&input) {
        Ok(opts) => opts,
        Err(e) => return e.write_errors().into(),
    };

    let name = &opts.ident;
    let (impl_generics, ty_generics, where_clause) = opts.generics.split_for_impl();

    let variants = match &opts.data {
        darling::ast::Data::Enum(variants) => variants,
        _ => {
            return syn::Error::new_spanned(&input, "Action can only be derived for enums")
                .to_compile_error()
                .into();
        }
    };

    if variants.is_empty() {
        return syn::Error::new_spanned(&input, "Action cannot be derived for an empty enum")
            .to_compile_error()
            .into();
    }

    let prefix = opts.prefix.as_deref().unwrap_or("");
    let name_arms: Vec<TokenStream2> = variants.iter().map(|v| {
        let variant_name = &v.ident;
        let label = format!(
            "{}{}",
            prefix,
            v.name.clone().unwrap_or_else(|| variant_name.to_string())
        );

        match &v.fields.style {
            darling::ast::Style::Unit => quote! {
                Self::#variant_name => #label
            },
            darling::ast::Style::Tuple => quote! {
                Self::#variant_name(..) => #label
            },
            darling::ast::Style::Struct => quote! {
                Self::#variant_name { .. } => #label
            },
        }
    }).collect();

    let expanded = quote! {
        impl #impl_generics unistore::Action for #name #ty_generics #where_clause {
            fn name(&self) -> &'static str {
                match self {
                    #(#name_arms),*
                }
            }
        }
    };

    TokenStream::from(expanded)
}
