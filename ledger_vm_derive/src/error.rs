//! `#[derive(Error)]`: `Display` and `std::error::Error` from `#[error("...")]`.
//!
//! ```ignore
//! #[derive(Debug, Error)]
//! pub enum StorageError {
//!     #[error("missing key {0}")]
//!     Missing(String),
//!     #[error("index {index} out of range ({count})")]
//!     OutOfRange { index: u64, count: u64 },
//! }
//! ```
//!
//! Tuple fields are referenced positionally (`{0}`), named fields by name.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{ToTokens, format_ident, quote};
use syn::{Attribute, Data, DeriveInput, Fields, Lit, Meta, parse_macro_input};

pub fn derive_error(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match expand(&input) {
        Ok(tokens) => TokenStream::from(tokens),
        Err(err) => err.to_compile_error().into(),
    }
}

fn expand(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let body = match &input.data {
        Data::Enum(data) => {
            let arms = data
                .variants
                .iter()
                .map(|variant| {
                    let message = message(&variant.attrs, &variant.ident)?;
                    let ident = &variant.ident;
                    Ok(write_fields(quote! { Self::#ident }, &variant.fields, &message))
                })
                .collect::<syn::Result<Vec<_>>>()?;
            quote! {
                match self {
                    #(#arms)*
                }
            }
        }
        Data::Struct(data) => {
            let message = message(&input.attrs, &input.ident)?;
            let arm = write_fields(quote! { Self }, &data.fields, &message);
            quote! {
                match self {
                    #arm
                }
            }
        }
        Data::Union(_) => {
            return Err(syn::Error::new_spanned(
                input,
                "Error derive does not support unions",
            ));
        }
    };

    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();
    Ok(quote! {
        impl #impl_generics ::std::fmt::Display for #name #ty_generics #where_clause {
            #[allow(unused_variables)]
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                #body
            }
        }

        impl #impl_generics ::std::error::Error for #name #ty_generics #where_clause {}
    })
}

/// One `match` arm destructuring `fields` and writing `message`. Only the
/// fields the message mentions are passed as named arguments.
fn write_fields(path: TokenStream2, fields: &Fields, message: &str) -> TokenStream2 {
    match fields {
        Fields::Unit => quote! {
            #path => write!(f, #message),
        },
        Fields::Unnamed(unnamed) => {
            let names: Vec<_> = (0..unnamed.unnamed.len())
                .map(|i| format_ident!("f{}", i))
                .collect();
            let message = positional_to_named(message, names.len());
            let used = mentioned(&message, &names);
            quote! {
                #path(#(#names),*) => write!(f, #message #(, #used = #used)*),
            }
        }
        Fields::Named(named) => {
            let names: Vec<_> = named.named.iter().filter_map(|f| f.ident.clone()).collect();
            let used = mentioned(message, &names);
            quote! {
                #path { #(#names),* } => write!(f, #message #(, #used = #used)*),
            }
        }
    }
}

/// Reads the string literal out of `#[error("...")]`.
fn message<T: ToTokens>(attrs: &[Attribute], target: &T) -> syn::Result<String> {
    let attr = attrs
        .iter()
        .find(|attr| attr.path().is_ident("error"))
        .ok_or_else(|| {
            syn::Error::new_spanned(target, "missing #[error(\"...\")] display message")
        })?;

    let Meta::List(list) = &attr.meta else {
        return Err(syn::Error::new_spanned(
            &attr.meta,
            "expected #[error(\"message\")]",
        ));
    };
    match syn::parse2::<Lit>(list.tokens.clone()) {
        Ok(Lit::Str(lit)) => Ok(lit.value()),
        _ => Err(syn::Error::new_spanned(
            &attr.meta,
            "#[error] message must be a string literal",
        )),
    }
}

/// Rewrites `{0}`, `{1:?}`, ... into `{f0}`, `{f1:?}`, ...
fn positional_to_named(message: &str, count: usize) -> String {
    let mut result = message.to_string();
    for i in (0..count).rev() {
        result = result
            .replace(&format!("{{{i}}}"), &format!("{{f{i}}}"))
            .replace(&format!("{{{i}:"), &format!("{{f{i}:"));
    }
    result
}

/// The subset of `names` that appear as `{name}` or `{name:...}` in `message`.
fn mentioned<'a>(message: &str, names: &'a [syn::Ident]) -> Vec<&'a syn::Ident> {
    names
        .iter()
        .filter(|name| {
            let plain = format!("{{{name}}}");
            let spec = format!("{{{name}:");
            message.contains(&plain) || message.contains(&spec)
        })
        .collect()
}
