//! `#[derive(BinaryCodec)]`: field-by-field `Encode`/`Decode` implementations.
//!
//! Structs encode their fields in declaration order. Enums encode a `u8` tag
//! (explicit discriminants are honoured) followed by the variant's fields.
//! Generated code refers to `crate::types::encoding`, so the derive is only
//! usable inside the `ledger_vm` crate.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote};
use syn::{Data, DataEnum, DeriveInput, Fields, parse_macro_input};

pub fn derive_binary_codec(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match expand(&input) {
        Ok(tokens) => TokenStream::from(tokens),
        Err(err) => err.to_compile_error().into(),
    }
}

fn expand(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let (encode_body, decode_body) = match &input.data {
        Data::Struct(data) => struct_bodies(&data.fields),
        Data::Enum(data) => enum_bodies(data)?,
        Data::Union(_) => {
            return Err(syn::Error::new_spanned(
                input,
                "BinaryCodec derive does not support unions",
            ));
        }
    };

    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    Ok(quote! {
        impl #impl_generics crate::types::encoding::Encode for #name #ty_generics #where_clause {
            #[allow(unused_variables)]
            fn encode<S: crate::types::encoding::EncodeSink>(&self, out: &mut S) {
                #encode_body
            }
        }

        impl #impl_generics crate::types::encoding::Decode for #name #ty_generics #where_clause {
            #[allow(unused_variables)]
            fn decode(input: &mut &[u8]) -> ::std::result::Result<Self, crate::types::encoding::DecodeError> {
                #decode_body
            }
        }
    })
}

/// Bindings used to destructure a set of fields: `f0, f1, ...` for tuples,
/// the field names themselves for named fields.
fn bindings(fields: &Fields) -> Vec<syn::Ident> {
    match fields {
        Fields::Named(named) => named
            .named
            .iter()
            .filter_map(|f| f.ident.clone())
            .collect(),
        Fields::Unnamed(unnamed) => (0..unnamed.unnamed.len())
            .map(|i| format_ident!("f{}", i))
            .collect(),
        Fields::Unit => Vec::new(),
    }
}

/// Destructuring pattern (`{ a, b }`, `(f0, f1)` or nothing).
fn pattern(fields: &Fields, names: &[syn::Ident]) -> TokenStream2 {
    match fields {
        Fields::Named(_) => quote! { { #(#names),* } },
        Fields::Unnamed(_) => quote! { ( #(#names),* ) },
        Fields::Unit => quote! {},
    }
}

/// Constructor expression decoding every field in order.
fn constructor(path: TokenStream2, fields: &Fields) -> TokenStream2 {
    let decode = quote! { crate::types::encoding::Decode::decode(input)? };
    match fields {
        Fields::Named(named) => {
            let names = named.named.iter().map(|f| &f.ident);
            quote! { #path { #( #names: #decode, )* } }
        }
        Fields::Unnamed(unnamed) => {
            let values = (0..unnamed.unnamed.len()).map(|_| decode.clone());
            quote! { #path ( #( #values, )* ) }
        }
        Fields::Unit => path,
    }
}

fn struct_bodies(fields: &Fields) -> (TokenStream2, TokenStream2) {
    let names = bindings(fields);
    let pat = pattern(fields, &names);
    let encode = quote! {
        let Self #pat = self;
        #( crate::types::encoding::Encode::encode(#names, out); )*
    };
    let ctor = constructor(quote! { Self }, fields);
    (encode, quote! { Ok(#ctor) })
}

fn enum_bodies(data: &DataEnum) -> syn::Result<(TokenStream2, TokenStream2)> {
    let tags = discriminants(data)?;

    let mut encode_arms = Vec::with_capacity(tags.len());
    let mut decode_arms = Vec::with_capacity(tags.len());
    for (variant, tag) in data.variants.iter().zip(tags) {
        let ident = &variant.ident;
        let names = bindings(&variant.fields);
        let pat = pattern(&variant.fields, &names);
        encode_arms.push(quote! {
            Self::#ident #pat => {
                crate::types::encoding::Encode::encode(&#tag, out);
                #( crate::types::encoding::Encode::encode(#names, out); )*
            }
        });
        let ctor = constructor(quote! { Self::#ident }, &variant.fields);
        decode_arms.push(quote! { #tag => Ok(#ctor), });
    }

    let encode = quote! {
        match self {
            #(#encode_arms)*
        }
    };
    let decode = quote! {
        let tag: u8 = crate::types::encoding::Decode::decode(input)?;
        match tag {
            #(#decode_arms)*
            _ => Err(crate::types::encoding::DecodeError::InvalidValue),
        }
    };
    Ok((encode, decode))
}

/// Wire tag of every variant: the explicit discriminant when present,
/// otherwise one past the previous variant's tag.
fn discriminants(data: &DataEnum) -> syn::Result<Vec<u8>> {
    let mut tags = Vec::with_capacity(data.variants.len());
    let mut next: u16 = 0;
    for variant in &data.variants {
        let tag = match &variant.discriminant {
            Some((_, expr)) => literal_tag(expr)?,
            None => u8::try_from(next).map_err(|_| {
                syn::Error::new_spanned(variant, "enum has more than 256 variants")
            })?,
        };
        tags.push(tag);
        next = u16::from(tag) + 1;
    }
    Ok(tags)
}

fn literal_tag(expr: &syn::Expr) -> syn::Result<u8> {
    if let syn::Expr::Lit(lit) = expr
        && let syn::Lit::Int(int) = &lit.lit
    {
        return int.base10_parse::<u8>();
    }
    Err(syn::Error::new_spanned(
        expr,
        "BinaryCodec discriminants must be integer literals fitting in a u8",
    ))
}
