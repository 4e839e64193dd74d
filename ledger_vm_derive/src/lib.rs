//! Derive macros for the `ledger_vm` crate.
//!
//! - `#[derive(BinaryCodec)]`: deterministic binary `Encode`/`Decode`
//! - `#[derive(Error)]`: `Display` + `std::error::Error` from `#[error("...")]`

mod binary_codec;
mod error;

use proc_macro::TokenStream;

/// Implements `crate::types::encoding::{Encode, Decode}` field by field.
#[proc_macro_derive(BinaryCodec, attributes(binary_codec))]
pub fn derive_binary_codec(input: TokenStream) -> TokenStream {
    binary_codec::derive_binary_codec(input)
}

/// Implements `Display` and `Error` from per-variant `#[error("...")]` messages.
#[proc_macro_derive(Error, attributes(error))]
pub fn derive_error(input: TokenStream) -> TokenStream {
    error::derive_error(input)
}
