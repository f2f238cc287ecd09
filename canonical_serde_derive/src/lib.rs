//! Derive macros for the canonical codec traits.
//!
//! `#[derive(CanonSerialize)]` and `#[derive(CanonDeserialize)]` generate
//! field-order codecs:
//!
//! * struct fields are encoded in declaration order, with nothing in
//!   between;
//! * enums are encoded as a 1-byte variant tag — the variant's declaration
//!   index — followed by the variant's fields in order. Decoding an unknown
//!   tag is a parse error.
//!
//! Sum types whose wire tags are *not* their declaration indexes (the
//! condition and fulfillment trees reserve retired tag values) keep
//! hand-written codecs instead of this derive.
//!
//! The expansion names `CanonicalSerialize`, `CanonicalDeserialize`, and
//! `SerializationError` unqualified, so the derive site must have all three
//! in scope.

extern crate proc_macro;

use proc_macro::TokenStream;
use syn::{parse_macro_input, DeriveInput};

mod deserialize;
mod serialize;

#[proc_macro_derive(CanonSerialize)]
pub fn derive_canon_serialize(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    serialize::expand(&input)
        .unwrap_or_else(|err| err.to_compile_error())
        .into()
}

#[proc_macro_derive(CanonDeserialize)]
pub fn derive_canon_deserialize(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    deserialize::expand(&input)
        .unwrap_or_else(|err| err.to_compile_error())
        .into()
}

/// Shared front-door checks: the codecs are only derivable for plain,
/// non-generic data types.
fn check_supported(input: &DeriveInput) -> Result<(), syn::Error> {
    if !input.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &input.generics,
            "canonical codecs cannot be derived for generic types",
        ));
    }
    if let syn::Data::Union(_) = input.data {
        return Err(syn::Error::new_spanned(
            &input.ident,
            "canonical codecs cannot be derived for unions",
        ));
    }
    Ok(())
}

/// Enum variant tags are a single byte.
fn check_variant_count(input: &DeriveInput, data: &syn::DataEnum) -> Result<(), syn::Error> {
    if data.variants.len() > usize::from(u8::max_value()) + 1 {
        return Err(syn::Error::new_spanned(
            &input.ident,
            "enums with more than 256 variants cannot carry a 1-byte tag",
        ));
    }
    Ok(())
}
