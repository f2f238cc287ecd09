use proc_macro2::TokenStream;
use quote::quote;
use syn::{Data, DataEnum, DataStruct, DeriveInput, Fields};

pub fn expand(input: &DeriveInput) -> Result<TokenStream, syn::Error> {
    crate::check_supported(input)?;
    let name = &input.ident;
    let body = match &input.data {
        Data::Struct(data) => struct_body(input, data),
        Data::Enum(data) => {
            crate::check_variant_count(input, data)?;
            enum_body(input, data)
        }
        Data::Union(_) => unreachable!("rejected by check_supported"),
    };
    Ok(quote! {
        impl CanonicalDeserialize for #name {
            fn canonical_deserialize<R: std::io::Read>(
                mut reader: R,
            ) -> Result<Self, SerializationError> {
                #body
            }
        }
    })
}

/// A constructor expression for `path`, reading every field from `reader`
/// in declaration order.
fn construction(path: TokenStream, fields: &Fields) -> TokenStream {
    match fields {
        Fields::Unit => quote! { #path },
        Fields::Unnamed(fields) => {
            let reads = fields.unnamed.iter().map(|field| {
                let ty = &field.ty;
                quote! { <#ty as CanonicalDeserialize>::canonical_deserialize(&mut reader)? }
            });
            quote! { #path(#(#reads),*) }
        }
        Fields::Named(fields) => {
            let reads = fields.named.iter().map(|field| {
                let name = field.ident.as_ref().expect("named fields have idents");
                let ty = &field.ty;
                quote! {
                    #name: <#ty as CanonicalDeserialize>::canonical_deserialize(&mut reader)?
                }
            });
            quote! { #path { #(#reads),* } }
        }
    }
}

fn struct_body(input: &DeriveInput, data: &DataStruct) -> TokenStream {
    let name = &input.ident;
    let construct = construction(quote! { #name }, &data.fields);
    quote! { Ok(#construct) }
}

fn enum_body(input: &DeriveInput, data: &DataEnum) -> TokenStream {
    let name = &input.ident;
    let arms = data.variants.iter().enumerate().map(|(position, variant)| {
        let tag = position as u8;
        let ident = &variant.ident;
        let construct = construction(quote! { #name::#ident }, &variant.fields);
        quote! { #tag => Ok(#construct), }
    });
    quote! {
        match u8::canonical_deserialize(&mut reader)? {
            #(#arms)*
            _ => Err(SerializationError::Parse("unknown enum variant tag")),
        }
    }
}
