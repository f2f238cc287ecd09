use proc_macro2::TokenStream;
use quote::{format_ident, quote};
use syn::{Data, DataEnum, DataStruct, DeriveInput, Fields, Index};

pub fn expand(input: &DeriveInput) -> Result<TokenStream, syn::Error> {
    crate::check_supported(input)?;
    let name = &input.ident;
    let body = match &input.data {
        Data::Struct(data) => struct_body(data),
        Data::Enum(data) => {
            crate::check_variant_count(input, data)?;
            enum_body(input, data)
        }
        Data::Union(_) => unreachable!("rejected by check_supported"),
    };
    Ok(quote! {
        impl CanonicalSerialize for #name {
            fn canonical_serialize<W: std::io::Write>(
                &self,
                mut target: W,
            ) -> Result<(), std::io::Error> {
                #body
                Ok(())
            }
        }
    })
}

fn struct_body(data: &DataStruct) -> TokenStream {
    let writes = data
        .fields
        .iter()
        .enumerate()
        .map(|(position, field)| match &field.ident {
            Some(name) => quote! { self.#name.canonical_serialize(&mut target)?; },
            None => {
                let index = Index::from(position);
                quote! { self.#index.canonical_serialize(&mut target)?; }
            }
        });
    quote! { #(#writes)* }
}

fn enum_body(input: &DeriveInput, data: &DataEnum) -> TokenStream {
    let name = &input.ident;
    let arms = data.variants.iter().enumerate().map(|(position, variant)| {
        let tag = position as u8;
        let ident = &variant.ident;
        match &variant.fields {
            Fields::Unit => quote! {
                #name::#ident => #tag.canonical_serialize(&mut target)?,
            },
            Fields::Unnamed(fields) => {
                let bindings: Vec<_> = (0..fields.unnamed.len())
                    .map(|position| format_ident!("field{}", position))
                    .collect();
                quote! {
                    #name::#ident(#(ref #bindings),*) => {
                        #tag.canonical_serialize(&mut target)?;
                        #(#bindings.canonical_serialize(&mut target)?;)*
                    }
                }
            }
            Fields::Named(fields) => {
                let bindings: Vec<_> = fields
                    .named
                    .iter()
                    .map(|field| field.ident.clone().expect("named fields have idents"))
                    .collect();
                quote! {
                    #name::#ident { #(ref #bindings),* } => {
                        #tag.canonical_serialize(&mut target)?;
                        #(#bindings.canonical_serialize(&mut target)?;)*
                    }
                }
            }
        }
    });
    quote! {
        match *self {
            #(#arms)*
        }
    }
}
