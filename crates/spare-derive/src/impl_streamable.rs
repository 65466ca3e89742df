use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote};
use syn::{parse_macro_input, Data, DataEnum, DeriveInput, Fields, Ident};

pub(crate) fn impl_streamable(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let body = match &input.data {
        Data::Struct(data) => impl_struct(&data.fields),
        Data::Enum(data) => match impl_enum(name, data) {
            Ok(body) => body,
            Err(error) => return error.to_compile_error().into(),
        },
        Data::Union(_) => {
            return syn::Error::new_spanned(&input, "Streamable cannot be derived for unions")
                .to_compile_error()
                .into();
        }
    };

    let (stream, parse) = body;

    quote! {
        impl #impl_generics spare_protocol::Streamable for #name #ty_generics #where_clause {
            fn stream(&self, out: &mut ::std::vec::Vec<u8>) {
                #stream
            }

            fn parse(
                input: &mut ::std::io::Cursor<&[u8]>,
            ) -> spare_protocol::StreamResult<Self> {
                #parse
            }
        }
    }
    .into()
}

fn impl_struct(fields: &Fields) -> (TokenStream2, TokenStream2) {
    match fields {
        Fields::Named(fields) => {
            let names: Vec<&Ident> = fields
                .named
                .iter()
                .filter_map(|field| field.ident.as_ref())
                .collect();

            (
                quote! {
                    #( spare_protocol::Streamable::stream(&self.#names, out); )*
                },
                quote! {
                    Ok(Self {
                        #( #names: spare_protocol::Streamable::parse(input)?, )*
                    })
                },
            )
        }
        Fields::Unnamed(fields) => {
            let indices: Vec<syn::Index> = (0..fields.unnamed.len()).map(syn::Index::from).collect();
            let parses = indices
                .iter()
                .map(|_| quote!(spare_protocol::Streamable::parse(input)?));

            (
                quote! {
                    #( spare_protocol::Streamable::stream(&self.#indices, out); )*
                },
                quote! {
                    Ok(Self( #( #parses, )* ))
                },
            )
        }
        Fields::Unit => (quote!(let _ = out;), quote!(let _ = input; Ok(Self))),
    }
}

fn impl_enum(name: &Ident, data: &DataEnum) -> syn::Result<(TokenStream2, TokenStream2)> {
    if data.variants.len() > usize::from(u8::MAX) + 1 {
        return Err(syn::Error::new_spanned(
            name,
            "Streamable enums are limited to 256 variants",
        ));
    }

    let mut stream_arms = Vec::new();
    let mut parse_arms = Vec::new();

    for (index, variant) in data.variants.iter().enumerate() {
        let tag = u8::try_from(index).map_err(|_| {
            syn::Error::new_spanned(variant, "discriminant does not fit in a byte")
        })?;
        let ident = &variant.ident;

        match &variant.fields {
            Fields::Named(fields) => {
                let names: Vec<&Ident> = fields
                    .named
                    .iter()
                    .filter_map(|field| field.ident.as_ref())
                    .collect();

                stream_arms.push(quote! {
                    Self::#ident { #( #names ),* } => {
                        out.push(#tag);
                        #( spare_protocol::Streamable::stream(#names, out); )*
                    }
                });
                parse_arms.push(quote! {
                    #tag => Ok(Self::#ident {
                        #( #names: spare_protocol::Streamable::parse(input)?, )*
                    }),
                });
            }
            Fields::Unnamed(fields) => {
                let bindings: Vec<Ident> = (0..fields.unnamed.len())
                    .map(|i| format_ident!("field_{}", i))
                    .collect();
                let parses = bindings
                    .iter()
                    .map(|_| quote!(spare_protocol::Streamable::parse(input)?));

                stream_arms.push(quote! {
                    Self::#ident( #( #bindings ),* ) => {
                        out.push(#tag);
                        #( spare_protocol::Streamable::stream(#bindings, out); )*
                    }
                });
                parse_arms.push(quote! {
                    #tag => Ok(Self::#ident( #( #parses, )* )),
                });
            }
            Fields::Unit => {
                stream_arms.push(quote! {
                    Self::#ident => out.push(#tag),
                });
                parse_arms.push(quote! {
                    #tag => Ok(Self::#ident),
                });
            }
        }
    }

    let type_name = name.to_string();

    Ok((
        quote! {
            match self {
                #( #stream_arms )*
            }
        },
        quote! {
            let tag = <u8 as spare_protocol::Streamable>::parse(input)?;
            match tag {
                #( #parse_arms )*
                value => Err(spare_protocol::StreamError::InvalidDiscriminant {
                    ty: #type_name,
                    value,
                }),
            }
        },
    ))
}
