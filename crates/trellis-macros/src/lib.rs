use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote};
use syn::{parse_macro_input, Data, DeriveInput, Field, Fields, LitStr};

/// Derive `trellis_core::Properties` for a struct.
///
/// Fields marked `#[prop]` become settable properties under their own name;
/// `#[prop(rename = "...")]` exposes them under another one. Unmarked fields
/// are left alone.
#[proc_macro_derive(Properties, attributes(prop))]
pub fn derive_properties(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match expand(&input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

fn expand(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let ident = &input.ident;
    if !input.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &input.generics,
            "Properties cannot be derived for generic types",
        ));
    }
    let fields: Vec<&Field> = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(named) => named.named.iter().collect(),
            Fields::Unit => Vec::new(),
            Fields::Unnamed(_) => {
                return Err(syn::Error::new_spanned(
                    ident,
                    "Properties requires named fields",
                ))
            }
        },
        _ => {
            return Err(syn::Error::new_spanned(
                ident,
                "Properties can only be derived for structs",
            ))
        }
    };

    let mut setters = Vec::new();
    let mut descriptors = Vec::new();
    for field in fields {
        let Some(name) = property_name(field)? else {
            continue;
        };
        let Some(field_ident) = field.ident.as_ref() else {
            continue;
        };
        let setter = format_ident!("__set_{}", field_ident);
        let ty = &field.ty;
        setters.push(quote! {
            fn #setter(
                target: &mut #ident,
                value: &trellis_core::Value,
            ) -> ::core::result::Result<(), trellis_core::PropertyError> {
                target.#field_ident = <#ty as trellis_core::FromValue>::from_value(value)?;
                ::core::result::Result::Ok(())
            }
        });
        descriptors.push(quote! {
            trellis_core::PropertyDescriptor { name: #name, set: #setter }
        });
    }

    Ok(quote! {
        impl trellis_core::Properties for #ident {
            fn descriptors() -> &'static [trellis_core::PropertyDescriptor<Self>] {
                #(#setters)*
                const DESCRIPTORS: &[trellis_core::PropertyDescriptor<#ident>] = &[#(#descriptors),*];
                DESCRIPTORS
            }
        }
    })
}

fn property_name(field: &Field) -> syn::Result<Option<String>> {
    let Some(attr) = field.attrs.iter().find(|attr| attr.path().is_ident("prop")) else {
        return Ok(None);
    };
    let mut name = field
        .ident
        .as_ref()
        .map(|ident| ident.to_string().trim_start_matches("r#").to_owned());
    if let syn::Meta::List(_) = &attr.meta {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("rename") {
                let renamed: LitStr = meta.value()?.parse()?;
                name = Some(renamed.value());
                Ok(())
            } else {
                Err(meta.error("expected `rename = \"...\"`"))
            }
        })?;
    }
    Ok(name)
}
