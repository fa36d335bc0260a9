use proc_macro::TokenStream;
use proc_macro2::{Ident, Span, TokenStream as TokenStream2};
use proc_macro_crate::{FoundCrate, crate_name};
use quote::quote;
use syn::{Data, DeriveInput, Fields, LitStr, parse_macro_input};

/// Derives `FormValues` and `ModelField` for a struct with named fields.
///
/// Each field becomes one key of the model-value map. The key defaults to the
/// field name and can be changed with `#[form(rename = "key")]`.
#[proc_macro_derive(FormValues, attributes(form))]
pub fn derive_form_values(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    if !input.generics.params.is_empty() {
        return syn::Error::new_spanned(
            input.ident,
            "FormValues derive currently supports only non-generic structs",
        )
        .to_compile_error()
        .into();
    }

    let model_ident = input.ident;

    let named_fields = match input.data {
        Data::Struct(data) => match data.fields {
            Fields::Named(fields) => fields.named,
            _ => {
                return syn::Error::new(
                    Span::call_site(),
                    "FormValues derive requires a struct with named fields",
                )
                .to_compile_error()
                .into();
            }
        },
        _ => {
            return syn::Error::new(
                Span::call_site(),
                "FormValues derive is only supported on structs",
            )
            .to_compile_error()
            .into();
        }
    };

    let formation = formation_path();
    let mut writes = Vec::new();
    let mut reads = Vec::new();

    for field in named_fields {
        let Some(field_ident) = field.ident else {
            continue;
        };
        let key = match model_key(&field.attrs) {
            Ok(Some(key)) => key,
            Ok(None) => field_ident.to_string(),
            Err(error) => return error.to_compile_error().into(),
        };
        let field_ty = field.ty;

        writes.push(quote! {
            values.insert(
                ::std::string::String::from(#key),
                <#field_ty as #formation::ModelField>::to_model_value(&self.#field_ident),
            );
        });
        reads.push(quote! {
            #field_ident: <#field_ty as #formation::ModelField>::from_model_value(
                values.get(#key).unwrap_or(&#formation::ModelValue::Null),
            )?,
        });
    }

    quote! {
        impl #formation::FormValues for #model_ident {
            fn to_model_values(&self) -> #formation::ModelValue {
                let mut values = ::std::collections::BTreeMap::new();
                #(#writes)*
                #formation::ModelValue::Map(values)
            }

            fn from_model_values(value: &#formation::ModelValue) -> ::std::option::Option<Self> {
                let values = value.as_map()?;
                ::std::option::Option::Some(Self {
                    #(#reads)*
                })
            }
        }

        impl #formation::ModelField for #model_ident {
            fn to_model_value(&self) -> #formation::ModelValue {
                #formation::FormValues::to_model_values(self)
            }

            fn from_model_value(value: &#formation::ModelValue) -> ::std::option::Option<Self> {
                <Self as #formation::FormValues>::from_model_values(value)
            }
        }
    }
    .into()
}

fn model_key(attrs: &[syn::Attribute]) -> syn::Result<Option<String>> {
    let mut key = None;
    for attr in attrs {
        if !attr.path().is_ident("form") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("rename") {
                let value: LitStr = meta.value()?.parse()?;
                key = Some(value.value());
                Ok(())
            } else {
                Err(meta.error("unsupported form attribute, expected `rename`"))
            }
        })?;
    }
    Ok(key)
}

fn formation_path() -> TokenStream2 {
    match crate_name("formation") {
        Ok(FoundCrate::Name(name)) => {
            let ident = Ident::new(&name, Span::call_site());
            quote!(::#ident)
        }
        // The crate re-exports itself as `formation`, so the absolute path
        // also resolves inside its own unit and integration tests.
        Ok(FoundCrate::Itself) | Err(_) => quote!(::formation),
    }
}
