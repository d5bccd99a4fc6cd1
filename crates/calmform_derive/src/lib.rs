use proc_macro::TokenStream;
use proc_macro2::{Ident, Span, TokenStream as TokenStream2};
use proc_macro_crate::{FoundCrate, crate_name};
use quote::quote;
use syn::{Data, DeriveInput, Fields, LitStr, Path, parse_macro_input};

/// Implements `FieldRecord` and `ErrorPaths` for a struct with named fields.
///
/// Field values cross the boundary as `serde_json::Value`, so every exposed
/// field type must implement `Serialize` and `DeserializeOwned`.
///
/// Struct attributes:
/// - `#[form(extends = Parent)]` starts the error path table from `Parent`'s.
///
/// Field attributes:
/// - `#[form(error_path = "internal.path")]` reports errors on `internal.path`
///   under this field's name. Repeatable.
/// - `#[form(extra)]` marks a `serde_json::Map` that receives reads and
///   writes of unknown field names.
/// - `#[form(skip)]` hides the field from by-name access.
///
/// The generated table only takes effect once the model's
/// `FormModel::error_paths` returns `Self::declared_error_paths()`.
#[proc_macro_derive(FormFields, attributes(form))]
pub fn derive_form_fields(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match expand(input) {
        Ok(tokens) => tokens.into(),
        Err(error) => error.to_compile_error().into(),
    }
}

struct FieldSpec {
    ident: Ident,
    name: String,
    error_paths: Vec<LitStr>,
}

fn expand(input: DeriveInput) -> syn::Result<TokenStream2> {
    if !input.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            input.ident,
            "FormFields derive currently supports only non-generic structs",
        ));
    }

    let mut parent: Option<Path> = None;
    for attr in input.attrs.iter().filter(|attr| attr.path().is_ident("form")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("extends") {
                parent = Some(meta.value()?.parse()?);
                Ok(())
            } else {
                Err(meta.error("unsupported struct attribute, expected `extends`"))
            }
        })?;
    }

    let model_ident = input.ident;
    let named_fields = match input.data {
        Data::Struct(data) => match data.fields {
            Fields::Named(fields) => fields.named,
            _ => {
                return Err(syn::Error::new(
                    Span::call_site(),
                    "FormFields derive requires a struct with named fields",
                ));
            }
        },
        _ => {
            return Err(syn::Error::new(
                Span::call_site(),
                "FormFields derive is only supported on structs",
            ));
        }
    };

    let mut fields = Vec::new();
    let mut extra: Option<Ident> = None;
    for field in named_fields {
        let Some(field_ident) = field.ident else {
            continue;
        };
        let mut skip = false;
        let mut is_extra = false;
        let mut error_paths = Vec::new();
        for attr in field.attrs.iter().filter(|attr| attr.path().is_ident("form")) {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("error_path") {
                    error_paths.push(meta.value()?.parse::<LitStr>()?);
                    Ok(())
                } else if meta.path.is_ident("extra") {
                    is_extra = true;
                    Ok(())
                } else if meta.path.is_ident("skip") {
                    skip = true;
                    Ok(())
                } else {
                    Err(meta.error(
                        "unsupported field attribute, expected `error_path`, `extra` or `skip`",
                    ))
                }
            })?;
        }

        if is_extra {
            if extra.is_some() {
                return Err(syn::Error::new_spanned(
                    field_ident,
                    "only one field may be marked `#[form(extra)]`",
                ));
            }
            extra = Some(field_ident);
            continue;
        }
        if skip {
            continue;
        }
        fields.push(FieldSpec {
            name: field_ident.to_string(),
            ident: field_ident,
            error_paths,
        });
    }

    let calmform = calmform_path();
    let read_arms = fields.iter().map(|field| {
        let FieldSpec { ident, name, .. } = field;
        quote! {
            #name => #calmform::__private::serde_json::to_value(&self.#ident).ok(),
        }
    });
    let write_arms = fields.iter().map(|field| {
        let FieldSpec { ident, name, .. } = field;
        quote! {
            #name => {
                self.#ident = #calmform::__private::serde_json::from_value(value).map_err(
                    |error| #calmform::form::FieldWriteError::Type(error.to_string()),
                )?;
                Ok(())
            }
        }
    });
    let (read_fallback, write_fallback) = match &extra {
        Some(extra) => (
            quote!(self.#extra.get(field).cloned()),
            quote! {{
                self.#extra.insert(field.to_owned(), value);
                Ok(())
            }},
        ),
        None => (
            quote!(None),
            quote! {{
                let _ = value;
                Err(#calmform::form::FieldWriteError::Unknown)
            }},
        ),
    };

    let base_paths = match &parent {
        Some(parent) => quote! {
            #calmform::form::ErrorPathMap::inherit(
                <#parent as #calmform::form::ErrorPaths>::declared_error_paths(),
            )
        },
        None => quote!(#calmform::form::ErrorPathMap::new()),
    };
    let path_entries = fields.iter().flat_map(|field| {
        let name = &field.name;
        field
            .error_paths
            .iter()
            .map(move |internal| quote!(.map(#internal, #name)))
    });

    Ok(quote! {
        impl #calmform::form::FieldRecord for #model_ident {
            fn read_field(
                &self,
                field: &str,
            ) -> Option<#calmform::__private::serde_json::Value> {
                match field {
                    #(#read_arms)*
                    _ => #read_fallback,
                }
            }

            fn write_field(
                &mut self,
                field: &str,
                value: #calmform::__private::serde_json::Value,
            ) -> Result<(), #calmform::form::FieldWriteError> {
                match field {
                    #(#write_arms)*
                    _ => #write_fallback,
                }
            }
        }

        impl #calmform::form::ErrorPaths for #model_ident {
            fn declared_error_paths() -> #calmform::form::ErrorPathMap {
                #base_paths
                    #(#path_entries)*
            }
        }
    })
}

fn calmform_path() -> TokenStream2 {
    match crate_name("calmform") {
        Ok(FoundCrate::Name(name)) => {
            let ident = Ident::new(&name, Span::call_site());
            quote!(::#ident)
        }
        Ok(FoundCrate::Itself) | Err(_) => quote!(::calmform),
    }
}
