//! Procedural macros for the docsql project.
//!
//! This crate provides compile-time code generation for the docsql framework,
//! enabling ergonomic derive macros and other compile-time utilities.

use proc_macro::TokenStream;
use proc_macro2::Span;
use quote::quote;
use syn::{Data, DeriveInput, Fields, Ident, LitStr, parse_macro_input};

/// Derives `docsql::document::Document` for a struct with named fields.
///
/// The id is the field marked `#[id]`, or else the field named `id`. The
/// collection name comes from `#[document(name = "...")]` and defaults to the
/// struct name in snake case.
///
/// ```ignore
/// #[derive(Debug, Serialize, Deserialize, Document)]
/// #[document(name = "users")]
/// pub struct User {
///     #[id]
///     pub key: Uuid,
///     pub user_name: String,
/// }
/// ```
#[proc_macro_derive(Document, attributes(document, id))]
pub fn derive_document(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    expand_document(input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

fn expand_document(input: DeriveInput) -> syn::Result<proc_macro2::TokenStream> {
    let name = &input.ident;
    let collection = collection_name(&input)?;

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => &fields.named,
            _ => {
                return Err(syn::Error::new_spanned(
                    name,
                    "Document can only be derived for structs with named fields",
                ));
            }
        },
        _ => {
            return Err(syn::Error::new_spanned(
                name,
                "Document can only be derived for structs",
            ));
        }
    };

    let marked = fields
        .iter()
        .filter(|field| field.attrs.iter().any(|attr| attr.path().is_ident("id")))
        .collect::<Vec<_>>();
    if marked.len() > 1 {
        return Err(syn::Error::new_spanned(
            marked[1],
            "only one field may be marked #[id]",
        ));
    }

    let id_field = marked
        .first()
        .copied()
        .or_else(|| {
            fields
                .iter()
                .find(|field| field.ident.as_ref().is_some_and(|ident| ident == "id"))
        })
        .ok_or_else(|| {
            syn::Error::new_spanned(name, "Document needs a field named `id` or marked #[id]")
        })?;

    let id_ident = &id_field.ident;
    let id_type = &id_field.ty;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    Ok(quote! {
        impl #impl_generics ::docsql::document::Document for #name #ty_generics #where_clause {
            type Id = #id_type;

            fn id(&self) -> Self::Id {
                ::std::clone::Clone::clone(&self.#id_ident)
            }

            fn set_id(&mut self, id: Self::Id) {
                self.#id_ident = id;
            }

            fn collection_name() -> &'static str {
                #collection
            }
        }
    })
}

fn collection_name(input: &DeriveInput) -> syn::Result<LitStr> {
    let mut collection = None;

    for attr in input.attrs.iter().filter(|attr| attr.path().is_ident("document")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("name") {
                collection = Some(meta.value()?.parse::<LitStr>()?);
                Ok(())
            } else {
                Err(meta.error("unsupported document attribute, expected `name`"))
            }
        })?;
    }

    Ok(collection.unwrap_or_else(|| LitStr::new(&snake_case(&input.ident), Span::call_site())))
}

fn snake_case(ident: &Ident) -> String {
    let mut out = String::new();

    for (index, ch) in ident.to_string().chars().enumerate() {
        if ch.is_uppercase() {
            if index > 0 {
                out.push('_');
            }
            out.extend(ch.to_lowercase());
        } else {
            out.push(ch);
        }
    }

    out
}
