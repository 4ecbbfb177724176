//! Proc macros for response schema generation.
//!
//! Provides `#[derive(Schema)]` to generate the JSON schema a content
//! backend is asked to fill, straight from the Rust type that will
//! deserialize its answer.
//!
//! # Example
//!
//! ```ignore
//! /// One generated story turn
//! #[derive(Schema, Deserialize)]
//! #[schema(name = "story_turn", rename_all = "camelCase")]
//! struct TurnResponse {
//!     /// Narrative prose for this turn
//!     text: String,
//!     /// Choices offered to the reader
//!     choices: Vec<String>,
//!     /// Optional scene description for illustration
//!     visual_prompt: Option<String>,
//! }
//!
//! /// Emotional tone of a segment
//! #[derive(Schema, Deserialize)]
//! #[schema(rename_all = "lowercase")]
//! enum Mood { Calm, Tense }
//! ```

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{parse_macro_input, Attribute, DeriveInput, Field, Lit, Meta, Type};

/// Derive macro for JSON schema generation.
///
/// # Attributes
///
/// - `#[schema(name = "...")]` - Override the schema name (defaults to snake_case type name)
/// - `#[schema(rename_all = "camelCase" | "snake_case" | "lowercase")]` - Field/variant casing
/// - `#[schema(optional)]` on fields - Mark field as optional in the schema
/// - `#[schema(rename = "...")]` on fields - Override field name in the schema
/// - `#[schema(skip)]` on fields - Leave the field out of the schema entirely
///
/// Structs with named fields become `object` schemas. Enums with only unit
/// variants become `string` schemas with an `enum` list. Any field type that
/// is not a primitive, `String`, `Option<T>`, `Vec<T>` or a map is expected to
/// derive `Schema` itself; its `json_schema()` is embedded.
#[proc_macro_derive(Schema, attributes(schema))]
pub fn derive_schema(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    expand_schema(input)
        .unwrap_or_else(|err| err.to_compile_error())
        .into()
}

fn expand_schema(input: DeriveInput) -> syn::Result<TokenStream2> {
    let type_name = &input.ident;
    let schema_name = container_value(&input.attrs, "name")?
        .unwrap_or_else(|| to_snake_case(&input.ident.to_string()));
    let casing = Casing::parse(container_value(&input.attrs, "rename_all")?.as_deref(), &input)?;
    let description = get_doc_comment(&input.attrs);

    let body = match &input.data {
        syn::Data::Struct(data) => match &data.fields {
            syn::Fields::Named(named) => expand_struct(named.named.iter(), casing)?,
            _ => {
                return Err(syn::Error::new_spanned(
                    &input,
                    "Schema derive only supports structs with named fields",
                ))
            }
        },
        syn::Data::Enum(data) => {
            let mut values = Vec::new();
            for variant in &data.variants {
                if !matches!(variant.fields, syn::Fields::Unit) {
                    return Err(syn::Error::new_spanned(
                        variant,
                        "Schema derive only supports enums with unit variants",
                    ));
                }
                let name = field_value(&variant.attrs, "rename")?
                    .unwrap_or_else(|| casing.apply(&variant.ident.to_string()));
                values.push(name);
            }
            quote! {
                let values: Vec<&str> = vec![#(#values),*];
                let mut schema = serde_json::json!({
                    "type": "string",
                    "enum": values
                });
                if !#description.is_empty() {
                    schema["description"] = serde_json::json!(#description);
                }
                schema
            }
        }
        syn::Data::Union(_) => {
            return Err(syn::Error::new_spanned(&input, "Schema derive does not support unions"))
        }
    };

    Ok(quote! {
        impl #type_name {
            /// Get the schema name.
            pub fn schema_name() -> &'static str {
                #schema_name
            }

            /// Get the schema description.
            pub fn schema_description() -> &'static str {
                #description
            }

            /// Generate the JSON schema for this type.
            pub fn json_schema() -> serde_json::Value {
                #body
            }
        }
    })
}

fn expand_struct<'a>(
    fields: impl Iterator<Item = &'a Field>,
    casing: Casing,
) -> syn::Result<TokenStream2> {
    let mut property_tokens = Vec::new();
    let mut required_fields = Vec::new();

    for field in fields {
        if has_flag(&field.attrs, "skip") {
            continue;
        }
        let field_name_str = match field_value(&field.attrs, "rename")? {
            Some(name) => name,
            None => {
                let ident = field
                    .ident
                    .as_ref()
                    .ok_or_else(|| syn::Error::new_spanned(field, "expected a named field"))?;
                casing.apply(ident.to_string().trim_start_matches("r#"))
            }
        };
        let field_desc = get_doc_comment(&field.attrs);
        let type_schema = type_to_schema(&field.ty)?;

        let desc_token = if field_desc.is_empty() {
            quote! {}
        } else {
            quote! { property["description"] = serde_json::json!(#field_desc); }
        };

        property_tokens.push(quote! {
            {
                let mut property = #type_schema;
                #desc_token
                properties.insert(#field_name_str.to_string(), property);
            }
        });

        if !has_flag(&field.attrs, "optional") && !is_option_type(&field.ty) {
            required_fields.push(field_name_str);
        }
    }

    Ok(quote! {
        let mut properties = serde_json::Map::new();
        #(#property_tokens)*

        let required: Vec<&str> = vec![#(#required_fields),*];

        serde_json::json!({
            "type": "object",
            "properties": properties,
            "required": required
        })
    })
}

#[derive(Clone, Copy)]
enum Casing {
    Unchanged,
    Camel,
    Snake,
    Lower,
}

impl Casing {
    fn parse(value: Option<&str>, input: &DeriveInput) -> syn::Result<Self> {
        match value {
            None => Ok(Casing::Unchanged),
            Some("camelCase") => Ok(Casing::Camel),
            Some("snake_case") => Ok(Casing::Snake),
            Some("lowercase") => Ok(Casing::Lower),
            Some(other) => Err(syn::Error::new_spanned(
                input,
                format!("unsupported rename_all value: {other}"),
            )),
        }
    }

    /// Field idents arrive in snake_case, variant idents in PascalCase.
    fn apply(self, ident: &str) -> String {
        match self {
            Casing::Unchanged => ident.to_string(),
            Casing::Lower => ident.to_lowercase(),
            Casing::Snake => {
                if ident.contains('_') {
                    ident.to_string()
                } else {
                    to_snake_case(ident)
                }
            }
            Casing::Camel => to_camel_case(&to_snake_case(ident)),
        }
    }
}

/// Read `#[schema(key = "value")]` from a list of attributes.
fn container_value(attrs: &[Attribute], key: &str) -> syn::Result<Option<String>> {
    for attr in attrs {
        if !attr.path().is_ident("schema") {
            continue;
        }
        let mut found = None;
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident(key) {
                let lit: Lit = meta.value()?.parse()?;
                if let Lit::Str(s) = lit {
                    found = Some(s.value());
                }
            } else if meta.input.peek(syn::Token![=]) {
                // Skip values belonging to other keys.
                let _: Lit = meta.value()?.parse()?;
            }
            Ok(())
        })?;
        if found.is_some() {
            return Ok(found);
        }
    }
    Ok(None)
}

fn field_value(attrs: &[Attribute], key: &str) -> syn::Result<Option<String>> {
    container_value(attrs, key)
}

fn has_flag(attrs: &[Attribute], flag: &str) -> bool {
    attrs.iter().any(|attr| {
        if !attr.path().is_ident("schema") {
            return false;
        }
        let mut present = false;
        let _ = attr.parse_nested_meta(|meta| {
            if meta.path.is_ident(flag) {
                present = true;
            } else if meta.input.peek(syn::Token![=]) {
                let _: Lit = meta.value()?.parse()?;
            }
            Ok(())
        });
        present
    })
}

fn get_doc_comment(attrs: &[Attribute]) -> String {
    let mut docs = Vec::new();
    for attr in attrs {
        if attr.path().is_ident("doc") {
            if let Meta::NameValue(nv) = &attr.meta {
                if let syn::Expr::Lit(expr_lit) = &nv.value {
                    if let Lit::Str(s) = &expr_lit.lit {
                        docs.push(s.value().trim().to_string());
                    }
                }
            }
        }
    }
    docs.join(" ")
}

fn is_option_type(ty: &Type) -> bool {
    if let Type::Path(type_path) = ty {
        if let Some(segment) = type_path.path.segments.last() {
            return segment.ident == "Option";
        }
    }
    false
}

fn first_generic(segment: &syn::PathSegment) -> Option<&Type> {
    if let syn::PathArguments::AngleBracketed(args) = &segment.arguments {
        if let Some(syn::GenericArgument::Type(inner)) = args.args.first() {
            return Some(inner);
        }
    }
    None
}

fn type_to_schema(ty: &Type) -> syn::Result<TokenStream2> {
    Ok(match ty {
        Type::Path(type_path) => {
            let Some(segment) = type_path.path.segments.last() else {
                return Ok(quote! { serde_json::json!({}) });
            };

            match segment.ident.to_string().as_str() {
                "String" | "str" => quote! { serde_json::json!({"type": "string"}) },
                "i8" | "i16" | "i32" | "i64" | "isize" | "u8" | "u16" | "u32" | "u64"
                | "usize" => {
                    quote! { serde_json::json!({"type": "integer"}) }
                }
                "f32" | "f64" => quote! { serde_json::json!({"type": "number"}) },
                "bool" => quote! { serde_json::json!({"type": "boolean"}) },
                "Option" | "Box" => match first_generic(segment) {
                    Some(inner) => type_to_schema(inner)?,
                    None => quote! { serde_json::json!({}) },
                },
                "Vec" => match first_generic(segment) {
                    Some(inner) => {
                        let inner_schema = type_to_schema(inner)?;
                        quote! {
                            serde_json::json!({
                                "type": "array",
                                "items": #inner_schema
                            })
                        }
                    }
                    None => quote! { serde_json::json!({"type": "array"}) },
                },
                "HashMap" | "BTreeMap" | "Value" => quote! { serde_json::json!({"type": "object"}) },
                _ => quote! { <#ty>::json_schema() },
            }
        }
        Type::Reference(reference) => type_to_schema(&reference.elem)?,
        _ => quote! { serde_json::json!({}) },
    })
}

fn to_snake_case(s: &str) -> String {
    let mut result = String::new();
    for (i, c) in s.chars().enumerate() {
        if c.is_uppercase() {
            if i > 0 {
                result.push('_');
            }
            result.push(c.to_ascii_lowercase());
        } else {
            result.push(c);
        }
    }
    result
}

fn to_camel_case(snake: &str) -> String {
    let mut result = String::new();
    let mut upper_next = false;
    for c in snake.chars() {
        if c == '_' {
            upper_next = !result.is_empty();
        } else if upper_next {
            result.push(c.to_ascii_uppercase());
            upper_next = false;
        } else {
            result.push(c);
        }
    }
    result
}
