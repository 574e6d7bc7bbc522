//! Mapping from host metadata types to proto type names.
//!
//! This is the pure leaf of the pipeline: given a [`TypeRef`] it produces
//! the rendered proto type name, the external imports that name requires,
//! and the internal type references the dependency analysis resolves later.
//! An unmappable type is `Ok(None)` — the caller degrades that single field
//! rather than failing the run. Generic arity violations are fatal.

use crate::error::{Error, Result};
use crate::metadata::{RuntimeTypes, TypeRef, NULLABLE_TYPE};
use crate::model::TypeRegistry;

/// Import carrying the well-known timestamp type
pub const TIMESTAMP_IMPORT: &str = "google/protobuf/timestamp.proto";

/// Import carrying the well-known nullable-scalar wrapper types
pub const WRAPPERS_IMPORT: &str = "google/protobuf/wrappers.proto";

/// A mapped proto type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtoType {
    /// Rendered type name (e.g. `int32`, `repeated app.Person`)
    pub name: String,
    /// External imports the name requires
    pub external_imports: Vec<String>,
    /// Full metadata names of referenced user types
    pub internal_types: Vec<String>,
}

impl ProtoType {
    fn scalar(name: &str) -> Self {
        Self {
            name: name.to_string(),
            external_imports: Vec::new(),
            internal_types: Vec::new(),
        }
    }

    fn well_known(name: &str, import: &str) -> Self {
        Self {
            name: name.to_string(),
            external_imports: vec![import.to_string()],
            internal_types: Vec::new(),
        }
    }
}

/// Maps a metadata type reference to its proto type.
///
/// Returns `Ok(None)` when the type has no proto counterpart; the caller is
/// expected to degrade gracefully. Imports for user-defined messages and
/// enums are not produced here — they are resolved at module granularity
/// once file boundaries are known.
pub fn proto_type(
    registry: &TypeRegistry,
    runtime: &RuntimeTypes,
    type_ref: &TypeRef,
) -> Result<Option<ProtoType>> {
    match type_ref.full_name.as_str() {
        "System.Double" => return Ok(Some(ProtoType::scalar("double"))),
        "System.Single" => return Ok(Some(ProtoType::scalar("float"))),
        "System.Int32" => return Ok(Some(ProtoType::scalar("int32"))),
        "System.Int64" => return Ok(Some(ProtoType::scalar("int64"))),
        "System.UInt32" => return Ok(Some(ProtoType::scalar("uint32"))),
        "System.UInt64" => return Ok(Some(ProtoType::scalar("uint64"))),
        "System.Boolean" => return Ok(Some(ProtoType::scalar("bool"))),
        "System.String" => return Ok(Some(ProtoType::scalar("string"))),
        "Google.Protobuf.ByteString" => return Ok(Some(ProtoType::scalar("bytes"))),
        "Google.Protobuf.WellKnownTypes.Timestamp" => {
            return Ok(Some(ProtoType::well_known(
                "google.protobuf.Timestamp",
                TIMESTAMP_IMPORT,
            )));
        }
        _ => {}
    }

    if registry.contains_type(&type_ref.full_name) {
        return Ok(Some(user_type(registry, type_ref)));
    }

    if type_ref.is_generic() {
        if type_ref.full_name == NULLABLE_TYPE {
            require_arity(type_ref, 1)?;
            let inner = proto_type(registry, runtime, &type_ref.type_args[0])?;
            if let Some(inner) = inner {
                let wrapper = match inner.name.as_str() {
                    "bool" => Some("google.protobuf.BoolValue"),
                    "double" => Some("google.protobuf.DoubleValue"),
                    "float" => Some("google.protobuf.FloatValue"),
                    "int32" => Some("google.protobuf.Int32Value"),
                    "int64" => Some("google.protobuf.Int64Value"),
                    "uint32" => Some("google.protobuf.UInt32Value"),
                    "uint64" => Some("google.protobuf.UInt64Value"),
                    _ => None,
                };
                if let Some(wrapper) = wrapper {
                    return Ok(Some(ProtoType::well_known(wrapper, WRAPPERS_IMPORT)));
                }
            }
        }

        if type_ref.full_name == runtime.repeated_field {
            require_arity(type_ref, 1)?;
            let Some(element) = proto_type(registry, runtime, &type_ref.type_args[0])? else {
                return Ok(None);
            };
            return Ok(Some(ProtoType {
                name: format!("repeated {}", element.name),
                external_imports: element.external_imports,
                internal_types: element.internal_types,
            }));
        }

        if type_ref.full_name == runtime.map_field {
            require_arity(type_ref, 2)?;
            let key = proto_type(registry, runtime, &type_ref.type_args[0])?;
            let value = proto_type(registry, runtime, &type_ref.type_args[1])?;
            let (Some(key), Some(value)) = (key, value) else {
                return Ok(None);
            };
            let mut external_imports = key.external_imports;
            external_imports.extend(value.external_imports);
            let mut internal_types = key.internal_types;
            internal_types.extend(value.internal_types);
            return Ok(Some(ProtoType {
                name: format!("map<{}, {}>", key.name, value.name),
                external_imports,
                internal_types,
            }));
        }
    }

    Ok(None)
}

/// Builds the dotted proto name of a registered message or enum.
///
/// The root declaring namespace becomes the snake-cased package prefix, the
/// host nested-type separator becomes a dot, and the synthetic grouping
/// container segment collapses so nested types read `Parent.Child` rather
/// than `Parent.Types.Child`.
fn user_type(registry: &TypeRegistry, type_ref: &TypeRef) -> ProtoType {
    let full_name = type_ref.full_name.as_str();
    let namespace = registry
        .message_id(full_name)
        .map(|id| registry.message(id).namespace.as_str())
        .or_else(|| {
            registry
                .enum_id(full_name)
                .map(|id| registry.enum_type(id).namespace.as_str())
        })
        .unwrap_or_default();

    let package_part = if namespace.is_empty() {
        String::new()
    } else {
        pascal_to_lower_snake(namespace)
    };

    let type_names_part = full_name[namespace.len()..]
        .replace('/', ".")
        .replace(".Types.", ".");

    ProtoType {
        name: format!("{package_part}{type_names_part}"),
        external_imports: Vec::new(),
        internal_types: vec![full_name.to_string()],
    }
}

fn require_arity(type_ref: &TypeRef, expected: usize) -> Result<()> {
    if type_ref.type_args.len() != expected {
        return Err(Error::generic_arity(
            &type_ref.full_name,
            expected,
            type_ref.type_args.len(),
        ));
    }
    Ok(())
}

/// Converts a Pascal-cased name to lower_snake_case, preserving dots
pub fn pascal_to_lower_snake(input: &str) -> String {
    split_case_boundaries(input).to_lowercase()
}

/// Converts a Pascal-cased name to UPPER_SNAKE_CASE, preserving dots
pub fn pascal_to_upper_snake(input: &str) -> String {
    split_case_boundaries(input).to_uppercase()
}

/// Inserts `_` at every lowercase-to-uppercase boundary
fn split_case_boundaries(input: &str) -> String {
    let mut result = String::with_capacity(input.len() + 4);
    let mut prev_is_lower = false;

    for c in input.chars() {
        if prev_is_lower && c.is_ascii_uppercase() {
            result.push('_');
        }
        prev_is_lower = c.is_ascii_lowercase();
        result.push(c);
    }

    result
}
