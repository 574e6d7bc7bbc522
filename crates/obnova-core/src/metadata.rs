//! The uniform type-descriptor model supplied by an assembly metadata reader.
//!
//! The rebuilder never touches the compiled binary itself. An external
//! reader walks the binary's type metadata and produces a [`DescriptorSet`]:
//! the root-level type list, each type's nested types, declared properties,
//! literal constants and implemented interfaces, plus the full names of the
//! protobuf runtime marker types it resolved from the binary ([`RuntimeTypes`]).
//! The core depends only on this shape, not on how it was obtained.
//!
//! Descriptor sets serialize to and from JSON via serde, so readers can be
//! written in any language and hand their output to this library or the CLI.
//!
//! ## Conventions
//!
//! Full names use the host metadata format: namespace segments joined with
//! `.` and nested types appended with `/` (for example `App.Person/Address`).
//! Nested descriptors carry an empty `namespace`; their namespace is the
//! root declaring type's.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Full name of the well-known nullable wrapper container
pub const NULLABLE_TYPE: &str = "System.Nullable`1";

/// Name of the synthetic grouping container the schema compiler nests
/// message/enum holder types under
pub const GROUPING_CONTAINER_NAME: &str = "Types";

/// A complete descriptor dump for one compiled binary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DescriptorSet {
    /// Protobuf runtime marker types resolved from the binary, absent when
    /// the binary carries no protobuf runtime reference
    #[serde(default)]
    pub runtime: Option<RuntimeTypes>,
    /// Root-level type descriptors
    #[serde(default)]
    pub types: Vec<TypeDescriptor>,
}

impl DescriptorSet {
    /// Creates an empty descriptor set with the standard runtime markers
    pub fn new() -> Self {
        Self {
            runtime: Some(RuntimeTypes::google_protobuf()),
            types: Vec::new(),
        }
    }

    /// Adds a root-level type descriptor
    pub fn with_type(mut self, descriptor: TypeDescriptor) -> Self {
        self.types.push(descriptor);
        self
    }

    /// Parses a descriptor set from its JSON serialization
    pub fn from_json(data: &str) -> Result<Self> {
        Ok(serde_json::from_str(data)?)
    }

    /// Reads and parses a descriptor set from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path).map_err(|e| Error::file_read(path, e))?;
        Self::from_json(&data)
    }

    /// Serializes the descriptor set to pretty-printed JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Returns the runtime marker types, failing if the binary carried none
    pub fn require_runtime(&self) -> Result<&RuntimeTypes> {
        self.runtime.as_ref().ok_or(Error::MissingRuntime)
    }

    /// Builds a full-name index over every descriptor in the tree
    pub fn index(&self) -> BTreeMap<&str, &TypeDescriptor> {
        let mut index = BTreeMap::new();
        let mut remaining: Vec<&TypeDescriptor> = self.types.iter().collect();
        while let Some(descriptor) = remaining.pop() {
            index.insert(descriptor.full_name.as_str(), descriptor);
            remaining.extend(descriptor.nested_types.iter());
        }
        index
    }
}

impl Default for DescriptorSet {
    fn default() -> Self {
        Self::new()
    }
}

/// Full names of the protobuf runtime types the reader resolved from the
/// binary's runtime reference
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeTypes {
    /// The message marker interface every generated message implements
    pub message_interface: String,
    /// The repeated-field container type
    pub repeated_field: String,
    /// The map-field container type
    pub map_field: String,
}

impl RuntimeTypes {
    /// The marker names of the Google.Protobuf C# runtime
    pub fn google_protobuf() -> Self {
        Self {
            message_interface: "Google.Protobuf.IMessage".to_string(),
            repeated_field: "Google.Protobuf.Collections.RepeatedField`1".to_string(),
            map_field: "Google.Protobuf.Collections.MapField`2".to_string(),
        }
    }
}

/// One node of the host type system
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeDescriptor {
    /// Full qualified name, nested types separated with `/`
    pub full_name: String,
    /// Namespace of the type (empty for nested types)
    #[serde(default)]
    pub namespace: String,
    /// Simple (unqualified) name
    pub name: String,
    /// Whether this type is an enum
    #[serde(default)]
    pub is_enum: bool,
    /// Whether this type is declared abstract
    #[serde(default)]
    pub is_abstract: bool,
    /// Whether this type is declared sealed
    #[serde(default)]
    pub is_sealed: bool,
    /// Full names of directly implemented interfaces
    #[serde(default)]
    pub interfaces: Vec<String>,
    /// Declared properties, in declaration order
    #[serde(default)]
    pub properties: Vec<PropertyDescriptor>,
    /// Declared literal constants, in declaration order
    #[serde(default)]
    pub constants: Vec<ConstantDescriptor>,
    /// Directly nested type descriptors
    #[serde(default)]
    pub nested_types: Vec<TypeDescriptor>,
}

impl TypeDescriptor {
    /// Creates a class descriptor; the simple name is derived from the full name
    pub fn new(full_name: impl Into<String>, namespace: impl Into<String>) -> Self {
        let full_name = full_name.into();
        Self {
            name: simple_name(&full_name).to_string(),
            full_name,
            namespace: namespace.into(),
            is_enum: false,
            is_abstract: false,
            is_sealed: false,
            interfaces: Vec::new(),
            properties: Vec::new(),
            constants: Vec::new(),
            nested_types: Vec::new(),
        }
    }

    /// Creates an enum descriptor
    pub fn enumeration(full_name: impl Into<String>, namespace: impl Into<String>) -> Self {
        let mut descriptor = Self::new(full_name, namespace);
        descriptor.is_enum = true;
        descriptor
    }

    /// Creates the synthetic `Types` grouping container nested under a message
    pub fn grouping_container(full_name: impl Into<String>) -> Self {
        let mut descriptor = Self::new(full_name, "");
        descriptor.is_abstract = true;
        descriptor.is_sealed = true;
        descriptor
    }

    /// Records an implemented interface
    pub fn implements(mut self, interface: impl Into<String>) -> Self {
        self.interfaces.push(interface.into());
        self
    }

    /// Adds a declared property
    pub fn with_property(mut self, property: PropertyDescriptor) -> Self {
        self.properties.push(property);
        self
    }

    /// Adds a declared literal constant
    pub fn with_constant(mut self, name: impl Into<String>, value: i32) -> Self {
        self.constants.push(ConstantDescriptor {
            name: name.into(),
            value,
        });
        self
    }

    /// Adds a nested type descriptor
    pub fn with_nested(mut self, descriptor: TypeDescriptor) -> Self {
        self.nested_types.push(descriptor);
        self
    }

    /// Whether this is the synthetic grouping container the schema compiler
    /// inserts for nested message/enum holder types
    pub fn is_grouping_container(&self) -> bool {
        self.is_abstract && self.is_sealed && self.name == GROUPING_CONTAINER_NAME
    }

    /// Whether this type implements the given interface
    pub fn implements_interface(&self, full_name: &str) -> bool {
        self.interfaces.iter().any(|i| i == full_name)
    }

    /// Finds a declared property by name, requiring an instance getter
    pub fn property(&self, name: &str) -> Option<&PropertyDescriptor> {
        // setter presence varies between generator versions, so it is ignored
        self.properties
            .iter()
            .find(|p| p.name == name && p.has_instance_getter)
    }

    /// Whether the type declares the read-only `Has{name}` presence property
    pub fn has_presence_property(&self, name: &str) -> bool {
        let expected = format!("Has{name}");
        self.properties.iter().any(|p| {
            p.name == expected
                && p.value_type.full_name == "System.Boolean"
                && !p.has_setter
                && p.has_instance_getter
        })
    }
}

/// A declared property of a type
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropertyDescriptor {
    /// Property name
    pub name: String,
    /// Declared value type
    pub value_type: TypeRef,
    /// Whether the property has an instance getter
    #[serde(default = "default_true")]
    pub has_instance_getter: bool,
    /// Whether the property has a setter
    #[serde(default = "default_true")]
    pub has_setter: bool,
}

impl PropertyDescriptor {
    /// Creates a property with an instance getter and a setter
    pub fn new(name: impl Into<String>, value_type: TypeRef) -> Self {
        Self {
            name: name.into(),
            value_type,
            has_instance_getter: true,
            has_setter: true,
        }
    }

    /// Marks the property as getter-only
    pub fn read_only(mut self) -> Self {
        self.has_setter = false;
        self
    }
}

/// A literal constant declared on a type
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConstantDescriptor {
    /// Constant name
    pub name: String,
    /// Constant value
    pub value: i32,
}

/// A reference to a type, possibly a generic instantiation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeRef {
    /// Full name of the referenced type (the open container for generics)
    pub full_name: String,
    /// Generic type arguments, empty for non-generic references
    #[serde(default)]
    pub type_args: Vec<TypeRef>,
}

impl TypeRef {
    /// Creates a non-generic type reference
    pub fn named(full_name: impl Into<String>) -> Self {
        Self {
            full_name: full_name.into(),
            type_args: Vec::new(),
        }
    }

    /// Creates a generic instantiation reference
    pub fn generic(container: impl Into<String>, type_args: Vec<TypeRef>) -> Self {
        Self {
            full_name: container.into(),
            type_args,
        }
    }

    /// Whether this reference is a generic instantiation
    pub fn is_generic(&self) -> bool {
        !self.type_args.is_empty()
    }

    /// Full name of the root declaring type (the prefix before any `/`)
    pub fn root_full_name(&self) -> &str {
        match self.full_name.split_once('/') {
            Some((root, _)) => root,
            None => &self.full_name,
        }
    }
}

/// Returns the last `.`/`/`-delimited segment of a full name
fn simple_name(full_name: &str) -> &str {
    let tail = match full_name.rsplit_once('/') {
        Some((_, tail)) => tail,
        None => full_name,
    };
    match tail.rsplit_once('.') {
        Some((_, name)) => name,
        None => tail,
    }
}

fn default_true() -> bool {
    true
}
