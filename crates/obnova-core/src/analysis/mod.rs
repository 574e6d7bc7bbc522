//! Discovery of message and enum types from the descriptor model.
//!
//! The schema compiler leaves a recognizable shape in the compiled binary:
//! message classes implement the runtime's marker interface, field numbers
//! survive as `{Field}FieldNumber` literal constants, oneof groups keep a
//! generated `{Group}OneofCase` discriminator enum next to a `{Group}Case`
//! property, and explicit presence shows up as a read-only `Has{Field}` bool
//! property. This module interprets those conventions and populates the
//! [`TypeRegistry`] with reconstructed [`MessageType`]s and
//! [`crate::model::EnumType`]s.
//!
//! The structural analysis that follows discovery — nesting links,
//! reachability, enum pruning, dependency sets — is re-exported from the
//! logical-analysis submodule: [`link_nested_types`], [`verify_reachability`],
//! [`prune_unreferenced_enums`] and [`populate_dependencies`].

mod logical;

use crate::error::{Error, Result};
use crate::metadata::{DescriptorSet, RuntimeTypes, TypeDescriptor};
use crate::model::{EnumType, Field, MessageId, MessageType, Oneof, TypeRegistry};
use std::collections::BTreeMap;
use tracing::trace;

pub use logical::{
    link_nested_types, populate_dependencies, prune_unreferenced_enums, verify_reachability,
};

/// Suffix of the generated oneof discriminator enum type name
const ONEOF_CASE_SUFFIX: &str = "OneofCase";

/// Suffix of the generated oneof discriminator property name
const CASE_SUFFIX: &str = "Case";

/// Suffix of the generated field-number constants
const FIELD_NUMBER_SUFFIX: &str = "FieldNumber";

/// Walks the descriptor tree and registers every message and enum type.
///
/// Root descriptors and their nested descriptors are visited in ordinal
/// full-name order so registry ids are reproducible across runs. Each
/// registered type records the root message it is nested under, if any.
pub fn discover_types(set: &DescriptorSet, runtime: &RuntimeTypes, registry: &mut TypeRegistry) {
    let mut roots: Vec<&TypeDescriptor> = set.types.iter().collect();
    roots.sort_by(|a, b| a.full_name.cmp(&b.full_name));

    for descriptor in roots {
        gather(registry, runtime, descriptor, &descriptor.namespace, None);
    }
}

fn gather(
    registry: &mut TypeRegistry,
    runtime: &RuntimeTypes,
    descriptor: &TypeDescriptor,
    root_namespace: &str,
    root_message: Option<MessageId>,
) {
    let mut message_id = None;
    if descriptor.implements_interface(&runtime.message_interface) {
        trace!("Discovered message {}", descriptor.full_name);
        message_id = Some(registry.add_message(MessageType::new(
            &descriptor.full_name,
            &descriptor.name,
            root_namespace,
            root_message,
        )));
    }

    if descriptor.is_enum {
        trace!("Discovered enum {}", descriptor.full_name);
        registry.add_enum(EnumType {
            full_name: descriptor.full_name.clone(),
            name: descriptor.name.clone(),
            namespace: root_namespace.to_string(),
            root: root_message,
            pairs: descriptor
                .constants
                .iter()
                .map(|c| (c.name.clone(), c.value))
                .collect(),
        });
    }

    let mut nested: Vec<&TypeDescriptor> = descriptor.nested_types.iter().collect();
    nested.sort_by(|a, b| a.full_name.cmp(&b.full_name));

    for nested_descriptor in nested {
        gather(
            registry,
            runtime,
            nested_descriptor,
            root_namespace,
            root_message.or(message_id),
        );
    }
}

/// Populates every message's fields and oneof groups from the generated
/// constants and properties.
///
/// Oneof groups are resolved first so that the plain `{F}FieldNumber` scan
/// can recognize a member's own field-number constant and skip it; the same
/// number claimed by a *different* name is a fatal duplicate.
pub fn populate_message_fields(set: &DescriptorSet, registry: &mut TypeRegistry) -> Result<()> {
    let index = set.index();
    for descriptor in index.values().copied() {
        if let Some(id) = registry.message_id(&descriptor.full_name) {
            populate_one(descriptor, id, registry)?;
        }
    }
    Ok(())
}

fn populate_one(
    descriptor: &TypeDescriptor,
    id: MessageId,
    registry: &mut TypeRegistry,
) -> Result<()> {
    let message_full = registry.message(id).full_name.clone();
    let mut claimed: BTreeMap<i32, String> = BTreeMap::new();
    let mut fields = Vec::new();
    let mut oneofs = Vec::new();

    for property in &descriptor.properties {
        if !property.has_instance_getter {
            continue;
        }
        let Some(discriminator) = registry.enum_id(&property.value_type.full_name) else {
            continue;
        };
        if !registry
            .enum_type(discriminator)
            .name
            .ends_with(ONEOF_CASE_SUFFIX)
        {
            continue;
        }
        let Some(oneof_name) = property.name.strip_suffix(CASE_SUFFIX) else {
            continue;
        };

        // member numbers come from the discriminator's constants; value 0
        // means "unset" and is not a field
        let mut members = Vec::new();
        for (constant_name, number) in registry.enum_type(discriminator).pairs.clone() {
            if number <= 0 {
                continue;
            }
            let Some(member_property) = descriptor.property(&constant_name) else {
                return Err(Error::missing_oneof_property(
                    &message_full,
                    oneof_name,
                    &constant_name,
                ));
            };
            if let Some(existing) = claimed.get(&number) {
                return Err(Error::duplicate_field_number(
                    &message_full,
                    number,
                    existing,
                    &constant_name,
                ));
            }
            claimed.insert(number, constant_name.clone());
            members.push(Field {
                name: constant_name.clone(),
                number,
                value_type: member_property.value_type.clone(),
                is_oneof_member: true,
                has_presence: descriptor.has_presence_property(&constant_name),
            });
        }

        oneofs.push(Oneof {
            name: oneof_name.to_string(),
            discriminator,
            members,
        });
    }

    for constant in &descriptor.constants {
        let Some(field_name) = constant.name.strip_suffix(FIELD_NUMBER_SUFFIX) else {
            continue;
        };
        let Some(property) = descriptor.property(field_name) else {
            return Err(Error::missing_field_property(&message_full, field_name));
        };

        match claimed.get(&constant.value) {
            // a oneof member's own field-number constant
            Some(existing) if existing == field_name => {}
            Some(existing) => {
                return Err(Error::duplicate_field_number(
                    &message_full,
                    constant.value,
                    existing,
                    field_name,
                ));
            }
            None => {
                claimed.insert(constant.value, field_name.to_string());
                fields.push(Field {
                    name: field_name.to_string(),
                    number: constant.value,
                    value_type: property.value_type.clone(),
                    is_oneof_member: false,
                    has_presence: descriptor.has_presence_property(field_name),
                });
            }
        }
    }

    let message = registry.message_mut(id);
    message.fields = fields;
    message.oneofs = oneofs;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{PropertyDescriptor, TypeRef};

    fn runtime() -> RuntimeTypes {
        RuntimeTypes::google_protobuf()
    }

    fn message_descriptor(full_name: &str, namespace: &str) -> TypeDescriptor {
        TypeDescriptor::new(full_name, namespace).implements("Google.Protobuf.IMessage")
    }

    #[test]
    fn test_discovery_registers_messages_and_enums() {
        let set = DescriptorSet::new()
            .with_type(
                message_descriptor("App.Person", "App")
                    .with_nested(TypeDescriptor::enumeration("App.Person/Kind", "")),
            )
            .with_type(TypeDescriptor::enumeration("App.Color", "App"))
            .with_type(TypeDescriptor::new("App.Helper", "App"));

        let mut registry = TypeRegistry::new();
        discover_types(&set, &runtime(), &mut registry);

        let person = registry.message_id("App.Person").unwrap();
        assert!(registry.message(person).is_root());
        assert_eq!(registry.message(person).namespace, "App");
        // a plain class without the marker interface is not a message
        assert!(registry.message_id("App.Helper").is_none());

        let kind = registry.enum_id("App.Person/Kind").unwrap();
        assert_eq!(registry.enum_type(kind).root, Some(person));
        assert_eq!(registry.enum_type(kind).namespace, "App");

        let color = registry.enum_id("App.Color").unwrap();
        assert!(registry.enum_type(color).is_root());
    }

    #[test]
    fn test_field_population() {
        let set = DescriptorSet::new().with_type(
            message_descriptor("App.Person", "App")
                .with_constant("NameFieldNumber", 1)
                .with_constant("AgeFieldNumber", 2)
                .with_property(PropertyDescriptor::new(
                    "Name",
                    TypeRef::named("System.String"),
                ))
                .with_property(PropertyDescriptor::new(
                    "Age",
                    TypeRef::named("System.Int32"),
                ))
                .with_property(
                    PropertyDescriptor::new("HasAge", TypeRef::named("System.Boolean"))
                        .read_only(),
                ),
        );

        let mut registry = TypeRegistry::new();
        discover_types(&set, &runtime(), &mut registry);
        populate_message_fields(&set, &mut registry).unwrap();

        let person = registry.message_id("App.Person").unwrap();
        let fields = &registry.message(person).fields;
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[0].name, "Name");
        assert_eq!(fields[0].number, 1);
        assert!(!fields[0].has_presence);
        assert_eq!(fields[1].name, "Age");
        assert!(fields[1].has_presence);
    }

    #[test]
    fn test_missing_field_property_is_fatal() {
        let set = DescriptorSet::new()
            .with_type(message_descriptor("App.Person", "App").with_constant("NameFieldNumber", 1));

        let mut registry = TypeRegistry::new();
        discover_types(&set, &runtime(), &mut registry);
        let err = populate_message_fields(&set, &mut registry).unwrap_err();
        assert!(matches!(err, Error::MissingFieldProperty { .. }));
    }

    #[test]
    fn test_duplicate_field_number_is_fatal() {
        let set = DescriptorSet::new().with_type(
            message_descriptor("App.Person", "App")
                .with_constant("NameFieldNumber", 1)
                .with_constant("EmailFieldNumber", 1)
                .with_property(PropertyDescriptor::new(
                    "Name",
                    TypeRef::named("System.String"),
                ))
                .with_property(PropertyDescriptor::new(
                    "Email",
                    TypeRef::named("System.String"),
                )),
        );

        let mut registry = TypeRegistry::new();
        discover_types(&set, &runtime(), &mut registry);
        let err = populate_message_fields(&set, &mut registry).unwrap_err();
        assert!(matches!(
            err,
            Error::DuplicateFieldNumber { number: 1, .. }
        ));
    }

    #[test]
    fn test_oneof_population() {
        // value 0 is the "unset" sentinel; declared order carries over
        let set = DescriptorSet::new().with_type(
            message_descriptor("App.Event", "App")
                .with_nested(
                    TypeDescriptor::enumeration("App.Event/PayloadOneofCase", "")
                        .with_constant("None", 0)
                        .with_constant("Text", 5)
                        .with_constant("Count", 3),
                )
                .with_property(PropertyDescriptor::new(
                    "PayloadCase",
                    TypeRef::named("App.Event/PayloadOneofCase"),
                ))
                .with_property(PropertyDescriptor::new(
                    "Text",
                    TypeRef::named("System.String"),
                ))
                .with_property(PropertyDescriptor::new(
                    "Count",
                    TypeRef::named("System.Int32"),
                ))
                .with_constant("TextFieldNumber", 5)
                .with_constant("CountFieldNumber", 3),
        );

        let mut registry = TypeRegistry::new();
        discover_types(&set, &runtime(), &mut registry);
        populate_message_fields(&set, &mut registry).unwrap();

        let event = registry.message_id("App.Event").unwrap();
        let message = registry.message(event);
        // member constants double as FieldNumber constants and must not
        // surface as plain fields
        assert!(message.fields.is_empty());
        assert_eq!(message.oneofs.len(), 1);

        let oneof = &message.oneofs[0];
        assert_eq!(oneof.name, "Payload");
        let members: Vec<(&str, i32)> = oneof
            .members
            .iter()
            .map(|f| (f.name.as_str(), f.number))
            .collect();
        assert_eq!(members, vec![("Text", 5), ("Count", 3)]);
        assert!(oneof.members.iter().all(|f| f.is_oneof_member));
    }

    #[test]
    fn test_oneof_member_without_property_is_fatal() {
        let set = DescriptorSet::new().with_type(
            message_descriptor("App.Event", "App")
                .with_nested(
                    TypeDescriptor::enumeration("App.Event/PayloadOneofCase", "")
                        .with_constant("None", 0)
                        .with_constant("Text", 1),
                )
                .with_property(PropertyDescriptor::new(
                    "PayloadCase",
                    TypeRef::named("App.Event/PayloadOneofCase"),
                )),
        );

        let mut registry = TypeRegistry::new();
        discover_types(&set, &runtime(), &mut registry);
        let err = populate_message_fields(&set, &mut registry).unwrap_err();
        assert!(matches!(err, Error::MissingOneofProperty { .. }));
    }
}
