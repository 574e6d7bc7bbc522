//! Structural analysis of the discovered types.
//!
//! After discovery the registry holds a flat population of messages and
//! enums. This module wires up the structure between them: parent/child
//! nesting links, the root-reachability invariant, the pruning of enums no
//! field references, and the per-message dependency and import sets that
//! module partitioning consumes.

use crate::error::{Error, Result};
use crate::mapping::proto_type;
use crate::metadata::{DescriptorSet, RuntimeTypes};
use crate::model::{EnumId, MessageId, TypeRegistry};
use std::collections::BTreeSet;
use tracing::debug;

/// Links every message to its structurally nested messages and enums.
///
/// Nested types are found among the message's direct children and, when the
/// generator emitted a synthetic grouping container, among that container's
/// children. Links keep the metadata declaration order.
pub fn link_nested_types(set: &DescriptorSet, registry: &mut TypeRegistry) {
    let index = set.index();
    let ids: Vec<MessageId> = registry.message_ids().collect();

    for id in ids {
        let Some(descriptor) = index.get(registry.message(id).full_name.as_str()).copied() else {
            continue;
        };

        let container = descriptor
            .nested_types
            .iter()
            .find(|t| t.is_grouping_container());
        let container_nested = container.map(|c| c.nested_types.iter()).into_iter().flatten();

        for nested in descriptor.nested_types.iter().chain(container_nested) {
            if let Some(nested_message) = registry.message_id(&nested.full_name) {
                registry.message_mut(id).nested_messages.push(nested_message);
            }
            if let Some(nested_enum) = registry.enum_id(&nested.full_name) {
                registry.message_mut(id).nested_enums.push(nested_enum);
            }
        }
    }
}

/// Verifies that every discovered message is reachable from a root.
///
/// The nesting structure must form a forest: any message the discovery phase
/// registered but the nesting links cannot reach indicates mis-classified
/// metadata and fails the run.
pub fn verify_reachability(registry: &TypeRegistry) -> Result<()> {
    let mut remaining: Vec<MessageId> = registry.root_message_ids().collect();
    let mut discovered: BTreeSet<MessageId> = BTreeSet::new();

    while let Some(current) = remaining.pop() {
        discovered.insert(current);
        remaining.extend(registry.message(current).nested_messages.iter().copied());
    }

    let unlinked = registry.message_count() - discovered.len();
    if unlinked > 0 {
        return Err(Error::DisconnectedMessages { count: unlinked });
    }
    Ok(())
}

/// Prunes enums that no field anywhere references.
///
/// The live set is recomputed as exactly the enums reachable through the
/// type mapping of some field's value type; everything else is dropped from
/// the registry lookup maps. Must run before dependency population, which
/// consumes the pruned registry. Returns the number of pruned enums.
pub fn prune_unreferenced_enums(
    registry: &mut TypeRegistry,
    runtime: &RuntimeTypes,
) -> Result<usize> {
    let mut referenced: BTreeSet<EnumId> = BTreeSet::new();

    for id in registry.message_ids().collect::<Vec<_>>() {
        let message = registry.message(id);
        let value_types: Vec<_> = message
            .fields
            .iter()
            .chain(message.oneofs.iter().flat_map(|o| o.members.iter()))
            .map(|f| f.value_type.clone())
            .collect();

        for value_type in &value_types {
            if let Some(mapped) = proto_type(registry, runtime, value_type)? {
                for full_name in &mapped.internal_types {
                    if let Some(enum_id) = registry.enum_id(full_name) {
                        referenced.insert(enum_id);
                    }
                }
            }
        }
    }

    let before = registry.live_enum_count();
    registry.retain_enums(&referenced);
    let pruned = before - registry.live_enum_count();
    debug!("Pruned {pruned} unreferenced enum(s)");
    Ok(pruned)
}

/// Populates every message's import set and message/enum dependency sets.
///
/// Each field and oneof member runs through the type mapping; external
/// imports accumulate on the owning message, and every internal reference
/// must resolve to a registered enum or message.
pub fn populate_dependencies(registry: &mut TypeRegistry, runtime: &RuntimeTypes) -> Result<()> {
    for id in registry.message_ids().collect::<Vec<_>>() {
        let message = registry.message(id);
        let message_full = message.full_name.clone();
        let value_types: Vec<_> = message
            .fields
            .iter()
            .chain(message.oneofs.iter().flat_map(|o| o.members.iter()))
            .map(|f| f.value_type.clone())
            .collect();

        let mut imports: BTreeSet<String> = BTreeSet::new();
        let mut depends_on_messages: BTreeSet<MessageId> = BTreeSet::new();
        let mut depends_on_enums: BTreeSet<EnumId> = BTreeSet::new();

        for value_type in &value_types {
            let Some(mapped) = proto_type(registry, runtime, value_type)? else {
                continue;
            };
            imports.extend(mapped.external_imports);
            for full_name in &mapped.internal_types {
                if let Some(enum_id) = registry.enum_id(full_name) {
                    depends_on_enums.insert(enum_id);
                } else if let Some(message_id) = registry.message_id(full_name) {
                    depends_on_messages.insert(message_id);
                } else {
                    return Err(Error::unknown_type_reference(&message_full, full_name));
                }
            }
        }

        let message = registry.message_mut(id);
        message.imports.extend(imports);
        message.depends_on_messages.extend(depends_on_messages);
        message.depends_on_enums.extend(depends_on_enums);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{discover_types, populate_message_fields};
    use crate::metadata::{PropertyDescriptor, TypeDescriptor, TypeRef};

    fn runtime() -> RuntimeTypes {
        RuntimeTypes::google_protobuf()
    }

    fn analyzed(set: &DescriptorSet) -> TypeRegistry {
        let mut registry = TypeRegistry::new();
        discover_types(set, &runtime(), &mut registry);
        populate_message_fields(set, &mut registry).unwrap();
        link_nested_types(set, &mut registry);
        verify_reachability(&registry).unwrap();
        prune_unreferenced_enums(&mut registry, &runtime()).unwrap();
        populate_dependencies(&mut registry, &runtime()).unwrap();
        registry
    }

    fn message_descriptor(full_name: &str, namespace: &str) -> TypeDescriptor {
        TypeDescriptor::new(full_name, namespace).implements("Google.Protobuf.IMessage")
    }

    #[test]
    fn test_nesting_through_grouping_container() {
        let set = DescriptorSet::new().with_type(
            message_descriptor("App.Person", "App").with_nested(
                TypeDescriptor::grouping_container("App.Person/Types")
                    .with_nested(message_descriptor("App.Person/Types/Address", "")),
            ),
        );

        let registry = analyzed(&set);
        let person = registry.message_id("App.Person").unwrap();
        let address = registry.message_id("App.Person/Types/Address").unwrap();
        assert_eq!(registry.message(person).nested_messages, vec![address]);
        assert_eq!(registry.message(address).root, Some(person));
    }

    #[test]
    fn test_unreferenced_root_enum_is_pruned() {
        let set = DescriptorSet::new()
            .with_type(
                message_descriptor("App.Person", "App")
                    .with_constant("NameFieldNumber", 1)
                    .with_property(PropertyDescriptor::new(
                        "Name",
                        TypeRef::named("System.String"),
                    )),
            )
            .with_type(
                TypeDescriptor::enumeration("App.Unused", "App").with_constant("Unknown", 0),
            );

        let mut registry = TypeRegistry::new();
        discover_types(&set, &runtime(), &mut registry);
        populate_message_fields(&set, &mut registry).unwrap();
        link_nested_types(&set, &mut registry);

        let pruned = prune_unreferenced_enums(&mut registry, &runtime()).unwrap();
        assert_eq!(pruned, 1);
        assert!(registry.enum_id("App.Unused").is_none());
        assert_eq!(registry.live_enum_count(), 0);
    }

    #[test]
    fn test_referenced_enum_survives_pruning() {
        let set = DescriptorSet::new()
            .with_type(
                message_descriptor("App.Person", "App")
                    .with_constant("ColorFieldNumber", 1)
                    .with_property(PropertyDescriptor::new(
                        "Color",
                        TypeRef::named("App.Color"),
                    )),
            )
            .with_type(TypeDescriptor::enumeration("App.Color", "App").with_constant("Red", 0));

        let registry = analyzed(&set);
        let person = registry.message_id("App.Person").unwrap();
        let color = registry.enum_id("App.Color").unwrap();
        assert_eq!(
            registry.message(person).depends_on_enums,
            BTreeSet::from([color])
        );
    }

    #[test]
    fn test_dependency_population() {
        let set = DescriptorSet::new()
            .with_type(
                message_descriptor("App.Person", "App")
                    .with_constant("EmployerFieldNumber", 1)
                    .with_constant("BornFieldNumber", 2)
                    .with_property(PropertyDescriptor::new(
                        "Employer",
                        TypeRef::named("App.Company"),
                    ))
                    .with_property(PropertyDescriptor::new(
                        "Born",
                        TypeRef::named("Google.Protobuf.WellKnownTypes.Timestamp"),
                    )),
            )
            .with_type(message_descriptor("App.Company", "App"));

        let registry = analyzed(&set);
        let person = registry.message_id("App.Person").unwrap();
        let company = registry.message_id("App.Company").unwrap();

        let message = registry.message(person);
        assert_eq!(message.depends_on_messages, BTreeSet::from([company]));
        assert_eq!(
            message.imports,
            BTreeSet::from(["google/protobuf/timestamp.proto".to_string()])
        );
    }

    #[test]
    fn test_disconnected_message_is_fatal() {
        // a nested message whose parent never links it (no nested_types
        // entry in the parent descriptor) is unreachable from any root
        let set = DescriptorSet::new().with_type(message_descriptor("App.Person/Orphan", ""));

        let mut registry = TypeRegistry::new();
        discover_types(&set, &runtime(), &mut registry);
        // mark the message as nested so no root reaches it
        let orphan_id = registry.message_id("App.Person/Orphan").unwrap();
        registry.message_mut(orphan_id).root = Some(orphan_id);

        let err = verify_reachability(&registry).unwrap_err();
        assert!(matches!(err, Error::DisconnectedMessages { count: 1 }));
    }
}
