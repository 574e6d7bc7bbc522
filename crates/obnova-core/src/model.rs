//! Reconstructed schema entities and their registry.
//!
//! Messages and enums discovered in the metadata live in arenas owned by
//! [`TypeRegistry`] and are addressed by [`MessageId`]/[`EnumId`]. All
//! cross-entity links (nesting, dependencies) are id-sets, so merging and
//! pruning only ever update arena entries and the registry's lookup maps.
//! `BTreeMap`/`BTreeSet` keep every iteration order stable, which the
//! deterministic-output guarantee depends on.

use crate::metadata::TypeRef;
use std::collections::{BTreeMap, BTreeSet};

/// Identifier of a message in the registry arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MessageId(usize);

/// Identifier of an enum in the registry arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EnumId(usize);

/// A single message field
#[derive(Debug, Clone)]
pub struct Field {
    /// Field name as declared in the metadata (Pascal case)
    pub name: String,
    /// Field number
    pub number: i32,
    /// Declared value type
    pub value_type: TypeRef,
    /// Whether the field belongs to a oneof group
    pub is_oneof_member: bool,
    /// Whether the metadata declares an explicit presence property
    pub has_presence: bool,
}

/// A oneof field group, identified by its generated discriminator enum
#[derive(Debug, Clone)]
pub struct Oneof {
    /// Group name (discriminator property name without the `Case` suffix)
    pub name: String,
    /// The discriminator enum
    pub discriminator: EnumId,
    /// Member fields, in the discriminator's declared constant order
    pub members: Vec<Field>,
}

/// A reconstructed message type
#[derive(Debug, Clone)]
pub struct MessageType {
    /// Full qualified metadata name
    pub full_name: String,
    /// Simple name
    pub name: String,
    /// Namespace of the root declaring type
    pub namespace: String,
    /// The root message this one is nested under, `None` for roots
    pub root: Option<MessageId>,
    /// Plain fields, in discovery order
    pub fields: Vec<Field>,
    /// Oneof groups, in discovery order
    pub oneofs: Vec<Oneof>,
    /// Structurally nested messages
    pub nested_messages: Vec<MessageId>,
    /// Structurally nested enums
    pub nested_enums: Vec<EnumId>,
    /// External imports required by this message's fields
    pub imports: BTreeSet<String>,
    /// Messages referenced by this message's fields
    pub depends_on_messages: BTreeSet<MessageId>,
    /// Enums referenced by this message's fields
    pub depends_on_enums: BTreeSet<EnumId>,
}

impl MessageType {
    /// Creates a message with empty structure
    pub fn new(
        full_name: impl Into<String>,
        name: impl Into<String>,
        namespace: impl Into<String>,
        root: Option<MessageId>,
    ) -> Self {
        Self {
            full_name: full_name.into(),
            name: name.into(),
            namespace: namespace.into(),
            root,
            fields: Vec::new(),
            oneofs: Vec::new(),
            nested_messages: Vec::new(),
            nested_enums: Vec::new(),
            imports: BTreeSet::new(),
            depends_on_messages: BTreeSet::new(),
            depends_on_enums: BTreeSet::new(),
        }
    }

    /// Whether this message is a root (not nested in another message)
    pub fn is_root(&self) -> bool {
        self.root.is_none()
    }
}

/// A reconstructed enum type
#[derive(Debug, Clone)]
pub struct EnumType {
    /// Full qualified metadata name
    pub full_name: String,
    /// Simple name
    pub name: String,
    /// Namespace of the root declaring type
    pub namespace: String,
    /// The root message this enum is nested under, `None` for roots
    pub root: Option<MessageId>,
    /// Constant `(name, value)` pairs, in declared order
    pub pairs: Vec<(String, i32)>,
}

impl EnumType {
    /// Whether this enum is a root (not nested in a message)
    pub fn is_root(&self) -> bool {
        self.root.is_none()
    }
}

/// Arena registry of every reconstructed message and enum
#[derive(Debug, Default)]
pub struct TypeRegistry {
    messages: Vec<MessageType>,
    enums: Vec<EnumType>,
    message_ids: BTreeMap<String, MessageId>,
    enum_ids: BTreeMap<String, EnumId>,
    live_enums: BTreeSet<EnumId>,
}

impl TypeRegistry {
    /// Creates an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a message and returns its id
    pub fn add_message(&mut self, message: MessageType) -> MessageId {
        let id = MessageId(self.messages.len());
        self.message_ids.insert(message.full_name.clone(), id);
        self.messages.push(message);
        id
    }

    /// Registers an enum and returns its id
    pub fn add_enum(&mut self, enum_type: EnumType) -> EnumId {
        let id = EnumId(self.enums.len());
        self.enum_ids.insert(enum_type.full_name.clone(), id);
        self.enums.push(enum_type);
        self.live_enums.insert(id);
        id
    }

    /// Returns the message for an id
    pub fn message(&self, id: MessageId) -> &MessageType {
        &self.messages[id.0]
    }

    /// Returns the message for an id, mutably
    pub fn message_mut(&mut self, id: MessageId) -> &mut MessageType {
        &mut self.messages[id.0]
    }

    /// Returns the enum for an id (pruned enums stay addressable; they are
    /// only dropped from the lookup maps)
    pub fn enum_type(&self, id: EnumId) -> &EnumType {
        &self.enums[id.0]
    }

    /// Looks up a message id by full name
    pub fn message_id(&self, full_name: &str) -> Option<MessageId> {
        self.message_ids.get(full_name).copied()
    }

    /// Looks up a live enum id by full name
    pub fn enum_id(&self, full_name: &str) -> Option<EnumId> {
        self.enum_ids.get(full_name).copied()
    }

    /// Whether the full name matches a known message or live enum
    pub fn contains_type(&self, full_name: &str) -> bool {
        self.message_ids.contains_key(full_name) || self.enum_ids.contains_key(full_name)
    }

    /// All message ids, in discovery order
    pub fn message_ids(&self) -> impl Iterator<Item = MessageId> + '_ {
        (0..self.messages.len()).map(MessageId)
    }

    /// Root message ids, in discovery order
    pub fn root_message_ids(&self) -> impl Iterator<Item = MessageId> + '_ {
        self.message_ids().filter(|&id| self.message(id).is_root())
    }

    /// Live enum ids, ascending
    pub fn live_enum_ids(&self) -> impl Iterator<Item = EnumId> + '_ {
        self.live_enums.iter().copied()
    }

    /// Live root enum ids, ascending
    pub fn root_enum_ids(&self) -> impl Iterator<Item = EnumId> + '_ {
        self.live_enum_ids()
            .filter(|&id| self.enum_type(id).is_root())
    }

    /// The root owner of a message (itself when it is a root)
    pub fn root_of(&self, id: MessageId) -> MessageId {
        self.message(id).root.unwrap_or(id)
    }

    /// Number of registered messages
    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    /// Number of live enums
    pub fn live_enum_count(&self) -> usize {
        self.live_enums.len()
    }

    /// Restricts the live enum set, dropping pruned enums from the lookup
    /// map so later dependency resolution no longer sees them
    pub fn retain_enums(&mut self, live: &BTreeSet<EnumId>) {
        self.live_enums.retain(|id| live.contains(id));
        let live_enums = &self.live_enums;
        self.enum_ids.retain(|_, id| live_enums.contains(id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(full_name: &str, root: Option<MessageId>) -> MessageType {
        let name = full_name.rsplit(['.', '/']).next().unwrap().to_string();
        MessageType::new(full_name, name, "App", root)
    }

    #[test]
    fn test_root_of() {
        let mut registry = TypeRegistry::new();
        let root = registry.add_message(message("App.Person", None));
        let nested = registry.add_message(message("App.Person/Address", Some(root)));

        assert_eq!(registry.root_of(root), root);
        assert_eq!(registry.root_of(nested), root);
        assert!(registry.message(root).is_root());
        assert!(!registry.message(nested).is_root());
    }

    #[test]
    fn test_enum_pruning_drops_lookup_but_not_storage() {
        let mut registry = TypeRegistry::new();
        let kept = registry.add_enum(EnumType {
            full_name: "App.Color".to_string(),
            name: "Color".to_string(),
            namespace: "App".to_string(),
            root: None,
            pairs: vec![("Unknown".to_string(), 0)],
        });
        let pruned = registry.add_enum(EnumType {
            full_name: "App.Unused".to_string(),
            name: "Unused".to_string(),
            namespace: "App".to_string(),
            root: None,
            pairs: vec![("Unknown".to_string(), 0)],
        });

        let live = BTreeSet::from([kept]);
        registry.retain_enums(&live);

        assert_eq!(registry.live_enum_count(), 1);
        assert_eq!(registry.enum_id("App.Color"), Some(kept));
        assert_eq!(registry.enum_id("App.Unused"), None);
        // arena storage survives so nested-enum links keep rendering
        assert_eq!(registry.enum_type(pruned).name, "Unused");
    }

    #[test]
    fn test_iteration_order_is_discovery_order() {
        let mut registry = TypeRegistry::new();
        let b = registry.add_message(message("App.B", None));
        let a = registry.add_message(message("App.A", None));

        let ids: Vec<_> = registry.message_ids().collect();
        assert_eq!(ids, vec![b, a]);
    }
}
