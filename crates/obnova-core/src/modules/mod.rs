//! Module partitioning: grouping root types into output-file units.
//!
//! A [`Module`] is an in-progress grouping of root messages and enums
//! destined for one output file. Modules live in an arena owned by
//! [`ModuleGraph`] and are addressed by [`ModuleId`]; the arena index doubles
//! as the creation-ordered id used as the stable tie-break everywhere.
//! Dependency edges are id-sets, so merging rewires arena entries without
//! ever touching pointer identity; a merged-away module stays in the arena
//! with its `removed` flag set and must no longer be referenced by anything
//! live — the merge pass validates exactly that at the end.
//!
//! The merge algorithm itself lives in [`merge`].

pub mod merge;

use crate::error::{Error, Result};
use crate::model::{EnumId, MessageId, TypeRegistry};
use std::collections::{BTreeMap, BTreeSet};
use std::mem;
use tracing::debug;

/// Identifier of a module in the graph arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ModuleId(usize);

/// One output-file unit in progress
#[derive(Debug, Clone, Default)]
pub struct Module {
    /// Namespace every root type of this module shares
    pub namespace: String,
    /// Root messages assigned to this module
    pub root_messages: BTreeSet<MessageId>,
    /// Root enums assigned to this module
    pub root_enums: BTreeSet<EnumId>,
    /// Root messages of other modules this module depends on
    pub depends_on_root_messages: BTreeSet<MessageId>,
    /// Root enums of other modules this module depends on
    pub depends_on_root_enums: BTreeSet<EnumId>,
    /// Modules this module depends on
    pub depends_on: BTreeSet<ModuleId>,
    /// Modules depending on this module
    pub depended_on_by: BTreeSet<ModuleId>,
    /// Whether this module has been merged away
    pub removed: bool,
}

/// Arena of all modules plus the root-type-to-module lookup
#[derive(Debug, Clone, Default)]
pub struct ModuleGraph {
    modules: Vec<Module>,
    message_module: BTreeMap<MessageId, ModuleId>,
    enum_module: BTreeMap<EnumId, ModuleId>,
}

impl ModuleGraph {
    /// Creates an empty module graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Partitions the registry's root types into draft modules and resolves
    /// the inter-module dependency edges.
    pub fn partition(registry: &TypeRegistry) -> Result<Self> {
        let mut graph = Self::new();
        graph.gather_enum_modules(registry);
        graph.gather_message_modules(registry)?;
        graph.add_module_dependencies();
        Ok(graph)
    }

    /// Adds an empty module for a namespace and returns its id
    pub fn add_module(&mut self, namespace: impl Into<String>) -> ModuleId {
        let id = ModuleId(self.modules.len());
        self.modules.push(Module {
            namespace: namespace.into(),
            ..Module::default()
        });
        id
    }

    /// Returns the module for an id
    pub fn module(&self, id: ModuleId) -> &Module {
        &self.modules[id.0]
    }

    /// Returns the module for an id, mutably
    pub fn module_mut(&mut self, id: ModuleId) -> &mut Module {
        &mut self.modules[id.0]
    }

    /// Live (non-removed) module ids, ascending
    pub fn live_ids(&self) -> Vec<ModuleId> {
        (0..self.modules.len())
            .map(ModuleId)
            .filter(|&id| !self.modules[id.0].removed)
            .collect()
    }

    /// Number of live modules
    pub fn live_count(&self) -> usize {
        self.modules.iter().filter(|m| !m.removed).count()
    }

    /// Total dependency edge count over live modules
    pub fn edge_count(&self) -> usize {
        self.modules
            .iter()
            .filter(|m| !m.removed)
            .map(|m| m.depends_on.len())
            .sum()
    }

    /// The module a root message is assigned to
    pub fn module_of_message(&self, id: MessageId) -> Option<ModuleId> {
        self.message_module.get(&id).copied()
    }

    /// The module a root enum is assigned to
    pub fn module_of_enum(&self, id: EnumId) -> Option<ModuleId> {
        self.enum_module.get(&id).copied()
    }

    /// Live module ids grouped by namespace, namespaces and ids ascending
    pub fn namespace_groups(&self) -> BTreeMap<String, Vec<ModuleId>> {
        let mut groups: BTreeMap<String, Vec<ModuleId>> = BTreeMap::new();
        for id in self.live_ids() {
            groups
                .entry(self.module(id).namespace.clone())
                .or_default()
                .push(id);
        }
        groups
    }

    /// Whether any surviving structure still references a removed module
    pub fn has_dangling_reference(&self) -> bool {
        let live: BTreeSet<ModuleId> = self.live_ids().into_iter().collect();
        self.message_module.values().any(|m| !live.contains(m))
            || self.enum_module.values().any(|m| !live.contains(m))
            || live.iter().any(|&id| {
                let module = self.module(id);
                module.depends_on.iter().any(|d| !live.contains(d))
                    || module.depended_on_by.iter().any(|d| !live.contains(d))
            })
    }

    /// Points the root-type lookup at this module for all of its roots
    fn populate_lookup(&mut self, id: ModuleId) {
        let root_messages: Vec<MessageId> =
            self.modules[id.0].root_messages.iter().copied().collect();
        let root_enums: Vec<EnumId> = self.modules[id.0].root_enums.iter().copied().collect();
        for message in root_messages {
            self.message_module.insert(message, id);
        }
        for enum_id in root_enums {
            self.enum_module.insert(enum_id, id);
        }
    }

    /// Records a module-level dependency on a message's root-message family
    fn add_depends_on_message(&mut self, id: ModuleId, target: MessageId, registry: &TypeRegistry) {
        let root = registry.root_of(target);
        debug_assert!(
            !self.modules[id.0].root_messages.contains(&root),
            "module dependency targets one of its own root messages"
        );
        self.modules[id.0].depends_on_root_messages.insert(root);
    }

    /// Records a module-level dependency on an enum; an enum owned by a
    /// message family collapses to a dependency on that family's root
    fn add_depends_on_enum(&mut self, id: ModuleId, target: EnumId, registry: &TypeRegistry) {
        match registry.enum_type(target).root {
            Some(owner) => self.add_depends_on_message(id, owner, registry),
            None => {
                self.modules[id.0].depends_on_root_enums.insert(target);
            }
        }
    }

    /// Merges module `other` into module `into`.
    ///
    /// This is the only mutation primitive of the merge algorithm: root and
    /// dependency-target sets are unioned (then self-references created by
    /// the union subtracted), every neighbor's forward/reverse edge is
    /// redirected from `other` to `into`, the root lookup is repointed, and
    /// `other` is marked removed.
    pub fn merge(&mut self, into: ModuleId, other: ModuleId) -> Result<()> {
        if into == other {
            return Err(Error::SelfMerge);
        }
        if self.modules[into.0].namespace != self.modules[other.0].namespace {
            return Err(Error::NamespaceMismatch {
                left: self.modules[into.0].namespace.clone(),
                right: self.modules[other.0].namespace.clone(),
            });
        }

        let other_root_messages = mem::take(&mut self.modules[other.0].root_messages);
        let other_root_enums = mem::take(&mut self.modules[other.0].root_enums);
        let other_dep_messages = mem::take(&mut self.modules[other.0].depends_on_root_messages);
        let other_dep_enums = mem::take(&mut self.modules[other.0].depends_on_root_enums);
        let other_depends_on = mem::take(&mut self.modules[other.0].depends_on);
        let other_depended_on_by = mem::take(&mut self.modules[other.0].depended_on_by);

        {
            let target = &mut self.modules[into.0];
            target.root_messages.extend(&other_root_messages);
            target.root_enums.extend(&other_root_enums);
            target.depends_on_root_messages.extend(&other_dep_messages);
            target.depends_on_root_enums.extend(&other_dep_enums);

            let roots = target.root_messages.clone();
            target
                .depends_on_root_messages
                .retain(|m| !roots.contains(m));
            let enum_roots = target.root_enums.clone();
            target
                .depends_on_root_enums
                .retain(|e| !enum_roots.contains(e));
        }

        for &dependency in &other_depends_on {
            self.modules[dependency.0].depended_on_by.remove(&other);
            self.modules[dependency.0].depended_on_by.insert(into);
        }
        for &dependent in &other_depended_on_by {
            self.modules[dependent.0].depends_on.remove(&other);
            self.modules[dependent.0].depends_on.insert(into);
        }

        {
            let target = &mut self.modules[into.0];
            target.depends_on.extend(&other_depends_on);
            target.depended_on_by.extend(&other_depended_on_by);
            target.depends_on.remove(&into);
            target.depended_on_by.remove(&into);
        }

        self.populate_lookup(into);
        self.modules[other.0].removed = true;
        Ok(())
    }

    /// Creates one module per root enum, keyed by its namespace
    fn gather_enum_modules(&mut self, registry: &TypeRegistry) {
        let mut by_namespace: BTreeMap<&str, Vec<EnumId>> = BTreeMap::new();
        for enum_id in registry.root_enum_ids() {
            by_namespace
                .entry(registry.enum_type(enum_id).namespace.as_str())
                .or_default()
                .push(enum_id);
        }

        for (namespace, enum_ids) in by_namespace {
            for enum_id in enum_ids {
                let module = self.add_module(namespace);
                self.modules[module.0].root_enums.insert(enum_id);
                self.enum_module.insert(enum_id, module);
            }
        }
    }

    /// Creates one module per not-yet-assigned root-message family.
    ///
    /// Each root's nesting tree contributes its dependency targets
    /// (self-dependencies within the family excluded). If grouped roots
    /// already carry modules from an earlier iteration, those modules merge
    /// into the new one so each connected family keeps a single module.
    fn gather_message_modules(&mut self, registry: &TypeRegistry) -> Result<()> {
        let roots: Vec<MessageId> = registry.root_message_ids().collect();
        let mut remaining: BTreeSet<MessageId> = roots.iter().copied().collect();

        for root in roots {
            if !remaining.contains(&root) {
                continue;
            }

            let module = self.add_module(registry.message(root).namespace.as_str());
            self.modules[module.0].root_messages.insert(root);

            for member in family_members(registry, root) {
                let message = registry.message(member);
                for &dependency in &message.depends_on_messages {
                    if registry.root_of(dependency) != root {
                        self.add_depends_on_message(module, dependency, registry);
                    }
                }
                for &dependency in &message.depends_on_enums {
                    if registry.enum_type(dependency).root != Some(root) {
                        self.add_depends_on_enum(module, dependency, registry);
                    }
                }
            }

            let existing: BTreeSet<ModuleId> = self.modules[module.0]
                .root_messages
                .iter()
                .filter_map(|m| self.message_module.get(m).copied())
                .collect();
            if existing.is_empty() {
                self.populate_lookup(module);
            } else {
                for other in existing {
                    debug!("Re-merging existing module into new family module");
                    self.merge(module, other)?;
                }
            }

            let assigned = self.modules[module.0].root_messages.clone();
            remaining.retain(|m| !assigned.contains(m));
        }
        Ok(())
    }

    /// Resolves every module's root-level dependency targets to module edges
    fn add_module_dependencies(&mut self) {
        for id in self.live_ids() {
            let message_targets: Vec<MessageId> = self.modules[id.0]
                .depends_on_root_messages
                .iter()
                .copied()
                .collect();
            let enum_targets: Vec<EnumId> = self.modules[id.0]
                .depends_on_root_enums
                .iter()
                .copied()
                .collect();

            for target in message_targets {
                let other = self
                    .message_module
                    .get(&target)
                    .copied()
                    .expect("every root message is assigned a module during partitioning");
                debug_assert!(other != id, "module depends on itself");
                self.modules[id.0].depends_on.insert(other);
                self.modules[other.0].depended_on_by.insert(id);
            }
            for target in enum_targets {
                let other = self
                    .enum_module
                    .get(&target)
                    .copied()
                    .expect("every root enum is assigned a module during partitioning");
                debug_assert!(other != id, "module depends on itself");
                self.modules[id.0].depends_on.insert(other);
                self.modules[other.0].depended_on_by.insert(id);
            }
        }
    }
}

/// Enumerates a root message and every message nested under it
fn family_members(registry: &TypeRegistry, root: MessageId) -> Vec<MessageId> {
    debug_assert!(registry.message(root).is_root());
    let mut members = Vec::new();
    let mut remaining = vec![root];
    while let Some(current) = remaining.pop() {
        members.push(current);
        remaining.extend(registry.message(current).nested_messages.iter().copied());
    }
    members
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EnumType, MessageType};

    fn add_message(
        registry: &mut TypeRegistry,
        full_name: &str,
        namespace: &str,
        root: Option<MessageId>,
    ) -> MessageId {
        let name = full_name.rsplit(['.', '/']).next().unwrap().to_string();
        registry.add_message(MessageType::new(full_name, name, namespace, root))
    }

    fn add_enum(
        registry: &mut TypeRegistry,
        full_name: &str,
        namespace: &str,
        root: Option<MessageId>,
    ) -> EnumId {
        let name = full_name.rsplit(['.', '/']).next().unwrap().to_string();
        registry.add_enum(EnumType {
            full_name: full_name.to_string(),
            name,
            namespace: namespace.to_string(),
            root,
            pairs: vec![("Unknown".to_string(), 0)],
        })
    }

    #[test]
    fn test_partition_simple_pair() {
        let mut registry = TypeRegistry::new();
        let a = add_message(&mut registry, "N.A", "N", None);
        let b = add_message(&mut registry, "N.B", "N", None);
        registry.message_mut(a).depends_on_messages.insert(b);

        let graph = ModuleGraph::partition(&registry).unwrap();
        assert_eq!(graph.live_count(), 2);

        let module_a = graph.module_of_message(a).unwrap();
        let module_b = graph.module_of_message(b).unwrap();
        assert_ne!(module_a, module_b);
        assert!(graph.module(module_a).depends_on.contains(&module_b));
        assert!(graph.module(module_b).depended_on_by.contains(&module_a));
    }

    #[test]
    fn test_nested_enum_dependency_collapses_to_family_root() {
        let mut registry = TypeRegistry::new();
        let a = add_message(&mut registry, "N.A", "N", None);
        let b = add_message(&mut registry, "N.B", "N", None);
        let kind = add_enum(&mut registry, "N.B/Kind", "N", Some(b));
        registry.message_mut(b).nested_enums.push(kind);
        registry.message_mut(a).depends_on_enums.insert(kind);

        let graph = ModuleGraph::partition(&registry).unwrap();
        let module_a = graph.module_of_message(a).unwrap();
        let module_b = graph.module_of_message(b).unwrap();

        // the enum is not an independent dependency target
        assert!(graph.module(module_a).depends_on_root_enums.is_empty());
        assert!(graph
            .module(module_a)
            .depends_on_root_messages
            .contains(&b));
        assert!(graph.module(module_a).depends_on.contains(&module_b));
    }

    #[test]
    fn test_self_dependencies_are_not_module_edges() {
        let mut registry = TypeRegistry::new();
        let a = add_message(&mut registry, "N.A", "N", None);
        let nested = add_message(&mut registry, "N.A/Inner", "N", Some(a));
        registry.message_mut(a).nested_messages.push(nested);
        registry.message_mut(a).depends_on_messages.insert(nested);
        registry.message_mut(nested).depends_on_messages.insert(a);

        let graph = ModuleGraph::partition(&registry).unwrap();
        let module_a = graph.module_of_message(a).unwrap();
        assert!(graph.module(module_a).depends_on.is_empty());
        assert_eq!(graph.live_count(), 1);
    }

    #[test]
    fn test_one_module_per_root_enum() {
        let mut registry = TypeRegistry::new();
        let color = add_enum(&mut registry, "N.Color", "N", None);
        let shape = add_enum(&mut registry, "N.Shape", "N", None);

        let graph = ModuleGraph::partition(&registry).unwrap();
        assert_eq!(graph.live_count(), 2);
        assert_ne!(
            graph.module_of_enum(color).unwrap(),
            graph.module_of_enum(shape).unwrap()
        );
    }

    #[test]
    fn test_merge_unions_and_redirects_edges() {
        let mut registry = TypeRegistry::new();
        let a = add_message(&mut registry, "N.A", "N", None);
        let b = add_message(&mut registry, "N.B", "N", None);
        let c = add_message(&mut registry, "N.C", "N", None);
        registry.message_mut(a).depends_on_messages.insert(b);
        registry.message_mut(c).depends_on_messages.insert(b);

        let mut graph = ModuleGraph::partition(&registry).unwrap();
        let module_a = graph.module_of_message(a).unwrap();
        let module_b = graph.module_of_message(b).unwrap();
        let module_c = graph.module_of_message(c).unwrap();

        graph.merge(module_a, module_b).unwrap();

        assert!(graph.module(module_b).removed);
        assert_eq!(graph.module_of_message(b), Some(module_a));
        // a's dependency on b became a self-reference and was subtracted
        assert!(graph.module(module_a).depends_on.is_empty());
        // c's edge was redirected from b to the merged module
        assert!(graph.module(module_c).depends_on.contains(&module_a));
        assert!(graph.module(module_a).depended_on_by.contains(&module_c));
        assert_eq!(graph.live_count(), 2);
    }

    #[test]
    fn test_merge_rejects_different_namespaces() {
        let mut graph = ModuleGraph::new();
        let a = graph.add_module("N");
        let b = graph.add_module("M");
        assert!(matches!(
            graph.merge(a, b),
            Err(Error::NamespaceMismatch { .. })
        ));
    }

    #[test]
    fn test_merge_rejects_self() {
        let mut graph = ModuleGraph::new();
        let a = graph.add_module("N");
        assert!(matches!(graph.merge(a, a), Err(Error::SelfMerge)));
    }
}
