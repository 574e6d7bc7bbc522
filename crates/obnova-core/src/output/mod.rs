//! Output file generation.
//!
//! Once the module graph has reached its merge fixed point, every surviving
//! module becomes one [`OutputFile`]: a deterministic file name and package
//! derived from the module's namespace, the root messages and enums in
//! name order, and the complete import list (external well-known imports
//! plus the file names of every module this one depends on).
//!
//! Rendering the file content is handled by [`render_file`].

mod render;

use crate::mapping::pascal_to_lower_snake;
use crate::model::{EnumId, MessageId, TypeRegistry};
use crate::modules::{ModuleGraph, ModuleId};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

pub use render::render_file;

/// File-name base used for the empty namespace
const EMPTY_NAMESPACE_BASE: &str = "base";

/// One generated schema file
#[derive(Debug, Clone)]
pub struct OutputFile {
    /// File name, unique case-insensitively across the run
    pub file_name: String,
    /// Package name (empty namespaces produce no package line)
    pub package_name: String,
    /// Original namespace, emitted as the namespace option
    pub namespace: String,
    /// Imports in ordinal order
    pub imports: BTreeSet<String>,
    /// Root messages, name-sorted
    pub messages: Vec<MessageId>,
    /// Root enums, name-sorted
    pub enums: Vec<EnumId>,
}

/// Turns every live module into an output file with a deterministic name.
///
/// Modules are ordered dependency-free first, then by ascending root-message
/// count, then by ascending creation id; the order only affects which module
/// gets which disambiguation index, never the content. When several live
/// modules share a namespace the file names carry a 1-based index, retrying
/// higher indices on case-insensitive collisions.
pub fn generate_files(graph: &ModuleGraph, registry: &TypeRegistry) -> Vec<OutputFile> {
    let mut ordered: Vec<ModuleId> = graph.live_ids();
    ordered.sort_by_key(|&id| {
        let module = graph.module(id);
        (
            !module.depends_on.is_empty(),
            module.root_messages.len(),
            id,
        )
    });

    let mut namespace_counts: BTreeMap<&str, usize> = BTreeMap::new();
    for &id in &ordered {
        *namespace_counts
            .entry(graph.module(id).namespace.as_str())
            .or_default() += 1;
    }

    let mut taken: BTreeSet<String> = BTreeSet::new();
    let mut files: Vec<(ModuleId, OutputFile)> = Vec::with_capacity(ordered.len());

    for &id in &ordered {
        let module = graph.module(id);
        let package_name = pascal_to_lower_snake(&module.namespace);
        let base = if package_name.is_empty() {
            EMPTY_NAMESPACE_BASE
        } else {
            package_name.as_str()
        };
        let indexed = namespace_counts[module.namespace.as_str()] > 1;
        let file_name = claim_file_name(&mut taken, base, indexed);
        debug!("Module {id:?} becomes {file_name}");

        let mut imports: BTreeSet<String> = BTreeSet::new();
        for &root in &module.root_messages {
            for member in family(registry, root) {
                imports.extend(registry.message(member).imports.iter().cloned());
            }
        }

        let mut messages: Vec<MessageId> = module.root_messages.iter().copied().collect();
        messages.sort_by(|&x, &y| registry.message(x).name.cmp(&registry.message(y).name));
        let mut enums: Vec<EnumId> = module.root_enums.iter().copied().collect();
        enums.sort_by(|&x, &y| registry.enum_type(x).name.cmp(&registry.enum_type(y).name));

        files.push((
            id,
            OutputFile {
                file_name,
                package_name,
                namespace: module.namespace.clone(),
                imports,
                messages,
                enums,
            },
        ));
    }

    // cross-module imports need every file name assigned first
    let names_by_module: BTreeMap<ModuleId, String> = files
        .iter()
        .map(|(id, file)| (*id, file.file_name.clone()))
        .collect();
    for (id, file) in &mut files {
        for dependency in &graph.module(*id).depends_on {
            file.imports.insert(names_by_module[dependency].clone());
        }
    }

    let mut files: Vec<OutputFile> = files.into_iter().map(|(_, file)| file).collect();
    files.sort_by(|a, b| a.file_name.cmp(&b.file_name));
    files
}

/// Claims the next free file name, comparing case-insensitively
fn claim_file_name(taken: &mut BTreeSet<String>, base: &str, indexed: bool) -> String {
    if !indexed {
        let candidate = format!("{base}.proto");
        if taken.insert(candidate.to_lowercase()) {
            return candidate;
        }
    }
    let mut index = 1usize;
    loop {
        let candidate = format!("{base}.{index}.proto");
        if taken.insert(candidate.to_lowercase()) {
            return candidate;
        }
        index += 1;
    }
}

/// A root message plus everything nested under it
fn family(registry: &TypeRegistry, root: MessageId) -> Vec<MessageId> {
    let mut members = Vec::new();
    let mut remaining = vec![root];
    while let Some(current) = remaining.pop() {
        members.push(current);
        remaining.extend(registry.message(current).nested_messages.iter().copied());
    }
    members
}
