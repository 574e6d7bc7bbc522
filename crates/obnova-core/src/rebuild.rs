//! The end-to-end schema rebuilding pipeline.
//!
//! [`Rebuilder`] wires the stages together in their required order:
//! discovery, field population, nesting linkage, reachability verification,
//! enum pruning, dependency population, module partitioning, the five-phase
//! module merge, and file generation. The result is a [`SchemaSet`] holding
//! one [`OutputFile`] per surviving module, ready to render.
//!
//! The whole pipeline is synchronous and deterministic: identical input
//! descriptor sets produce byte-identical schema files.

use crate::analysis;
use crate::error::Result;
use crate::metadata::{DescriptorSet, RuntimeTypes};
use crate::model::TypeRegistry;
use crate::modules::{merge, ModuleGraph};
use crate::output::{self, OutputFile};
use std::collections::BTreeSet;
use std::path::Path;
use tracing::{debug, info, warn};

/// Rebuilds schema files from a descriptor set
#[derive(Debug)]
pub struct Rebuilder {
    set: DescriptorSet,
}

impl Rebuilder {
    /// Creates a rebuilder over a descriptor set
    pub fn new(set: DescriptorSet) -> Self {
        Self { set }
    }

    /// Creates a rebuilder from a JSON-serialized descriptor set
    pub fn from_json(data: &str) -> Result<Self> {
        Ok(Self::new(DescriptorSet::from_json(data)?))
    }

    /// Creates a rebuilder from a descriptor-set file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(DescriptorSet::from_file(path)?))
    }

    /// Runs the full pipeline and returns the generated schema files.
    pub fn rebuild(&self) -> Result<SchemaSet> {
        let runtime = self.set.require_runtime()?.clone();

        info!("Gathering message and enum types from the metadata...");
        let mut registry = TypeRegistry::new();
        analysis::discover_types(&self.set, &runtime, &mut registry);
        analysis::populate_message_fields(&self.set, &mut registry)?;
        info!("Found {} message types.", registry.message_count());
        info!("Found {} enum types.", registry.live_enum_count());
        if registry.message_count() == 0 {
            warn!("No message types found in the metadata.");
        }

        let namespaces: BTreeSet<&str> = registry
            .message_ids()
            .map(|id| registry.message(id).namespace.as_str())
            .collect();
        for namespace in namespaces {
            debug!("Message type namespace: '{namespace}'");
        }

        info!("Analyzing nested types and message dependencies...");
        analysis::link_nested_types(&self.set, &mut registry);
        analysis::verify_reachability(&registry)?;
        let pruned = analysis::prune_unreferenced_enums(&mut registry, &runtime)?;
        analysis::populate_dependencies(&mut registry, &runtime)?;
        info!("Pruned {pruned} enums not referenced by any message.");

        info!("Grouping messages and enums into modules...");
        let mut graph = ModuleGraph::partition(&registry)?;
        info!(
            "Initialized {} modules with {} dependency edges.",
            graph.live_count(),
            graph.edge_count()
        );

        merge::merge_modules(&mut graph)?;

        info!("Generating schema files...");
        let files = output::generate_files(&graph, &registry);
        info!("{} schema file(s) will be written.", files.len());

        Ok(SchemaSet {
            registry,
            runtime,
            files,
        })
    }
}

/// The rebuilt schema: generated files plus the registry they reference
#[derive(Debug)]
pub struct SchemaSet {
    registry: TypeRegistry,
    runtime: RuntimeTypes,
    files: Vec<OutputFile>,
}

impl SchemaSet {
    /// Generated files, in ordinal file-name order
    pub fn files(&self) -> &[OutputFile] {
        &self.files
    }

    /// The type registry backing the generated files
    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    /// Renders one file's complete schema text
    pub fn render(&self, file: &OutputFile) -> Result<String> {
        output::render_file(&self.registry, &self.runtime, file)
    }
}
