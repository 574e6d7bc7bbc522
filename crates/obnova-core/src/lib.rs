//! # obnova-core
//!
//! A library for rebuilding `.proto` schema files from the type metadata of
//! compiled binaries.
//!
//! The schema compiler leaves recognizable conventions behind in generated
//! code: message classes implement a runtime marker interface, field numbers
//! survive as literal constants, oneof groups keep generated discriminator
//! enums. Given a [`metadata::DescriptorSet`] — the uniform type-descriptor
//! model an external assembly metadata reader produces from such a binary —
//! this crate recovers which types are messages and enums, their nesting and
//! field structure, the cross-type dependency graph, and a partition of all
//! root types into schema files whose import graph is acyclic and whose
//! files each belong to exactly one namespace.
//!
//! ## Architecture
//!
//! The library is organized as a strictly ordered pipeline:
//!
//! - [`metadata`]: the descriptor model supplied by a metadata reader
//! - [`analysis`]: type discovery and structural/logical analysis
//! - [`mapping`]: pure mapping from metadata types to proto type names
//! - [`modules`]: module partitioning and the five-phase merge algorithm
//! - [`output`]: deterministic file generation and schema rendering
//! - [`error`]: error types and handling
//!
//! ## Example
//!
//! ```no_run
//! use obnova_core::{DescriptorSet, Rebuilder};
//!
//! // Load a descriptor dump produced by an assembly metadata reader
//! let set = DescriptorSet::from_file("./app.descriptors.json")?;
//!
//! // Rebuild and render the schema files
//! let schema = Rebuilder::new(set).rebuild()?;
//! for file in schema.files() {
//!     println!("// {}", file.file_name);
//!     println!("{}", schema.render(file)?);
//! }
//! # Ok::<(), obnova_core::Error>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unreachable_pub)]

pub mod analysis;
pub mod error;
pub mod mapping;
pub mod metadata;
pub mod model;
pub mod modules;
pub mod output;
pub mod rebuild;

// Re-export primary types for convenience
pub use error::{Error, Result};
pub use metadata::{
    ConstantDescriptor, DescriptorSet, PropertyDescriptor, RuntimeTypes, TypeDescriptor, TypeRef,
};
pub use model::{EnumId, EnumType, Field, MessageId, MessageType, Oneof, TypeRegistry};
pub use modules::{Module, ModuleGraph, ModuleId};
pub use output::OutputFile;
pub use rebuild::{Rebuilder, SchemaSet};

/// Crate version for programmatic access
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
