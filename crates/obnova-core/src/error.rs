//! Error types for the obnova-core library.
//!
//! This module provides error handling using the `thiserror` crate. Variants
//! fall into two kinds: structured input errors (the binary's metadata breaks
//! a convention the rebuilder relies on) and invariant violations (the module
//! graph reached a state the merge algorithm must never produce). The latter
//! indicate a defect in this engine rather than bad input; see
//! [`Error::is_invariant_violation`].

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for obnova operations
pub type Result<T> = std::result::Result<T, Error>;

/// Comprehensive error type for all obnova operations
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Failed to read a descriptor input file
    #[error("failed to read file '{path}': {source}")]
    FileRead {
        /// Path to the file that failed to read
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse a serialized descriptor set
    #[error("failed to parse descriptor set: {0}")]
    DescriptorParse(#[from] serde_json::Error),

    /// The descriptor set carries no protobuf runtime marker types
    #[error("no protobuf runtime metadata found in the input (missing message-marker interface)")]
    MissingRuntime,

    /// Two differently named fields claim the same field number
    #[error("field number {number} is used by both '{first}' and '{second}' on message '{message}'")]
    DuplicateFieldNumber {
        /// Full name of the message carrying the clash
        message: String,
        /// The contested field number
        number: i32,
        /// Name of the field that claimed the number first
        first: String,
        /// Name of the field that claimed it again
        second: String,
    },

    /// A field-number constant has no matching property
    #[error("no property was found for field '{field}' on message '{message}'")]
    MissingFieldProperty {
        /// Full name of the message
        message: String,
        /// Name of the field without a property
        field: String,
    },

    /// A oneof member has no matching property
    #[error("no property was found for oneof '{oneof}' member '{field}' on message '{message}'")]
    MissingOneofProperty {
        /// Full name of the message
        message: String,
        /// Name of the oneof group
        oneof: String,
        /// Name of the member field without a property
        field: String,
    },

    /// Messages were discovered that are not reachable from any root
    #[error("{count} message(s) are not reachable from any root message")]
    DisconnectedMessages {
        /// Number of unreachable messages
        count: usize,
    },

    /// A field dependency resolves to neither a known message nor enum
    #[error("type reference '{full_name}' on message '{message}' matches no known message or enum")]
    UnknownTypeReference {
        /// Full name of the message holding the reference
        message: String,
        /// The unresolvable full name
        full_name: String,
    },

    /// A generic container carries the wrong number of type arguments
    #[error("'{container}' must have exactly {expected} type argument(s), but found {actual}")]
    GenericArity {
        /// Full name of the generic container type
        container: String,
        /// Required argument count
        expected: usize,
        /// Observed argument count
        actual: usize,
    },

    /// Attempted to merge modules from different namespaces
    #[error("cannot merge modules with different namespaces: '{left}' and '{right}'")]
    NamespaceMismatch {
        /// Namespace of the surviving module
        left: String,
        /// Namespace of the module being merged away
        right: String,
    },

    /// Attempted to merge a module with itself
    #[error("cannot merge a module with itself")]
    SelfMerge,

    /// The final module graph still contains a dependency cycle
    #[error("there is a cycle in module dependencies (through namespace '{namespace}')")]
    ResidualCycle {
        /// Namespace of one module on the cycle
        namespace: String,
    },

    /// A removed module is still referenced by surviving structures
    #[error("a removed module is still referenced by other modules or type assignments")]
    DanglingModule,
}

impl Error {
    /// Creates a new file read error
    pub fn file_read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FileRead {
            path: path.into(),
            source,
        }
    }

    /// Creates a new duplicate field number error
    pub fn duplicate_field_number(
        message: impl Into<String>,
        number: i32,
        first: impl Into<String>,
        second: impl Into<String>,
    ) -> Self {
        Self::DuplicateFieldNumber {
            message: message.into(),
            number,
            first: first.into(),
            second: second.into(),
        }
    }

    /// Creates a new missing field property error
    pub fn missing_field_property(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::MissingFieldProperty {
            message: message.into(),
            field: field.into(),
        }
    }

    /// Creates a new missing oneof member property error
    pub fn missing_oneof_property(
        message: impl Into<String>,
        oneof: impl Into<String>,
        field: impl Into<String>,
    ) -> Self {
        Self::MissingOneofProperty {
            message: message.into(),
            oneof: oneof.into(),
            field: field.into(),
        }
    }

    /// Creates a new unknown type reference error
    pub fn unknown_type_reference(
        message: impl Into<String>,
        full_name: impl Into<String>,
    ) -> Self {
        Self::UnknownTypeReference {
            message: message.into(),
            full_name: full_name.into(),
        }
    }

    /// Creates a new generic arity error
    pub fn generic_arity(container: impl Into<String>, expected: usize, actual: usize) -> Self {
        Self::GenericArity {
            container: container.into(),
            expected,
            actual,
        }
    }

    /// Returns true if this error indicates a defect in the merge engine
    /// itself rather than a problem with the input metadata
    pub fn is_invariant_violation(&self) -> bool {
        matches!(
            self,
            Self::NamespaceMismatch { .. }
                | Self::SelfMerge
                | Self::ResidualCycle { .. }
                | Self::DanglingModule
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::duplicate_field_number("App.Person", 3, "Name", "Email");
        assert!(err.to_string().contains("field number 3"));
        assert!(err.to_string().contains("App.Person"));
        assert!(err.to_string().contains("Name"));
        assert!(err.to_string().contains("Email"));
    }

    #[test]
    fn test_is_invariant_violation() {
        assert!(Error::SelfMerge.is_invariant_violation());
        assert!(Error::DanglingModule.is_invariant_violation());
        assert!(!Error::MissingRuntime.is_invariant_violation());
        assert!(!Error::missing_field_property("App.Person", "Name").is_invariant_violation());
    }
}
