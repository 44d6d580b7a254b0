//! Error families for graph building, lookup and inference.
//!
//! Three concerns, three types:
//!
//! - [`BuildError`]: a module could not be turned into a graph at all
//!   (unreadable file, malformed tree dump, unresolvable module name).
//!   Aborts that module's build only.
//! - [`NotFoundError`]: a requested name has no binding anywhere in the
//!   applicable lookup chain. Local to a single query and catchable.
//! - [`InferenceError`]: nothing could be inferred for a node. Distinct
//!   from the `Unknown` *value* sentinel, which flows through inference
//!   results and is never raised.

use std::path::PathBuf;

use thiserror::Error;

// ============================================================================
// Build Errors
// ============================================================================

/// Errors that can occur while building a module graph.
#[derive(Debug, Error)]
pub enum BuildError {
    /// The serialized parse tree could not be read from disk.
    #[error("unable to load file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The serialized parse tree is malformed or uses an unknown dialect.
    #[error("parse tree error: {message}")]
    Parse { message: String },

    /// No tree source could provide the requested module.
    #[error("unable to resolve module '{name}'")]
    UnknownModule { name: String },
}

impl BuildError {
    /// Shorthand for a [`BuildError::Parse`] with a formatted message.
    pub fn parse(message: impl Into<String>) -> Self {
        BuildError::Parse {
            message: message.into(),
        }
    }
}

/// Result type for build operations.
pub type BuildResult<T> = Result<T, BuildError>;

// ============================================================================
// Lookup Errors
// ============================================================================

/// A name has no binding anywhere in the applicable lookup chain.
#[derive(Debug, Error)]
#[error("'{name}' not found")]
pub struct NotFoundError {
    /// The name that was looked up.
    pub name: String,
}

impl NotFoundError {
    pub fn new(name: impl Into<String>) -> Self {
        NotFoundError { name: name.into() }
    }
}

/// Result type for attribute and local lookups.
pub type LookupResult<T> = Result<T, NotFoundError>;

// ============================================================================
// Inference Errors
// ============================================================================

/// Inference produced no candidate at all for a node.
#[derive(Debug, Error)]
#[error("inference failed{}", name.as_ref().map(|n| format!(" for '{n}'")).unwrap_or_default())]
pub struct InferenceError {
    /// The lookup name that triggered inference, when there was one.
    pub name: Option<String>,
}

impl InferenceError {
    pub fn new() -> Self {
        InferenceError { name: None }
    }

    pub fn named(name: impl Into<String>) -> Self {
        InferenceError {
            name: Some(name.into()),
        }
    }
}

impl Default for InferenceError {
    fn default() -> Self {
        Self::new()
    }
}

impl From<NotFoundError> for InferenceError {
    fn from(err: NotFoundError) -> Self {
        InferenceError::named(err.name)
    }
}

/// Result type for inference operations.
pub type InferResult<T> = Result<T, InferenceError>;
