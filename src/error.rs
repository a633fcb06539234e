//! Error taxonomy for the compile-load-cache-invoke pipeline.
//!
//! Every failure that can reach a caller carries the logical class name and,
//! where one exists, the filesystem path a human would need to inspect the
//! staged source or compiled artifact.

use std::path::PathBuf;

use thiserror::Error;

/// Errors produced by the dynamic class pipeline.
#[derive(Debug, Error)]
pub enum DynError {
    /// The submitted source has no parsable class declaration, or declares
    /// members outside the marshallable signature set.
    #[error("malformed source: {detail}")]
    MalformedSource { detail: String },

    /// The backend reported failure, or the expected artifact was absent
    /// after the compiler ran.
    #[error("compilation of '{name}' failed, working directory {work_dir}")]
    CompilationFailed { name: String, work_dir: PathBuf },

    /// The loader could not resolve the compiled artifact for a name.
    #[error("class '{name}' not found at {path}")]
    TypeNotFound { name: String, path: PathBuf },

    /// No member with the requested name and signature exists on the type.
    #[error("no member '{member}' with a matching signature on '{type_name}'")]
    MemberNotFound { type_name: String, member: String },

    /// The member exists but is not public.
    #[error("member '{member}' on '{type_name}' is not public")]
    AccessDenied { type_name: String, member: String },

    /// A constructor could not produce an instance.
    #[error("could not instantiate '{type_name}': {detail}")]
    InstantiationFailed { type_name: String, detail: String },

    /// The invoked code itself failed; carries the original message unchanged.
    #[error("'{type_name}::{member}' raised: {message}")]
    TargetRaised {
        type_name: String,
        member: String,
        message: String,
    },

    /// A per-call library override was supplied to a backend that fixes its
    /// library configuration at construction time.
    #[error("backend '{backend}' does not accept a per-call library override")]
    LibraryOverride { backend: &'static str },

    /// An I/O failure, annotated with the path involved.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl DynError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        DynError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn malformed(detail: impl Into<String>) -> Self {
        DynError::MalformedSource {
            detail: detail.into(),
        }
    }
}

/// Result alias used throughout the crate.
pub type DynResult<T> = Result<T, DynError>;
