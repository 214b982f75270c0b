// SPDX-FileCopyrightText: 2026 Tome Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Tome extension registry.

use thiserror::Error;

use crate::types::SourceId;

/// Why an artifact was rejected during validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IncompatibleReason {
    /// The manifest does not declare the feature marker of a Tome extension.
    #[error("missing feature marker `{expected}`")]
    MissingFeature { expected: String },

    /// The library version derived from the version name is outside the supported range.
    #[error("library version {found} is outside the supported range {min} to {max}")]
    LibVersionOutOfRange {
        found: String,
        min: String,
        max: String,
    },

    /// The package carries no signature.
    #[error("package is not signed")]
    MissingSignature,

    /// The package was signed by a key that is not in the trusted set.
    #[error("signer {key} is not trusted")]
    UntrustedSigner { key: String },

    /// The signature does not verify against the package contents.
    #[error("signature verification failed: {0}")]
    BadSignature(String),

    /// The manifest names a different package than the one requested.
    #[error("manifest declares package `{found}`, expected `{expected}`")]
    PackageMismatch { expected: String, found: String },
}

/// The primary error type used across the registry, installer, and cache.
#[derive(Debug, Error)]
pub enum TomeError {
    /// Configuration errors (invalid TOML, bad values).
    #[error("configuration error: {0}")]
    Config(String),

    /// Registry store errors (database connection, query failure, constraint violation).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Catalog or artifact retrieval failed.
    #[error("network error for {url}: {message}")]
    Network {
        url: String,
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The artifact could not be converted into a loadable module.
    #[error("failed to transcode artifact {artifact}: {message}")]
    Transcode { artifact: String, message: String },

    /// The artifact failed feature, version, or signature validation.
    #[error("incompatible artifact {artifact}: {reason}")]
    IncompatibleArtifact {
        artifact: String,
        reason: IncompatibleReason,
    },

    /// The loaded module does not expose a recognized capability shape.
    #[error("capability discovery failed for {module}: {message}")]
    CapabilityDiscovery { module: String, message: String },

    /// The module file could not be loaded or compiled.
    #[error("failed to load module {path}: {message}")]
    ModuleLoad { path: String, message: String },

    /// No extension record exists for the package.
    #[error("extension not found: {0}")]
    ExtensionNotFound(String),

    /// No source record exists for the identifier.
    #[error("source not found: {0}")]
    SourceNotFound(SourceId),

    /// The source exists but could not be resolved to a live instance.
    #[error("source {source_id} unavailable: {message}")]
    SourceUnavailable { source_id: SourceId, message: String },

    /// The operation requires an installed extension.
    #[error("extension {0} is not installed")]
    NotInstalled(String),

    /// `update` was called without a staged update.
    #[error("nothing to update for {0}; refresh the catalog first")]
    NoPendingUpdate(String),

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl TomeError {
    /// Wrap any error as a storage error.
    pub fn storage(e: impl std::error::Error + Send + Sync + 'static) -> Self {
        TomeError::Storage {
            source: Box::new(e),
        }
    }

    /// Coarse status code for direct HTTP mapping.
    pub fn http_status(&self) -> u16 {
        match self {
            TomeError::ExtensionNotFound(_) | TomeError::SourceNotFound(_) => 404,
            TomeError::NotInstalled(_) | TomeError::NoPendingUpdate(_) => 409,
            TomeError::Transcode { .. }
            | TomeError::IncompatibleArtifact { .. }
            | TomeError::CapabilityDiscovery { .. } => 422,
            TomeError::Network { .. } => 502,
            TomeError::Config(_)
            | TomeError::Storage { .. }
            | TomeError::ModuleLoad { .. }
            | TomeError::SourceUnavailable { .. }
            | TomeError::Internal(_) => 500,
        }
    }
}

impl From<std::io::Error> for TomeError {
    fn from(e: std::io::Error) -> Self {
        TomeError::Internal(format!("I/O error: {e}"))
    }
}
