// SPDX-FileCopyrightText: 2026 Tome Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Tome extension registry.
//!
//! This crate provides the error type, domain types, and collaborator traits
//! used throughout the Tome workspace. Storage, transport, and module loading
//! implementations all build on the definitions here.

pub mod error;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::{IncompatibleReason, TomeError};
pub use types::{
    CatalogEntry, ExtensionRecord, ExtensionView, InstallOutcome, LibVersion, SourceDescriptor,
    SourceId, SourceRecord, SourceView, module_file_name,
};

pub use traits::{
    Capability, Clock, LoadedModule, ModuleLoader, SourceHandle, SystemClock, Transport,
};

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;

    use super::*;

    struct Echo(SourceDescriptor);

    #[async_trait]
    impl SourceHandle for Echo {
        fn descriptor(&self) -> &SourceDescriptor {
            &self.0
        }

        async fn invoke(
            &self,
            _method: &str,
            args: serde_json::Value,
        ) -> Result<serde_json::Value, TomeError> {
            Ok(args)
        }
    }

    fn echo(id: SourceId, lang: &str) -> Arc<dyn SourceHandle> {
        Arc::new(Echo(SourceDescriptor {
            id,
            name: format!("source-{id}"),
            lang: lang.into(),
            nsfw: false,
        }))
    }

    #[test]
    fn error_status_mapping() {
        assert_eq!(TomeError::ExtensionNotFound("x".into()).http_status(), 404);
        assert_eq!(TomeError::SourceNotFound(3).http_status(), 404);
        assert_eq!(TomeError::NotInstalled("x".into()).http_status(), 409);
        assert_eq!(TomeError::NoPendingUpdate("x".into()).http_status(), 409);
        assert_eq!(
            TomeError::IncompatibleArtifact {
                artifact: "a".into(),
                reason: IncompatibleReason::MissingSignature,
            }
            .http_status(),
            422
        );
        assert_eq!(
            TomeError::Network {
                url: "u".into(),
                message: "m".into(),
                source: None,
            }
            .http_status(),
            502
        );
        assert_eq!(
            TomeError::storage(std::io::Error::other("disk")).http_status(),
            500
        );
    }

    #[test]
    fn incompatible_reason_display() {
        let err = TomeError::IncompatibleArtifact {
            artifact: "foo.tar.gz".into(),
            reason: IncompatibleReason::LibVersionOutOfRange {
                found: "1.2".into(),
                min: "1.3".into(),
                max: "1.5".into(),
            },
        };
        assert_eq!(
            err.to_string(),
            "incompatible artifact foo.tar.gz: library version 1.2 is outside the supported range 1.3 to 1.5"
        );
    }

    #[test]
    fn capability_flattens_in_order() {
        let group = Capability::Group(vec![echo(1, "en"), echo(2, "fr")]);
        assert!(group.is_group());
        let ids: Vec<_> = group.descriptors().iter().map(|d| d.id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(group.into_sources().len(), 2);

        let single = Capability::Single(echo(9, "en"));
        assert!(!single.is_group());
        assert_eq!(single.into_sources()[0].descriptor().id, 9);
    }

    #[tokio::test]
    async fn source_handle_is_object_safe() {
        let handle = echo(1, "en");
        let out = handle
            .invoke("popular", serde_json::json!({"page": 1}))
            .await
            .unwrap();
        assert_eq!(out["page"], 1);
    }
}
