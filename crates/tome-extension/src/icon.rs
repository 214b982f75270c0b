// SPDX-FileCopyrightText: 2026 Tome Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! On-disk cache of extension icons.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tome_core::{TomeError, Transport};
use tracing::{debug, warn};

use crate::artifact::persist_atomic;

/// Icons are stored as `{dir}/{artifact}.icon` and served with a sniffed
/// content type.
pub struct IconCache {
    dir: PathBuf,
    transport: Arc<dyn Transport>,
}

impl IconCache {
    pub fn new(dir: impl Into<PathBuf>, transport: Arc<dyn Transport>) -> Self {
        Self {
            dir: dir.into(),
            transport,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn file_path(&self, artifact_name: &str) -> PathBuf {
        let flat: String = artifact_name
            .chars()
            .map(|c| if c == '/' || c == '\\' { '_' } else { c })
            .collect();
        self.dir.join(format!("{flat}.icon"))
    }

    /// Icon bytes and content type, fetching `icon_url` on a cache miss.
    pub async fn get(
        &self,
        artifact_name: &str,
        icon_url: &str,
    ) -> Result<(Vec<u8>, &'static str), TomeError> {
        let path = self.file_path(artifact_name);
        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                debug!(artifact = %artifact_name, "icon cache hit");
                let content_type = sniff_content_type(&bytes);
                return Ok((bytes, content_type));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %path.display(), error = %e, "unreadable cached icon, refetching"),
        }

        let bytes = self.transport.fetch(icon_url).await?;
        let dir = self.dir.clone();
        let Some(file_name) = path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
            return Err(TomeError::Internal(format!("invalid icon path {}", path.display())));
        };
        let to_write = bytes.clone();
        tokio::task::spawn_blocking(move || persist_atomic(&dir, &file_name, &to_write))
            .await
            .map_err(|e| TomeError::Internal(format!("icon write task panicked: {e}")))??;

        debug!(artifact = %artifact_name, bytes = bytes.len(), "icon cached");
        let content_type = sniff_content_type(&bytes);
        Ok((bytes, content_type))
    }

    /// Remove the cached icon, if any.
    pub async fn forget(&self, artifact_name: &str) {
        let path = self.file_path(artifact_name);
        if let Err(e) = tokio::fs::remove_file(&path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %path.display(), error = %e, "failed to remove cached icon");
            }
        }
    }
}

/// Content type from magic bytes; unknown images default to PNG.
pub fn sniff_content_type(bytes: &[u8]) -> &'static str {
    if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
        "image/png"
    } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        "image/jpeg"
    } else if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        "image/webp"
    } else if bytes.starts_with(b"GIF8") {
        "image/gif"
    } else {
        "image/png"
    }
}
