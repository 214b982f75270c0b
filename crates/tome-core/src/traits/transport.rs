// SPDX-FileCopyrightText: 2026 Tome Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Byte transport used for catalogs, artifacts, and icons.

use async_trait::async_trait;

use crate::error::TomeError;

/// Fetches the body behind a URL.
///
/// Implementations surface every failure, including timeouts and non-success
/// statuses, as [`TomeError::Network`].
#[async_trait]
pub trait Transport: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, TomeError>;
}
