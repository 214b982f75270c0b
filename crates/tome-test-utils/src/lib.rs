// SPDX-FileCopyrightText: 2026 Tome Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Tome integration tests.
//!
//! Provides mock collaborators, package and catalog builders, and a test
//! harness for fast, deterministic tests without network access.
//!
//! # Components
//!
//! - [`MockTransport`] - URL-to-bytes transport with failure injection
//! - [`MockModuleLoader`] / [`CountingLoader`] - module loaders that count loads
//! - [`ManualClock`] - clock advanced by hand
//! - [`artifact::ArtifactBuilder`] - signed extension packages
//! - [`TestHarness`] - an `ExtensionManager` over a temp registry

pub mod artifact;
pub mod catalog;
pub mod clock;
pub mod harness;
pub mod loader;
pub mod transport;
pub mod wat;

pub use clock::ManualClock;
pub use harness::TestHarness;
pub use loader::{CountingLoader, MockModuleLoader};
pub use transport::MockTransport;
