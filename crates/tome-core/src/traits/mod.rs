// SPDX-FileCopyrightText: 2026 Tome Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Collaborator traits the registry depends on.
//!
//! Network access, module loading, and time all sit behind these traits so
//! the lifecycle logic can be driven by mocks in tests.

pub mod clock;
pub mod loader;
pub mod transport;

pub use clock::{Clock, SystemClock};
pub use loader::{Capability, LoadedModule, ModuleLoader, SourceHandle};
pub use transport::Transport;
