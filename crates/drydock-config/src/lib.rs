// SPDX-FileCopyrightText: 2026 Drydock Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration for the Drydock session coordinator.
//!
//! TOML files are merged in XDG order with `DRYDOCK_*` environment variable
//! overrides. All sections reject unknown keys at startup so typos surface
//! as actionable errors rather than silently-ignored settings.

pub mod loader;
pub mod model;

pub use loader::{load_config, load_config_from_path, load_config_from_str};
pub use model::DrydockConfig;
