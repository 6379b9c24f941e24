// SPDX-FileCopyrightText: 2026 Drydock Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test support for driving a full coordinator stack without the network.
//!
//! `TestHarness` assembles a router with a programmable mock provider, a
//! recording mock repo host, and a temp data directory. `ScriptedSandbox`
//! and `ClientSocket` stand in for the WebSocket peers by attaching channel
//! senders exactly the way the gateway socket tasks do.

pub mod harness;
pub mod mock_provider;
pub mod mock_repo_host;

pub use harness::{ClientSocket, ScriptedSandbox, TestHarness, TestHarnessBuilder};
pub use mock_provider::MockProvider;
pub use mock_repo_host::MockRepoHost;
