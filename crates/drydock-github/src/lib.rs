// SPDX-FileCopyrightText: 2026 Drydock Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! GitHub client for the coordinator's two identities.
//!
//! Installation-scoped tokens (broad, short-lived, minted via the RS256 app
//! assertion) authorize the push step only. PR authorship and repository
//! metadata always use the prompting user's own token, passed per call. The
//! user token never reaches the sandbox.

pub mod client;

pub use client::GitHubClient;
