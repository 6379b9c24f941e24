// SPDX-FileCopyrightText: 2026 Drydock Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The socket registry.
//!
//! Held by the gateway process, NOT by session actors: sockets are the one
//! kind of reference that survives actor eviction. Each socket task registers
//! a tagged entry at accept time; actors resolve peers by enumerating tags,
//! never by caching senders. Fan-out writes are best-effort: a failed send
//! closes the offending socket by dropping its entry.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::debug;

/// Which side of the session a socket belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketKind {
    Client,
    Sandbox,
}

/// Messages handed to a socket's writer task.
#[derive(Debug, Clone, PartialEq)]
pub enum SocketOutbound {
    /// A JSON frame to write.
    Frame(String),
    /// Close the socket with the given code and reason.
    Close { code: u16, reason: String },
}

/// A registered socket: its session, kind, tag, and writer channel.
#[derive(Debug, Clone)]
pub struct SocketEntry {
    pub session_id: String,
    pub kind: SocketKind,
    /// For sandbox sockets, the coordinator-issued sandbox id presented at
    /// upgrade. Used to match the expected sandbox after actor recovery.
    pub tag: Option<String>,
    pub sender: mpsc::Sender<SocketOutbound>,
}

/// Registry of live sockets keyed by `ws_id`.
#[derive(Debug, Clone, Default)]
pub struct SocketRegistry {
    inner: Arc<DashMap<String, SocketEntry>>,
}

impl SocketRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, ws_id: impl Into<String>, entry: SocketEntry) {
        self.inner.insert(ws_id.into(), entry);
    }

    pub fn remove(&self, ws_id: &str) -> Option<SocketEntry> {
        self.inner.remove(ws_id).map(|(_, e)| e)
    }

    /// All client sockets of a session.
    pub fn clients(&self, session_id: &str) -> Vec<(String, mpsc::Sender<SocketOutbound>)> {
        self.inner
            .iter()
            .filter(|e| e.session_id == session_id && e.kind == SocketKind::Client)
            .map(|e| (e.key().clone(), e.sender.clone()))
            .collect()
    }

    /// Number of live client sockets for a session.
    pub fn client_count(&self, session_id: &str) -> usize {
        self.inner
            .iter()
            .filter(|e| e.session_id == session_id && e.kind == SocketKind::Client)
            .count()
    }

    /// The sandbox socket whose tag matches the expected sandbox id.
    pub fn sandbox(
        &self,
        session_id: &str,
        expected_tag: &str,
    ) -> Option<(String, mpsc::Sender<SocketOutbound>)> {
        self.inner
            .iter()
            .find(|e| {
                e.session_id == session_id
                    && e.kind == SocketKind::Sandbox
                    && e.tag.as_deref() == Some(expected_tag)
            })
            .map(|e| (e.key().clone(), e.sender.clone()))
    }

    /// Any sandbox socket of a session, regardless of tag. Used to supersede
    /// an old connection when a new sandbox socket arrives.
    pub fn any_sandbox(&self, session_id: &str) -> Option<String> {
        self.inner
            .iter()
            .find(|e| e.session_id == session_id && e.kind == SocketKind::Sandbox)
            .map(|e| e.key().clone())
    }

    /// Best-effort write. On failure the entry is dropped, closing the socket.
    pub fn send(&self, ws_id: &str, outbound: SocketOutbound) -> bool {
        let Some(entry) = self.inner.get(ws_id) else {
            return false;
        };
        let sender = entry.sender.clone();
        drop(entry);
        if sender.try_send(outbound).is_err() {
            debug!(ws_id, "socket write failed, dropping entry");
            self.inner.remove(ws_id);
            false
        } else {
            true
        }
    }
}
