// SPDX-FileCopyrightText: 2026 Tome Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory transport for deterministic fetch tests.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use tome_core::{TomeError, Transport};

/// Serves registered URLs from memory and records every request.
///
/// Unknown URLs and URLs marked with [`MockTransport::fail`] return a
/// `Network` error.
#[derive(Default)]
pub struct MockTransport {
    bodies: Mutex<HashMap<String, Vec<u8>>>,
    failing: Mutex<HashSet<String>>,
    requests: Mutex<Vec<String>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `bytes` at `url`, replacing any earlier body.
    pub fn insert(&self, url: impl Into<String>, bytes: Vec<u8>) {
        let url = url.into();
        self.failing.lock().unwrap().remove(&url);
        self.bodies.lock().unwrap().insert(url, bytes);
    }

    pub fn remove(&self, url: &str) {
        self.bodies.lock().unwrap().remove(url);
    }

    /// Make every request for `url` fail.
    pub fn fail(&self, url: impl Into<String>) {
        self.failing.lock().unwrap().insert(url.into());
    }

    /// Number of requests made for `url`.
    pub fn request_count(&self, url: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|u| *u == url)
            .count()
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, TomeError> {
        self.requests.lock().unwrap().push(url.to_string());
        if self.failing.lock().unwrap().contains(url) {
            return Err(TomeError::Network {
                url: url.to_string(),
                message: "connection refused (mock)".into(),
                source: None,
            });
        }
        self.bodies
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| TomeError::Network {
                url: url.to_string(),
                message: "404 Not Found (mock)".into(),
                source: None,
            })
    }
}
