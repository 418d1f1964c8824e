//! HTTP-01 challenge responses.
//!
//! An authority publishes `token → key authorization` here before asking the CA to
//! validate; the plaintext listener serves them at
//! `/.well-known/acme-challenge/{token}`.

use std::sync::Arc;

use dashmap::DashMap;

/// Shared token → key authorization map.
#[derive(Debug, Clone, Default)]
pub struct ChallengeStore {
    challenges: Arc<DashMap<String, String>>,
}

impl ChallengeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, token: impl Into<String>, key_authorization: impl Into<String>) {
        let token = token.into();
        tracing::debug!(token = %token, "Challenge published");
        self.challenges.insert(token, key_authorization.into());
    }

    pub fn get(&self, token: &str) -> Option<String> {
        self.challenges.get(token).map(|r| r.value().clone())
    }

    pub fn remove(&self, token: &str) {
        if self.challenges.remove(token).is_some() {
            tracing::debug!(token, "Challenge withdrawn");
        }
    }

    pub fn len(&self) -> usize {
        self.challenges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.challenges.is_empty()
    }
}
