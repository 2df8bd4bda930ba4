//! Signed session identities and per-session conversation state.
//!
//! A session token is `<uuid>.<sig>`, where the signature is the hex SHA-256
//! of the deployment secret joined with the uuid. Tokens that fail
//! verification are discarded and replaced with a fresh identity. Session
//! state holds the single "current code" artifact and the transient
//! conversation turns; the durable memory entries live behind `MemoryStore`.

use std::collections::HashMap;
use std::sync::Mutex;

use sha2::{Digest, Sha256};
use uuid::Uuid;

/// One request/response exchange kept for the lifetime of the session.
#[derive(Debug, Clone)]
pub struct Turn {
    pub request: String,
    pub response: String,
}

/// Transient state for one session identity.
#[derive(Debug, Default)]
pub struct SessionState {
    pub current_code: Option<String>,
    pub turns: Vec<Turn>,
}

/// In-process store of session state, keyed by verified token.
pub struct SessionStore {
    secret: String,
    sessions: Mutex<HashMap<String, SessionState>>,
}

impl SessionStore {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Mint a fresh signed session token.
    pub fn issue(&self) -> String {
        let id = Uuid::new_v4().to_string();
        let sig = self.sign(&id);
        format!("{id}.{sig}")
    }

    /// Resolve a presented token to a trusted one: a token with a valid
    /// signature is used as-is, anything else (absent, malformed, forged)
    /// gets a fresh identity.
    pub fn resolve(&self, presented: Option<&str>) -> String {
        match presented {
            Some(token) if self.verify(token) => token.to_string(),
            _ => self.issue(),
        }
    }

    /// Check a token's signature against the deployment secret.
    pub fn verify(&self, token: &str) -> bool {
        let Some((id, sig)) = token.split_once('.') else {
            return false;
        };
        !id.is_empty() && self.sign(id) == sig
    }

    fn sign(&self, id: &str) -> String {
        format!("{:x}", Sha256::digest(format!("{}.{id}", self.secret)))
    }

    /// The session's current code artifact, if a cycle has completed.
    pub fn current_code(&self, token: &str) -> Option<String> {
        let sessions = self.sessions.lock().expect("session lock poisoned");
        sessions.get(token).and_then(|s| s.current_code.clone())
    }

    /// Commit a completed cycle: overwrite the artifact and record the turn.
    /// Only called once a cycle reaches its terminal success state, so a
    /// failed cycle never disturbs the last known-good code.
    pub fn commit_cycle(&self, token: &str, request: &str, response: &str, code: &str) {
        let mut sessions = self.sessions.lock().expect("session lock poisoned");
        let state = sessions.entry(token.to_string()).or_default();
        state.current_code = Some(code.to_string());
        state.turns.push(Turn {
            request: request.to_string(),
            response: response.to_string(),
        });
    }

    /// Drop all state for a session.
    pub fn reset(&self, token: &str) {
        let mut sessions = self.sessions.lock().expect("session lock poisoned");
        sessions.remove(token);
    }

    /// Number of turns recorded for a session.
    pub fn turn_count(&self, token: &str) -> usize {
        let sessions = self.sessions.lock().expect("session lock poisoned");
        sessions.get(token).map(|s| s.turns.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issued_token_verifies() {
        let store = SessionStore::new("secret");
        let token = store.issue();
        assert!(store.verify(&token));
    }

    #[test]
    fn test_forged_token_rejected() {
        let store = SessionStore::new("secret");
        assert!(!store.verify("not-a-token"));
        assert!(!store.verify("some-id.deadbeef"));
        assert!(!store.verify(".abc"));
    }

    #[test]
    fn test_token_from_other_secret_rejected() {
        let minted_elsewhere = SessionStore::new("other-secret").issue();
        let store = SessionStore::new("secret");
        assert!(!store.verify(&minted_elsewhere));
    }

    #[test]
    fn test_resolve_keeps_valid_token() {
        let store = SessionStore::new("secret");
        let token = store.issue();
        assert_eq!(store.resolve(Some(&token)), token);
    }

    #[test]
    fn test_resolve_replaces_invalid_token() {
        let store = SessionStore::new("secret");
        let fresh = store.resolve(Some("garbled"));
        assert_ne!(fresh, "garbled");
        assert!(store.verify(&fresh));
    }

    #[test]
    fn test_resolve_absent_token_issues_fresh() {
        let store = SessionStore::new("secret");
        let a = store.resolve(None);
        let b = store.resolve(None);
        assert!(store.verify(&a));
        assert_ne!(a, b);
    }

    #[test]
    fn test_commit_cycle_overwrites_artifact_and_records_turn() {
        let store = SessionStore::new("secret");
        let token = store.issue();
        assert_eq!(store.current_code(&token), None);

        store.commit_cycle(&token, "add a docstring", "Added.", "def f():\n    pass");
        assert_eq!(store.current_code(&token).unwrap(), "def f():\n    pass");
        assert_eq!(store.turn_count(&token), 1);

        store.commit_cycle(&token, "rename f", "Renamed.", "def g():\n    pass");
        assert_eq!(store.current_code(&token).unwrap(), "def g():\n    pass");
        assert_eq!(store.turn_count(&token), 2);
    }

    #[test]
    fn test_sessions_are_isolated() {
        let store = SessionStore::new("secret");
        let a = store.issue();
        let b = store.issue();
        store.commit_cycle(&a, "req", "resp", "code-a");
        assert_eq!(store.current_code(&a).unwrap(), "code-a");
        assert_eq!(store.current_code(&b), None);
    }

    #[test]
    fn test_reset_clears_state() {
        let store = SessionStore::new("secret");
        let token = store.issue();
        store.commit_cycle(&token, "req", "resp", "code");
        store.reset(&token);
        assert_eq!(store.current_code(&token), None);
        assert_eq!(store.turn_count(&token), 0);
    }
}
