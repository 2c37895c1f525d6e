//! Anonymous session identity: one durable token per browser profile.

use std::cell::RefCell;

use log::{info, warn};
use rand::Rng;

use crate::config;
use crate::error::ClientError;

/// Durable storage for the session token. The engine is generic over the
/// store so tests can run without touching the real config file.
pub trait TokenStore {
    fn load(&self) -> Option<String>;
    fn save(&self, token: &str) -> Result<(), ClientError>;
    fn clear(&self) -> Result<(), ClientError>;
}

/// Token storage backed by the config file at `~/.config/reclip.json`.
pub struct FileTokenStore;

impl TokenStore for FileTokenStore {
    fn load(&self) -> Option<String> {
        config::load_config().ok().and_then(|c| c.session_token)
    }

    fn save(&self, token: &str) -> Result<(), ClientError> {
        let mut cfg = config::load_config().unwrap_or_default();
        cfg.session_token = Some(token.to_owned());
        config::save_config(&cfg)
    }

    fn clear(&self) -> Result<(), ClientError> {
        let mut cfg = config::load_config().unwrap_or_default();
        cfg.session_token = None;
        config::save_config(&cfg)
    }
}

/// In-memory token storage for tests and throwaway sessions.
#[derive(Default)]
pub struct MemoryTokenStore {
    token: RefCell<Option<String>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self) -> Option<String> {
        self.token.borrow().clone()
    }

    fn save(&self, token: &str) -> Result<(), ClientError> {
        self.token.replace(Some(token.to_owned()));
        Ok(())
    }

    fn clear(&self) -> Result<(), ClientError> {
        self.token.replace(None);
        Ok(())
    }
}

/// Owns the single authoritative session token.
///
/// Exactly one token is live at any instant: created lazily on first use,
/// overwritten whenever a response carries a fresher value, and destroyed
/// only by an explicit forget. The engine is single-threaded, so the token a
/// request uses is whatever `token()` returned at send time; a refresh
/// adopted mid-flight affects only subsequent requests.
pub struct SessionManager {
    store: Box<dyn TokenStore>,
    token: RefCell<Option<String>>,
}

impl SessionManager {
    pub fn new(store: Box<dyn TokenStore>) -> Self {
        let token = store.load();
        Self {
            store,
            token: RefCell::new(token),
        }
    }

    /// Returns the current token, generating and persisting one if absent.
    pub fn token(&self) -> String {
        if let Some(token) = self.token.borrow().as_ref() {
            return token.clone();
        }
        let fresh = generate_token();
        if let Err(err) = self.store.save(&fresh) {
            warn!("Failed to persist new session token: {err}");
        }
        info!("Created new anonymous session");
        self.token.replace(Some(fresh.clone()));
        fresh
    }

    /// Adopts a server-refreshed token. The server's value always wins.
    pub fn adopt(&self, fresh: &str) {
        if fresh.is_empty() || self.token.borrow().as_deref() == Some(fresh) {
            return;
        }
        if let Err(err) = self.store.save(fresh) {
            warn!("Failed to persist refreshed session token: {err}");
        }
        self.token.replace(Some(fresh.to_owned()));
        info!("Adopted refreshed session token from server");
    }

    /// Clears the local token. Local clearing is the operation of record; a
    /// brand-new token is generated lazily on next use.
    pub fn clear(&self) {
        if let Err(err) = self.store.clear() {
            warn!("Failed to clear persisted session token: {err}");
        }
        self.token.replace(None);
        info!("Session identity cleared");
    }

    pub fn has_token(&self) -> bool {
        self.token.borrow().is_some()
    }
}

fn generate_token() -> String {
    let bytes: [u8; 32] = rand::rng().random();
    hex::encode(bytes.as_slice())
}

// Hex encoding helper since we don't want to add another dependency
mod hex {
    const HEX_CHARS: &[u8; 16] = b"0123456789abcdef";

    pub fn encode(bytes: &[u8]) -> String {
        let mut result = String::with_capacity(bytes.len() * 2);
        for byte in bytes {
            result.push(HEX_CHARS[(byte >> 4) as usize] as char);
            result.push(HEX_CHARS[(byte & 0x0f) as usize] as char);
        }
        result
    }
}
