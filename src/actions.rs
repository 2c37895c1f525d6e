//! Action-panel plumbing: duplicate-request guards, the per-active-file link
//! cache, and the local validations that run before any network call.

use std::collections::HashSet;
use std::fmt;

use crate::error::ClientError;

/// Operations available on the active file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Download,
    SecureLink,
    PublicLink,
    DisablePublicLink,
    Email,
    Trim,
    Delete,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Action::Download => "download",
            Action::SecureLink => "secure-link",
            Action::PublicLink => "public-link",
            Action::DisablePublicLink => "disable-public-link",
            Action::Email => "email",
            Action::Trim => "trim",
            Action::Delete => "delete",
        };
        write!(f, "{label}")
    }
}

/// Kind of shareable link for a recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    /// Deterministic URL derived from the filename; no round-trip.
    Raw,
    /// Server-issued, time-limited.
    Secure,
    /// Server-issued, durable until explicitly disabled.
    Public,
}

/// Guards each asynchronous action keyed by (action, file): a second
/// invocation before the first resolves is coalesced into the pending one.
#[derive(Debug, Default)]
pub struct InFlightGuard {
    pending: HashSet<(Action, String)>,
}

impl InFlightGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the action pending. Returns false when it already was, in which
    /// case the caller must not issue another request.
    pub fn begin(&mut self, action: Action, file: &str) -> bool {
        self.pending.insert((action, file.to_owned()))
    }

    /// Re-enables the action; must run on success and failure alike.
    pub fn finish(&mut self, action: Action, file: &str) {
        self.pending.remove(&(action, file.to_owned()));
    }

    pub fn is_pending(&self, action: Action, file: &str) -> bool {
        self.pending.contains(&(action, file.to_owned()))
    }
}

/// Server-issued links cached for the currently active file only. Switching
/// the active file invalidates everything: a link is only meaningful for the
/// file it was issued for.
#[derive(Debug, Default)]
pub struct LinkCache {
    file: Option<String>,
    secure: Option<String>,
    public: Option<String>,
}

impl LinkCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Points the cache at a (possibly different) active file.
    pub fn retarget(&mut self, file: Option<&str>) {
        if self.file.as_deref() != file {
            self.file = file.map(str::to_owned);
            self.secure = None;
            self.public = None;
        }
    }

    pub fn secure_for(&self, file: &str) -> Option<String> {
        (self.file.as_deref() == Some(file))
            .then(|| self.secure.clone())
            .flatten()
    }

    pub fn public_for(&self, file: &str) -> Option<String> {
        (self.file.as_deref() == Some(file))
            .then(|| self.public.clone())
            .flatten()
    }

    pub fn store_secure(&mut self, file: &str, url: String) {
        if self.file.as_deref() == Some(file) {
            self.secure = Some(url);
        }
    }

    pub fn store_public(&mut self, file: &str, url: String) {
        if self.file.as_deref() == Some(file) {
            self.public = Some(url);
        }
    }

    pub fn clear_public(&mut self, file: &str) {
        if self.file.as_deref() == Some(file) {
            self.public = None;
        }
    }
}

/// Local email validation: runs before any network call.
pub fn validate_email(address: &str) -> Result<&str, ClientError> {
    let trimmed = address.trim();
    if trimmed.is_empty() {
        return Err(ClientError::validation("Please enter an e-mail address"));
    }
    let valid = trimmed
        .split_once('@')
        .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
    if !valid {
        return Err(ClientError::Validation(format!(
            "\"{trimmed}\" does not look like an e-mail address"
        )));
    }
    Ok(trimmed)
}

/// Embeddable iframe snippet for a recording's raw URL.
pub fn embed_snippet(url: &str, width: u32, height: u32) -> String {
    format!(
        "<iframe width=\"{width}\" height=\"{height}\" src=\"{url}\" frameborder=\"0\" allowfullscreen></iframe>"
    )
}
