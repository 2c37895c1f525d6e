use std::env;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::ClientError;

pub const API_BASE_ENV: &str = "RECLIP_API_URL";
pub const DEFAULT_API_BASE: &str = "http://localhost:5000";

/// Client configuration persisted at `~/.config/reclip.json`.
#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct ClientConfig {
    /// API base URL (e.g. "https://reclip.example.com"). Falls back to
    /// RECLIP_API_URL env var, then http://localhost:5000.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
    /// Durable anonymous session token. Absent until the first interaction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_token: Option<String>,
}

pub fn config_path() -> Result<PathBuf, ClientError> {
    let home = dirs::home_dir().ok_or_else(|| {
        ClientError::Config("Could not determine a home directory for ~/.config/reclip.json".into())
    })?;
    Ok(home.join(".config").join("reclip.json"))
}

/// Loads the config file. A missing file is not an error: a fresh browser
/// profile has no state yet, so defaults are returned.
pub fn load_config() -> Result<ClientConfig, ClientError> {
    let path = config_path()?;
    let contents = match fs::read_to_string(&path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(ClientConfig::default()),
        Err(err) => return Err(ClientError::from(err)),
    };

    serde_json::from_str(&contents).map_err(|err| {
        ClientError::Config(format!("Failed to parse config {}: {err}", path.display()))
    })
}

pub fn save_config(config: &ClientConfig) -> Result<(), ClientError> {
    let path = config_path()?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let payload = serde_json::to_string_pretty(config).map_err(|err| {
        ClientError::Config(format!("Failed to serialize config {}: {err}", path.display()))
    })?;
    fs::write(&path, payload).map_err(ClientError::from)
}

/// Resolve the API base URL: config file, then env var, then default.
pub fn resolve_api_base() -> String {
    if let Ok(config) = load_config() {
        if let Some(url) = config.api_url {
            if !url.is_empty() {
                return url;
            }
        }
    }
    env::var(API_BASE_ENV).unwrap_or_else(|_| DEFAULT_API_BASE.to_string())
}

/// Base path under which raw recordings are served. Local development serves
/// them from the static tree; deployed environments mount a dedicated path.
/// Computed once per origin, never hardcoded at call sites.
pub fn recordings_base(origin: &Url) -> &'static str {
    match origin.host_str() {
        Some("localhost") | Some("127.0.0.1") => "/static/recordings/",
        _ => "/recordings/",
    }
}

/// Deterministic raw URL for a recording, derived only from the origin and
/// the server-assigned filename.
pub fn raw_url(origin: &Url, filename: &str) -> String {
    format!(
        "{}{}{}",
        origin.origin().ascii_serialization(),
        recordings_base(origin),
        filename
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recordings_base_depends_on_host() {
        let local = Url::parse("http://localhost:5000").expect("url");
        let loopback = Url::parse("http://127.0.0.1:8080").expect("url");
        let deployed = Url::parse("https://reclip.example.com").expect("url");
        assert_eq!(recordings_base(&local), "/static/recordings/");
        assert_eq!(recordings_base(&loopback), "/static/recordings/");
        assert_eq!(recordings_base(&deployed), "/recordings/");
    }

    #[test]
    fn raw_url_is_a_pure_derivation() {
        let origin = Url::parse("https://reclip.example.com").expect("url");
        assert_eq!(
            raw_url(&origin, "rec_001.webm"),
            "https://reclip.example.com/recordings/rec_001.webm"
        );

        let local = Url::parse("http://localhost:5000").expect("url");
        assert_eq!(
            raw_url(&local, "rec_001.webm"),
            "http://localhost:5000/static/recordings/rec_001.webm"
        );
    }

    #[test]
    fn config_roundtrips_through_json() {
        let config = ClientConfig {
            api_url: Some("http://localhost:5000".into()),
            session_token: Some("abc123".into()),
        };
        let json = serde_json::to_string(&config).expect("serialize");
        let back: ClientConfig = serde_json::from_str(&json).expect("parse");
        assert_eq!(back.api_url.as_deref(), Some("http://localhost:5000"));
        assert_eq!(back.session_token.as_deref(), Some("abc123"));
    }
}
