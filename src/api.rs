//! Blocking HTTP client for the recording backend.
//!
//! Every call attaches the current session token; every response may carry a
//! refreshed token which is adopted and persisted before the result is
//! returned to the caller.

use std::rc::Rc;
use std::time::Duration;

use log::debug;
use reqwest::blocking::{multipart, Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::config;
use crate::error::ClientError;
use crate::session::SessionManager;

/// Header carrying the anonymous session token in both directions.
pub const SESSION_HEADER: &str = "X-Session-Token";

const REQUEST_TIMEOUT_SECS: u64 = 60;

/// Result of a successful upload. Some server variants hand back an initial
/// share URL alongside the assigned filename.
#[derive(Debug, Clone)]
pub struct UploadOutcome {
    pub filename: String,
    pub share_url: Option<String>,
}

/// The full backend contract the client depends on. The engine talks to a
/// trait object so tests can substitute a scripted backend.
pub trait Backend {
    fn upload(&self, blob: &[u8], file_name: &str, mime: &str)
        -> Result<UploadOutcome, ClientError>;
    fn secure_link(&self, filename: &str) -> Result<String, ClientError>;
    fn public_link(&self, filename: &str) -> Result<String, ClientError>;
    fn disable_public_link(&self, filename: &str) -> Result<(), ClientError>;
    fn send_email(&self, to: &str, url: &str) -> Result<(), ClientError>;
    fn clip(&self, filename: &str, start: f64, end: f64) -> Result<String, ClientError>;
    fn delete(&self, filename: &str) -> Result<(), ClientError>;
    fn session_files(&self) -> Result<Vec<String>, ClientError>;
    fn forget_session(&self) -> Result<(), ClientError>;
    fn contact(&self, from_email: &str, subject: &str, message: &str) -> Result<(), ClientError>;
    /// Legacy server-side recording markers.
    fn start_marker(&self) -> Result<(), ClientError>;
    fn stop_marker(&self) -> Result<String, ClientError>;
    fn download(&self, filename: &str) -> Result<Vec<u8>, ClientError>;
    fn download_mp4(&self, filename: &str) -> Result<Vec<u8>, ClientError>;
    /// Deterministic raw URL for a filename; no round-trip involved.
    fn raw_url(&self, filename: &str) -> String;
}

#[derive(Debug, Deserialize)]
struct StatusBody {
    status: String,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UploadBody {
    status: String,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    filename: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LinkBody {
    status: String,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ClipBody {
    status: String,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    clip: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FilesBody {
    #[allow(dead_code)]
    status: String,
    #[serde(default)]
    files: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct StopMarkerBody {
    filename: String,
}

#[derive(Debug, Serialize)]
struct EmailRequest<'a> {
    to: &'a str,
    url: &'a str,
}

#[derive(Debug, Serialize)]
struct ClipRequest {
    start: f64,
    end: f64,
}

#[derive(Debug, Serialize)]
struct ContactRequest<'a> {
    from_email: &'a str,
    subject: &'a str,
    message: &'a str,
}

/// Blocking API client that knows how to hit the recording endpoints.
pub struct ApiClient {
    base_url: String,
    origin: Url,
    http: Client,
    session: Rc<SessionManager>,
}

impl ApiClient {
    /// Create a new client targeting the provided base URL.
    pub fn new(base_url: impl Into<String>, session: Rc<SessionManager>) -> Result<Self, ClientError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let origin = Url::parse(&base_url)
            .map_err(|err| ClientError::Config(format!("Invalid API base URL {base_url}: {err}")))?;
        let http = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            base_url,
            origin,
            http,
            session,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Sends a request with the session token captured at send time, then
    /// adopts any refreshed token the response carries.
    fn send(&self, request: RequestBuilder) -> Result<Response, ClientError> {
        let token = self.session.token();
        let response = request.header(SESSION_HEADER, token).send()?;
        if let Some(fresh) = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
        {
            self.session.adopt(fresh);
        }
        Ok(response)
    }

    fn json_body<T: DeserializeOwned>(response: Response) -> Result<T, ClientError> {
        let status = response.status();
        let body = response.text()?;
        if !status.is_success() {
            return Err(ClientError::Server(format!(
                "unexpected status {status}: {body}"
            )));
        }
        serde_json::from_str(&body)
            .map_err(|err| ClientError::Server(format!("malformed response: {err}")))
    }

    fn bytes_body(response: Response) -> Result<Vec<u8>, ClientError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(ClientError::Server(format!(
                "unexpected status {status}: {body}"
            )));
        }
        Ok(response.bytes()?.to_vec())
    }
}

/// Maps a `{status, error}` envelope into the crate error type; server
/// messages pass through verbatim.
fn expect_ok(status: &str, error: Option<String>) -> Result<(), ClientError> {
    if status == "ok" {
        Ok(())
    } else {
        Err(ClientError::Server(
            error.unwrap_or_else(|| "unknown server error".into()),
        ))
    }
}

impl Backend for ApiClient {
    fn upload(
        &self,
        blob: &[u8],
        file_name: &str,
        mime: &str,
    ) -> Result<UploadOutcome, ClientError> {
        let part = multipart::Part::bytes(blob.to_vec())
            .mime_str(mime)?
            .file_name(file_name.to_string());
        let form = multipart::Form::new().part("video", part);

        debug!("Uploading {} bytes to /upload", blob.len());
        let response = self.send(self.http.post(self.endpoint("/upload")).multipart(form))?;
        let body: UploadBody = Self::json_body(response)?;
        expect_ok(&body.status, body.error)?;
        let filename = body
            .filename
            .ok_or_else(|| ClientError::Server("upload response missing filename".into()))?;
        Ok(UploadOutcome {
            filename,
            share_url: body.url,
        })
    }

    fn secure_link(&self, filename: &str) -> Result<String, ClientError> {
        let response = self.send(self.http.get(self.endpoint(&format!("/link/secure/{filename}"))))?;
        let body: LinkBody = Self::json_body(response)?;
        expect_ok(&body.status, body.error)?;
        body.url
            .ok_or_else(|| ClientError::Server("link response missing url".into()))
    }

    fn public_link(&self, filename: &str) -> Result<String, ClientError> {
        let response = self.send(self.http.get(self.endpoint(&format!("/link/public/{filename}"))))?;
        let body: LinkBody = Self::json_body(response)?;
        expect_ok(&body.status, body.error)?;
        body.url
            .ok_or_else(|| ClientError::Server("link response missing url".into()))
    }

    fn disable_public_link(&self, filename: &str) -> Result<(), ClientError> {
        let response =
            self.send(self.http.delete(self.endpoint(&format!("/link/public/{filename}"))))?;
        let body: StatusBody = Self::json_body(response)?;
        expect_ok(&body.status, body.error)
    }

    fn send_email(&self, to: &str, url: &str) -> Result<(), ClientError> {
        let response = self.send(
            self.http
                .post(self.endpoint("/send_email"))
                .json(&EmailRequest { to, url }),
        )?;
        let body: StatusBody = Self::json_body(response)?;
        expect_ok(&body.status, body.error)
    }

    fn clip(&self, filename: &str, start: f64, end: f64) -> Result<String, ClientError> {
        let response = self.send(
            self.http
                .post(self.endpoint(&format!("/clip/{filename}")))
                .json(&ClipRequest { start, end }),
        )?;
        let body: ClipBody = Self::json_body(response)?;
        expect_ok(&body.status, body.error)?;
        body.clip
            .ok_or_else(|| ClientError::Server("clip response missing filename".into()))
    }

    fn delete(&self, filename: &str) -> Result<(), ClientError> {
        let response = self.send(self.http.post(self.endpoint(&format!("/delete/{filename}"))))?;
        let body: StatusBody = Self::json_body(response)?;
        expect_ok(&body.status, body.error)
    }

    fn session_files(&self) -> Result<Vec<String>, ClientError> {
        let response = self.send(self.http.get(self.endpoint("/session/files")))?;
        let body: FilesBody = Self::json_body(response)?;
        // An empty list (including on a brand-new identity) is not an error.
        Ok(body.files)
    }

    fn forget_session(&self) -> Result<(), ClientError> {
        let response = self.send(self.http.post(self.endpoint("/session/forget")))?;
        let body: StatusBody = Self::json_body(response)?;
        expect_ok(&body.status, body.error)
    }

    fn contact(&self, from_email: &str, subject: &str, message: &str) -> Result<(), ClientError> {
        let response = self.send(self.http.post(self.endpoint("/contact_us")).json(
            &ContactRequest {
                from_email,
                subject,
                message,
            },
        ))?;
        let body: StatusBody = Self::json_body(response)?;
        expect_ok(&body.status, body.error)
    }

    fn start_marker(&self) -> Result<(), ClientError> {
        let response = self.send(self.http.post(self.endpoint("/start")))?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(ClientError::Server(format!("unexpected status {status}")))
        }
    }

    fn stop_marker(&self) -> Result<String, ClientError> {
        let response = self.send(self.http.post(self.endpoint("/stop")))?;
        let body: StopMarkerBody = Self::json_body(response)?;
        Ok(body.filename)
    }

    fn download(&self, filename: &str) -> Result<Vec<u8>, ClientError> {
        let response = self.send(self.http.get(self.endpoint(&format!("/download/{filename}"))))?;
        Self::bytes_body(response)
    }

    fn download_mp4(&self, filename: &str) -> Result<Vec<u8>, ClientError> {
        let response =
            self.send(self.http.get(self.endpoint(&format!("/download/mp4/{filename}"))))?;
        Self::bytes_body(response)
    }

    fn raw_url(&self, filename: &str) -> String {
        config::raw_url(&self.origin, filename)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_envelope_parses_both_variants() {
        let ok: UploadBody =
            serde_json::from_str(r#"{"status":"ok","filename":"rec_001.webm"}"#).expect("parse");
        assert_eq!(ok.filename.as_deref(), Some("rec_001.webm"));
        assert!(ok.url.is_none());

        let with_url: UploadBody = serde_json::from_str(
            r#"{"status":"ok","filename":"rec_001.webm","url":"https://x/s/abc"}"#,
        )
        .expect("parse");
        assert_eq!(with_url.url.as_deref(), Some("https://x/s/abc"));

        let err: UploadBody =
            serde_json::from_str(r#"{"status":"error","error":"disk full"}"#).expect("parse");
        assert!(expect_ok(&err.status, err.error).is_err());
    }

    #[test]
    fn server_error_message_is_verbatim() {
        let err = expect_ok("error", Some("quota exceeded".into())).expect_err("error envelope");
        assert_eq!(err.to_string(), "Server error: quota exceeded");
    }

    #[test]
    fn files_envelope_defaults_to_empty() {
        let body: FilesBody = serde_json::from_str(r#"{"status":"ok"}"#).expect("parse");
        assert!(body.files.is_empty());

        let body: FilesBody =
            serde_json::from_str(r#"{"status":"ok","files":["a.webm","b.webm"]}"#).expect("parse");
        assert_eq!(body.files.len(), 2);
    }

    #[test]
    fn clip_request_serializes_seconds() {
        let json = serde_json::to_string(&ClipRequest {
            start: 0.0,
            end: 37.5,
        })
        .expect("serialize");
        assert_eq!(json, r#"{"start":0.0,"end":37.5}"#);
    }
}
