//! Single-threaded recording engine.
//!
//! Intents go in, UI events come out. The engine owns the capture lifecycle,
//! the catalog, the active-file selection and every network action, and keeps
//! all of it consistent: no event is emitted for work that did not happen.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use log::{debug, info, warn};

use crate::actions::{embed_snippet, validate_email, Action, InFlightGuard, LinkCache, LinkKind};
use crate::api::Backend;
use crate::capture::{CaptureSession, CaptureState, FragmentEncoder};
use crate::catalog::Catalog;
use crate::error::ClientError;
use crate::media::{DeviceProvider, OverlayGeometry, RecordingMode, StreamComposer};
use crate::session::SessionManager;
use crate::trim::{MetadataProbe, TrimController};

/// How long a success indicator stays up before the UI reverts it.
pub const STATUS_REVERT_SECS: u64 = 2;

/// Everything the user (or the CLI) can ask the engine to do.
#[derive(Debug, Clone)]
pub enum Intent {
    StartRecording {
        mode: RecordingMode,
        camera: Option<String>,
        mic: Option<String>,
    },
    PauseRecording,
    ResumeRecording,
    StopRecording,
    SetOverlayGeometry(OverlayGeometry),
    ToggleOverlay(bool),
    SelectFile(Option<String>),
    Download,
    RawLink,
    SecureLink,
    PublicLink,
    DisablePublicLink,
    Email {
        to: String,
    },
    EmbedCode {
        width: u32,
        height: u32,
    },
    OpenTrim,
    PollTrimMetadata,
    SetTrimStart(f64),
    SetTrimEnd(f64),
    SubmitTrim,
    CancelTrim,
    /// `filename: None` targets the active file. An unconfirmed delete only
    /// asks for confirmation; nothing is removed.
    Delete {
        filename: Option<String>,
        confirmed: bool,
    },
    LoadCatalog,
    ForgetSession,
    Contact {
        from_email: String,
        subject: String,
        message: String,
    },
}

/// Observable engine output, drained by the UI layer after each intent.
#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
    StateChanged(CaptureState),
    Status(String),
    Uploaded { filename: String },
    CatalogChanged(Vec<String>),
    ActiveChanged(Option<String>),
    LinkReady { kind: LinkKind, url: String },
    EmbedReady(String),
    EmailSent { to: String },
    DownloadReady { filename: String, bytes: Vec<u8> },
    TrimReady { start: f64, end: f64, duration: f64 },
    TrimSeek(f64),
    ConfirmDelete(String),
    Deleted(String),
    SessionForgotten,
    ActionFailed { action: Action, message: String },
    Error(String),
}

/// The engine. Single-threaded by construction; interior mutability keeps
/// intent handling a `&self` affair so the owner can hold it in an `Rc`.
pub struct RecorderApp {
    session: Rc<SessionManager>,
    backend: Rc<dyn Backend>,
    provider: Box<dyn DeviceProvider>,
    composer: RefCell<StreamComposer>,
    capture: RefCell<CaptureSession>,
    encoder: RefCell<Box<dyn FragmentEncoder>>,
    catalog: RefCell<Catalog>,
    active: RefCell<Option<String>>,
    guard: RefCell<InFlightGuard>,
    links: RefCell<LinkCache>,
    trim: RefCell<TrimController>,
    probe: RefCell<Box<dyn MetadataProbe>>,
    events: RefCell<VecDeque<UiEvent>>,
}

impl RecorderApp {
    pub fn new(
        session: Rc<SessionManager>,
        backend: Rc<dyn Backend>,
        provider: Box<dyn DeviceProvider>,
        encoder: Box<dyn FragmentEncoder>,
        probe: Box<dyn MetadataProbe>,
    ) -> Self {
        Self {
            session,
            backend,
            provider,
            composer: RefCell::new(StreamComposer::new()),
            capture: RefCell::new(CaptureSession::new()),
            encoder: RefCell::new(encoder),
            catalog: RefCell::new(Catalog::new()),
            active: RefCell::new(None),
            guard: RefCell::new(InFlightGuard::new()),
            links: RefCell::new(LinkCache::new()),
            trim: RefCell::new(TrimController::new()),
            probe: RefCell::new(probe),
            events: RefCell::new(VecDeque::new()),
        }
    }

    pub fn capture_state(&self) -> CaptureState {
        self.capture.borrow().state()
    }

    pub fn active_file(&self) -> Option<String> {
        self.active.borrow().clone()
    }

    pub fn catalog_files(&self) -> Vec<String> {
        self.catalog.borrow().files()
    }

    /// Empties the event queue in emission order.
    pub fn drain_events(&self) -> Vec<UiEvent> {
        self.events.borrow_mut().drain(..).collect()
    }

    pub fn handle(&self, intent: Intent) {
        match intent {
            Intent::StartRecording { mode, camera, mic } => {
                self.start_recording(mode, camera.as_deref(), mic.as_deref())
            }
            Intent::PauseRecording => self.lifecycle(|c| c.pause(), CaptureState::Paused),
            Intent::ResumeRecording => self.lifecycle(|c| c.resume(), CaptureState::Recording),
            Intent::StopRecording => self.stop_recording(),
            Intent::SetOverlayGeometry(geometry) => {
                self.composer.borrow_mut().set_geometry(geometry)
            }
            Intent::ToggleOverlay(visible) => {
                self.composer.borrow_mut().set_overlay_visible(visible)
            }
            Intent::SelectFile(filename) => self.activate(filename),
            Intent::Download => self.download(),
            Intent::RawLink => self.raw_link(),
            Intent::SecureLink => self.secure_link(),
            Intent::PublicLink => self.public_link(),
            Intent::DisablePublicLink => self.disable_public_link(),
            Intent::Email { to } => self.email(&to),
            Intent::EmbedCode { width, height } => self.embed_code(width, height),
            Intent::OpenTrim => self.open_trim(),
            Intent::PollTrimMetadata => self.poll_trim(),
            Intent::SetTrimStart(seconds) => self.move_trim_handle(seconds, true),
            Intent::SetTrimEnd(seconds) => self.move_trim_handle(seconds, false),
            Intent::SubmitTrim => self.submit_trim(),
            Intent::CancelTrim => self.trim.borrow_mut().cancel(),
            Intent::Delete {
                filename,
                confirmed,
            } => self.delete(filename, confirmed),
            Intent::LoadCatalog => self.load_catalog(),
            Intent::ForgetSession => self.forget_session(),
            Intent::Contact {
                from_email,
                subject,
                message,
            } => self.contact(&from_email, &subject, &message),
        }
    }

    /// Drives one composition tick while recording. A constituent video
    /// track ending stops the recording exactly like the stop button.
    pub fn tick(&self) {
        if self.capture.borrow().state() != CaptureState::Recording {
            return;
        }

        let result = self.composer.borrow_mut().try_next_composite();
        let composite = match result {
            Ok(composite) => composite,
            Err(err) => {
                self.push(UiEvent::Error(err.to_string()));
                self.abort_recording();
                return;
            }
        };

        let Some((frame, audio)) = composite else {
            info!("Capture source ended; stopping recording");
            self.stop_recording();
            return;
        };

        match self.encoder.borrow_mut().encode(&frame, &audio) {
            Ok(fragment) => {
                self.capture.borrow_mut().push_fragment(fragment);
            }
            Err(err) => {
                self.push(UiEvent::Error(format!("Encoding failed: {err}")));
                self.abort_recording();
            }
        }
    }

    fn push(&self, event: UiEvent) {
        self.events.borrow_mut().push_back(event);
    }

    fn fail(&self, action: Action, err: ClientError) {
        self.push(UiEvent::ActionFailed {
            action,
            message: err.to_string(),
        });
    }

    fn require_active(&self) -> Result<String, ClientError> {
        self.active
            .borrow()
            .clone()
            .ok_or_else(|| ClientError::validation("No recording selected"))
    }

    /// Marks an action pending; a false return means a duplicate invocation
    /// was coalesced and the caller must not issue another request.
    fn begin(&self, action: Action, file: &str) -> bool {
        if self.guard.borrow_mut().begin(action, file) {
            true
        } else {
            debug!("Coalesced duplicate {action} for {file}");
            false
        }
    }

    fn finish(&self, action: Action, file: &str) {
        self.guard.borrow_mut().finish(action, file);
    }

    fn start_recording(&self, mode: RecordingMode, camera: Option<&str>, mic: Option<&str>) {
        if self.capture.borrow().state() != CaptureState::Idle {
            self.push(UiEvent::Error(
                "A recording is already in progress".into(),
            ));
            return;
        }

        let effective = match self
            .composer
            .borrow_mut()
            .acquire(&*self.provider, mode, camera, mic)
        {
            Ok(effective) => effective,
            Err(err) => {
                self.push(UiEvent::Error(err.to_string()));
                return;
            }
        };

        if let Err(err) = self.capture.borrow_mut().start() {
            self.composer.borrow_mut().release();
            self.push(UiEvent::Error(err.to_string()));
            return;
        }

        if let Err(err) = self.backend.start_marker() {
            debug!("Recording start marker failed: {err}");
        }

        self.push(UiEvent::StateChanged(CaptureState::Recording));
        self.push(UiEvent::Status(format!(
            "Recording {}",
            effective.label()
        )));
    }

    fn lifecycle(
        &self,
        op: impl FnOnce(&mut CaptureSession) -> Result<(), ClientError>,
        next: CaptureState,
    ) {
        match op(&mut self.capture.borrow_mut()) {
            Ok(()) => self.push(UiEvent::StateChanged(next)),
            Err(err) => self.push(UiEvent::Error(err.to_string())),
        }
    }

    /// Tears down a failed recording; the streams are released and no blob
    /// is produced.
    fn abort_recording(&self) {
        self.capture.borrow_mut().reset();
        self.composer.borrow_mut().release();
        self.push(UiEvent::StateChanged(CaptureState::Idle));
    }

    fn stop_recording(&self) {
        let blob = self.capture.borrow_mut().stop();
        self.composer.borrow_mut().release();

        let Some(blob) = blob else {
            // Stop while idle is a silent no-op.
            return;
        };
        self.push(UiEvent::StateChanged(CaptureState::Idle));

        if blob.is_empty() {
            self.push(UiEvent::Status("Recording ended with no data".into()));
            return;
        }

        let (file_name, mime) = {
            let encoder = self.encoder.borrow();
            (encoder.file_name(), encoder.mime_type())
        };
        match self.backend.upload(&blob, file_name, mime) {
            Ok(outcome) => {
                info!("Uploaded recording as {}", outcome.filename);
                let changed = self.catalog.borrow_mut().insert(&outcome.filename);
                self.push(UiEvent::Uploaded {
                    filename: outcome.filename.clone(),
                });
                if changed {
                    self.push(UiEvent::CatalogChanged(self.catalog.borrow().files()));
                }
                self.activate(Some(outcome.filename.clone()));
                if let Some(url) = outcome.share_url {
                    self.links.borrow_mut().store_secure(&outcome.filename, url.clone());
                    self.push(UiEvent::LinkReady {
                        kind: LinkKind::Secure,
                        url,
                    });
                }
            }
            Err(err) => self.push(UiEvent::Error(format!("Upload failed: {err}"))),
        }
    }

    /// Changes the active file. Cached links belong to the file they were
    /// issued for, so the cache is retargeted in the same step.
    fn activate(&self, filename: Option<String>) {
        if *self.active.borrow() == filename {
            return;
        }
        self.links.borrow_mut().retarget(filename.as_deref());
        self.active.replace(filename.clone());
        self.push(UiEvent::ActiveChanged(filename));
    }

    fn download(&self) {
        let file = match self.require_active() {
            Ok(file) => file,
            Err(err) => return self.fail(Action::Download, err),
        };
        if !self.begin(Action::Download, &file) {
            return;
        }
        let result = self.backend.download_mp4(&file);
        self.finish(Action::Download, &file);
        match result {
            Ok(bytes) => self.push(UiEvent::DownloadReady {
                filename: file,
                bytes,
            }),
            Err(err) => self.fail(Action::Download, err),
        }
    }

    /// The raw URL is a pure derivation from the filename; no guard and no
    /// network call.
    fn raw_link(&self) {
        match self.require_active() {
            Ok(file) => self.push(UiEvent::LinkReady {
                kind: LinkKind::Raw,
                url: self.backend.raw_url(&file),
            }),
            Err(err) => self.push(UiEvent::Error(err.to_string())),
        }
    }

    fn secure_link(&self) {
        let file = match self.require_active() {
            Ok(file) => file,
            Err(err) => return self.fail(Action::SecureLink, err),
        };
        if let Some(url) = self.links.borrow().secure_for(&file) {
            self.push(UiEvent::LinkReady {
                kind: LinkKind::Secure,
                url,
            });
            return;
        }
        if !self.begin(Action::SecureLink, &file) {
            return;
        }
        let result = self.backend.secure_link(&file);
        self.finish(Action::SecureLink, &file);
        match result {
            Ok(url) => {
                self.links.borrow_mut().store_secure(&file, url.clone());
                self.push(UiEvent::LinkReady {
                    kind: LinkKind::Secure,
                    url,
                });
            }
            Err(err) => self.fail(Action::SecureLink, err),
        }
    }

    fn public_link(&self) {
        let file = match self.require_active() {
            Ok(file) => file,
            Err(err) => return self.fail(Action::PublicLink, err),
        };
        if let Some(url) = self.links.borrow().public_for(&file) {
            self.push(UiEvent::LinkReady {
                kind: LinkKind::Public,
                url,
            });
            return;
        }
        if !self.begin(Action::PublicLink, &file) {
            return;
        }
        let result = self.backend.public_link(&file);
        self.finish(Action::PublicLink, &file);
        match result {
            Ok(url) => {
                self.links.borrow_mut().store_public(&file, url.clone());
                self.push(UiEvent::LinkReady {
                    kind: LinkKind::Public,
                    url,
                });
            }
            Err(err) => self.fail(Action::PublicLink, err),
        }
    }

    fn disable_public_link(&self) {
        let file = match self.require_active() {
            Ok(file) => file,
            Err(err) => return self.fail(Action::DisablePublicLink, err),
        };
        if !self.begin(Action::DisablePublicLink, &file) {
            return;
        }
        let result = self.backend.disable_public_link(&file);
        self.finish(Action::DisablePublicLink, &file);
        match result {
            Ok(()) => {
                self.links.borrow_mut().clear_public(&file);
                self.push(UiEvent::Status(format!("Public link for {file} disabled")));
            }
            Err(err) => self.fail(Action::DisablePublicLink, err),
        }
    }

    /// Shares the active file by e-mail. The link is the cached secure one
    /// when available; otherwise a fresh secure link is fetched, falling
    /// back to the deterministic raw URL when the server cannot issue one.
    fn email(&self, to: &str) {
        let file = match self.require_active() {
            Ok(file) => file,
            Err(err) => return self.fail(Action::Email, err),
        };
        let to = match validate_email(to) {
            Ok(to) => to.to_owned(),
            Err(err) => return self.fail(Action::Email, err),
        };
        if !self.begin(Action::Email, &file) {
            return;
        }

        let cached = self.links.borrow().secure_for(&file);
        let url = match cached {
            Some(url) => url,
            None => match self.backend.secure_link(&file) {
                Ok(url) => {
                    self.links.borrow_mut().store_secure(&file, url.clone());
                    url
                }
                Err(err) => {
                    warn!("Secure link unavailable, sharing raw URL: {err}");
                    self.backend.raw_url(&file)
                }
            },
        };

        let result = self.backend.send_email(&to, &url);
        self.finish(Action::Email, &file);
        match result {
            Ok(()) => self.push(UiEvent::EmailSent { to }),
            Err(err) => self.fail(Action::Email, err),
        }
    }

    fn embed_code(&self, width: u32, height: u32) {
        match self.require_active() {
            Ok(file) => {
                let url = self.backend.raw_url(&file);
                self.push(UiEvent::EmbedReady(embed_snippet(&url, width, height)));
            }
            Err(err) => self.push(UiEvent::Error(err.to_string())),
        }
    }

    fn open_trim(&self) {
        let file = match self.require_active() {
            Ok(file) => file,
            Err(err) => return self.fail(Action::Trim, err),
        };
        let outcome = self
            .trim
            .borrow_mut()
            .open(&file, self.probe.borrow_mut().as_mut());
        self.report_trim(outcome);
    }

    fn poll_trim(&self) {
        if !self.trim.borrow().is_waiting() {
            return;
        }
        let outcome = self
            .trim
            .borrow_mut()
            .poll(self.probe.borrow_mut().as_mut());
        self.report_trim(outcome);
    }

    fn report_trim(
        &self,
        outcome: Result<Option<crate::trim::TrimRange>, ClientError>,
    ) {
        match outcome {
            Ok(Some(range)) => self.push(UiEvent::TrimReady {
                start: range.start,
                end: range.end,
                duration: range.duration,
            }),
            Ok(None) => self.push(UiEvent::Status(
                "Waiting for the recording's duration".into(),
            )),
            Err(err) => self.fail(Action::Trim, err),
        }
    }

    fn move_trim_handle(&self, seconds: f64, start: bool) {
        let mut trim = self.trim.borrow_mut();
        let seek = if start {
            trim.set_start(seconds)
        } else {
            trim.set_end(seconds)
        };
        drop(trim);
        match seek {
            Ok(position) => self.push(UiEvent::TrimSeek(position)),
            Err(err) => self.fail(Action::Trim, err),
        }
    }

    /// Submits the trim. Validation and request failures leave the selection
    /// intact; only a successful clip closes the panel and activates the new
    /// recording.
    fn submit_trim(&self) {
        let (file, range) = match self.trim.borrow().submission() {
            Ok(submission) => submission,
            Err(err) => return self.fail(Action::Trim, err),
        };
        if !self.begin(Action::Trim, &file) {
            return;
        }
        let result = self.backend.clip(&file, range.start, range.end);
        self.finish(Action::Trim, &file);
        match result {
            Ok(clip) => {
                info!("Server produced clip {clip} from {file}");
                self.trim.borrow_mut().cancel();
                if self.catalog.borrow_mut().insert(&clip) {
                    self.push(UiEvent::CatalogChanged(self.catalog.borrow().files()));
                }
                self.activate(Some(clip));
            }
            Err(err) => self.fail(Action::Trim, err),
        }
    }

    fn delete(&self, filename: Option<String>, confirmed: bool) {
        let file = match filename.or_else(|| self.active.borrow().clone()) {
            Some(file) => file,
            None => return self.fail(Action::Delete, ClientError::validation("No recording selected")),
        };
        if !confirmed {
            self.push(UiEvent::ConfirmDelete(file));
            return;
        }
        if !self.begin(Action::Delete, &file) {
            return;
        }
        let result = self.backend.delete(&file);
        self.finish(Action::Delete, &file);
        match result {
            Ok(()) => {
                if self.catalog.borrow_mut().remove(&file) {
                    self.push(UiEvent::CatalogChanged(self.catalog.borrow().files()));
                }
                if self.trim.borrow().filename() == Some(file.as_str()) {
                    self.trim.borrow_mut().cancel();
                }
                if self.active.borrow().as_deref() == Some(file.as_str()) {
                    self.activate(None);
                }
                self.push(UiEvent::Deleted(file));
            }
            Err(err) => self.fail(Action::Delete, err),
        }
    }

    /// Merges the server's listing for this session into the catalog.
    fn load_catalog(&self) {
        match self.backend.session_files() {
            Ok(files) => {
                let added = self.catalog.borrow_mut().insert_listing(&files);
                if added > 0 {
                    self.push(UiEvent::CatalogChanged(self.catalog.borrow().files()));
                }
                self.push(UiEvent::Status(format!(
                    "{} recording(s) in this session",
                    self.catalog.borrow().len()
                )));
            }
            Err(err) => self.push(UiEvent::Error(err.to_string())),
        }
    }

    /// Severs the session. Local clearing is the operation of record; the
    /// server call is best-effort.
    fn forget_session(&self) {
        if let Err(err) = self.backend.forget_session() {
            warn!("Server-side session forget failed: {err}");
        }
        self.session.clear();
        self.catalog.borrow_mut().clear();
        self.trim.borrow_mut().cancel();
        self.activate(None);
        self.push(UiEvent::SessionForgotten);
    }

    fn contact(&self, from_email: &str, subject: &str, message: &str) {
        let from_email = match validate_email(from_email) {
            Ok(addr) => addr.to_owned(),
            Err(err) => return self.push(UiEvent::Error(err.to_string())),
        };
        if message.trim().is_empty() {
            self.push(UiEvent::Error("Please enter a message".into()));
            return;
        }
        match self.backend.contact(&from_email, subject, message) {
            Ok(()) => self.push(UiEvent::Status("Message sent".into())),
            Err(err) => self.push(UiEvent::Error(err.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::UploadOutcome;
    use crate::capture::RawSegmentEncoder;
    use crate::media::SyntheticProvider;
    use crate::session::MemoryTokenStore;
    use crate::trim::MetadataProbe;
    use anyhow::Result as AnyResult;
    use std::cell::RefCell;

    #[derive(Default)]
    struct FakeBackend {
        calls: RefCell<Vec<String>>,
        fail_secure: bool,
        fail_delete: bool,
    }

    impl FakeBackend {
        fn log(&self, call: impl Into<String>) {
            self.calls.borrow_mut().push(call.into());
        }

        fn calls(&self) -> Vec<String> {
            self.calls.borrow().clone()
        }
    }

    impl Backend for FakeBackend {
        fn upload(
            &self,
            blob: &[u8],
            _file_name: &str,
            _mime: &str,
        ) -> Result<UploadOutcome, ClientError> {
            self.log(format!("upload:{}", blob.len()));
            Ok(UploadOutcome {
                filename: "rec_001.webm".into(),
                share_url: None,
            })
        }

        fn secure_link(&self, filename: &str) -> Result<String, ClientError> {
            self.log(format!("secure:{filename}"));
            if self.fail_secure {
                return Err(ClientError::Network("refused".into()));
            }
            Ok(format!("https://x/s/{filename}"))
        }

        fn public_link(&self, filename: &str) -> Result<String, ClientError> {
            self.log(format!("public:{filename}"));
            Ok(format!("https://x/p/{filename}"))
        }

        fn disable_public_link(&self, filename: &str) -> Result<(), ClientError> {
            self.log(format!("disable:{filename}"));
            Ok(())
        }

        fn send_email(&self, to: &str, url: &str) -> Result<(), ClientError> {
            self.log(format!("email:{to}:{url}"));
            Ok(())
        }

        fn clip(&self, filename: &str, start: f64, end: f64) -> Result<String, ClientError> {
            self.log(format!("clip:{filename}:{start}:{end}"));
            Ok("rec_001_clip.webm".into())
        }

        fn delete(&self, filename: &str) -> Result<(), ClientError> {
            self.log(format!("delete:{filename}"));
            if self.fail_delete {
                return Err(ClientError::Server("not found".into()));
            }
            Ok(())
        }

        fn session_files(&self) -> Result<Vec<String>, ClientError> {
            self.log("files".to_string());
            Ok(vec!["old_1.webm".into(), "old_2.webm".into()])
        }

        fn forget_session(&self) -> Result<(), ClientError> {
            self.log("forget".to_string());
            Ok(())
        }

        fn contact(&self, _from: &str, _subject: &str, _message: &str) -> Result<(), ClientError> {
            self.log("contact".to_string());
            Ok(())
        }

        fn start_marker(&self) -> Result<(), ClientError> {
            self.log("start_marker".to_string());
            Ok(())
        }

        fn stop_marker(&self) -> Result<String, ClientError> {
            self.log("stop_marker".to_string());
            Ok("legacy.webm".into())
        }

        fn download(&self, filename: &str) -> Result<Vec<u8>, ClientError> {
            self.log(format!("download:{filename}"));
            Ok(vec![1, 2, 3])
        }

        fn download_mp4(&self, filename: &str) -> Result<Vec<u8>, ClientError> {
            self.log(format!("mp4:{filename}"));
            Ok(vec![4, 5, 6])
        }

        fn raw_url(&self, filename: &str) -> String {
            format!("https://x/recordings/{filename}")
        }
    }

    struct KnownDuration(f64);

    impl MetadataProbe for KnownDuration {
        fn duration(&mut self, _filename: &str) -> AnyResult<Option<f64>> {
            Ok(Some(self.0))
        }
    }

    fn app_with(backend: Rc<FakeBackend>, frames: Option<u64>) -> RecorderApp {
        RecorderApp::new(
            Rc::new(SessionManager::new(Box::new(MemoryTokenStore::new()))),
            backend,
            Box::new(SyntheticProvider::new(frames)),
            Box::new(RawSegmentEncoder),
            Box::new(KnownDuration(42.0)),
        )
    }

    fn drive(app: &RecorderApp, ticks: usize) {
        for _ in 0..ticks {
            app.tick();
        }
    }

    #[test]
    fn record_stop_uploads_and_activates() {
        let backend = Rc::new(FakeBackend::default());
        let app = app_with(Rc::clone(&backend), None);

        app.handle(Intent::StartRecording {
            mode: RecordingMode::ScreenOnly,
            camera: None,
            mic: None,
        });
        assert_eq!(app.capture_state(), CaptureState::Recording);
        drive(&app, 3);
        app.handle(Intent::StopRecording);

        assert_eq!(app.capture_state(), CaptureState::Idle);
        assert_eq!(app.active_file().as_deref(), Some("rec_001.webm"));
        assert_eq!(app.catalog_files(), vec!["rec_001.webm"]);
        let events = app.drain_events();
        assert!(events.contains(&UiEvent::Uploaded {
            filename: "rec_001.webm".into()
        }));
    }

    #[test]
    fn pause_suppresses_fragments() {
        let backend = Rc::new(FakeBackend::default());
        let app = app_with(Rc::clone(&backend), None);

        app.handle(Intent::StartRecording {
            mode: RecordingMode::ScreenOnly,
            camera: None,
            mic: None,
        });
        drive(&app, 2);
        app.handle(Intent::PauseRecording);
        drive(&app, 5);
        app.handle(Intent::ResumeRecording);
        drive(&app, 1);
        app.handle(Intent::StopRecording);

        // 3 fragments uploaded; the blob length reflects only recorded ticks.
        let uploads: Vec<_> = backend
            .calls()
            .into_iter()
            .filter(|c| c.starts_with("upload:"))
            .collect();
        assert_eq!(uploads.len(), 1);
    }

    #[test]
    fn source_ending_stops_like_the_stop_button() {
        let backend = Rc::new(FakeBackend::default());
        let app = app_with(Rc::clone(&backend), Some(2));

        app.handle(Intent::StartRecording {
            mode: RecordingMode::ScreenOnly,
            camera: None,
            mic: None,
        });
        drive(&app, 5);

        assert_eq!(app.capture_state(), CaptureState::Idle);
        assert_eq!(app.active_file().as_deref(), Some("rec_001.webm"));
    }

    #[test]
    fn secure_link_is_cached_per_active_file() {
        let backend = Rc::new(FakeBackend::default());
        let app = app_with(Rc::clone(&backend), None);
        app.handle(Intent::SelectFile(Some("a.webm".into())));

        app.handle(Intent::SecureLink);
        app.handle(Intent::SecureLink);
        let secure_calls = backend
            .calls()
            .iter()
            .filter(|c| c.starts_with("secure:"))
            .count();
        assert_eq!(secure_calls, 1, "second request must come from the cache");

        // Switching files invalidates the cache.
        app.handle(Intent::SelectFile(Some("b.webm".into())));
        app.handle(Intent::SecureLink);
        let secure_calls = backend
            .calls()
            .iter()
            .filter(|c| c.starts_with("secure:"))
            .count();
        assert_eq!(secure_calls, 2);
    }

    #[test]
    fn email_reuses_the_cached_secure_link() {
        let backend = Rc::new(FakeBackend::default());
        let app = app_with(Rc::clone(&backend), None);
        app.handle(Intent::SelectFile(Some("a.webm".into())));
        app.handle(Intent::SecureLink);
        app.handle(Intent::Email {
            to: "user@example.com".into(),
        });

        let calls = backend.calls();
        assert_eq!(calls.iter().filter(|c| c.starts_with("secure:")).count(), 1);
        assert!(calls.contains(&"email:user@example.com:https://x/s/a.webm".to_string()));
    }

    #[test]
    fn email_falls_back_to_the_raw_url() {
        let backend = Rc::new(FakeBackend {
            fail_secure: true,
            ..FakeBackend::default()
        });
        let app = app_with(Rc::clone(&backend), None);
        app.handle(Intent::SelectFile(Some("a.webm".into())));
        app.handle(Intent::Email {
            to: "user@example.com".into(),
        });

        assert!(backend
            .calls()
            .contains(&"email:user@example.com:https://x/recordings/a.webm".to_string()));
    }

    #[test]
    fn invalid_email_never_reaches_the_network() {
        let backend = Rc::new(FakeBackend::default());
        let app = app_with(Rc::clone(&backend), None);
        app.handle(Intent::SelectFile(Some("a.webm".into())));
        app.handle(Intent::Email {
            to: "not-an-address".into(),
        });
        assert!(backend.calls().is_empty());
        assert!(app.drain_events().iter().any(|e| matches!(
            e,
            UiEvent::ActionFailed {
                action: Action::Email,
                ..
            }
        )));
    }

    #[test]
    fn unconfirmed_delete_only_asks() {
        let backend = Rc::new(FakeBackend::default());
        let app = app_with(Rc::clone(&backend), None);
        app.handle(Intent::SelectFile(Some("a.webm".into())));
        app.handle(Intent::Delete {
            filename: None,
            confirmed: false,
        });
        assert!(backend.calls().is_empty());
        assert!(app
            .drain_events()
            .contains(&UiEvent::ConfirmDelete("a.webm".into())));
        assert_eq!(app.active_file().as_deref(), Some("a.webm"));
    }

    #[test]
    fn confirmed_delete_clears_selection_only_for_the_active_file() {
        let backend = Rc::new(FakeBackend::default());
        let app = app_with(Rc::clone(&backend), None);
        app.handle(Intent::LoadCatalog);
        app.handle(Intent::SelectFile(Some("old_1.webm".into())));

        // Deleting a non-active file keeps the selection.
        app.handle(Intent::Delete {
            filename: Some("old_2.webm".into()),
            confirmed: true,
        });
        assert_eq!(app.active_file().as_deref(), Some("old_1.webm"));
        assert_eq!(app.catalog_files(), vec!["old_1.webm"]);

        // Deleting the active file clears it.
        app.handle(Intent::Delete {
            filename: None,
            confirmed: true,
        });
        assert!(app.active_file().is_none());
        assert!(app.catalog_files().is_empty());
    }

    #[test]
    fn failed_delete_keeps_the_catalog_intact() {
        let backend = Rc::new(FakeBackend {
            fail_delete: true,
            ..FakeBackend::default()
        });
        let app = app_with(Rc::clone(&backend), None);
        app.handle(Intent::LoadCatalog);
        app.handle(Intent::SelectFile(Some("old_1.webm".into())));
        app.handle(Intent::Delete {
            filename: None,
            confirmed: true,
        });
        assert_eq!(app.catalog_files(), vec!["old_1.webm", "old_2.webm"]);
        assert_eq!(app.active_file().as_deref(), Some("old_1.webm"));
    }

    #[test]
    fn trim_submit_activates_the_clip() {
        let backend = Rc::new(FakeBackend::default());
        let app = app_with(Rc::clone(&backend), None);
        app.handle(Intent::SelectFile(Some("rec_001.webm".into())));
        app.handle(Intent::OpenTrim);
        app.handle(Intent::SetTrimEnd(37.5));
        app.handle(Intent::SubmitTrim);

        assert!(backend
            .calls()
            .contains(&"clip:rec_001.webm:0:37.5".to_string()));
        assert_eq!(app.active_file().as_deref(), Some("rec_001_clip.webm"));
        assert!(app.catalog_files().contains(&"rec_001_clip.webm".to_string()));
    }

    #[test]
    fn inverted_trim_range_is_rejected_locally() {
        let backend = Rc::new(FakeBackend::default());
        let app = app_with(Rc::clone(&backend), None);
        app.handle(Intent::SelectFile(Some("rec_001.webm".into())));
        app.handle(Intent::OpenTrim);
        app.handle(Intent::SetTrimStart(20.0));
        app.handle(Intent::SetTrimEnd(5.0));
        app.handle(Intent::SubmitTrim);

        assert!(!backend.calls().iter().any(|c| c.starts_with("clip:")));
        assert_eq!(app.active_file().as_deref(), Some("rec_001.webm"));
    }

    #[test]
    fn raw_link_is_derived_without_a_network_call() {
        let backend = Rc::new(FakeBackend::default());
        let app = app_with(Rc::clone(&backend), None);
        app.handle(Intent::SelectFile(Some("a.webm".into())));
        app.handle(Intent::RawLink);
        assert!(backend.calls().is_empty());
        assert!(app.drain_events().contains(&UiEvent::LinkReady {
            kind: LinkKind::Raw,
            url: "https://x/recordings/a.webm".into()
        }));
    }

    #[test]
    fn forget_session_resets_everything() {
        let backend = Rc::new(FakeBackend::default());
        let app = app_with(Rc::clone(&backend), None);
        app.handle(Intent::LoadCatalog);
        app.handle(Intent::SelectFile(Some("old_1.webm".into())));
        app.handle(Intent::ForgetSession);

        assert!(app.catalog_files().is_empty());
        assert!(app.active_file().is_none());
        assert!(backend.calls().contains(&"forget".to_string()));
        assert!(app.drain_events().contains(&UiEvent::SessionForgotten));
    }

    #[test]
    fn actions_without_a_selection_fail_locally() {
        let backend = Rc::new(FakeBackend::default());
        let app = app_with(Rc::clone(&backend), None);
        app.handle(Intent::SecureLink);
        app.handle(Intent::Download);
        app.handle(Intent::OpenTrim);
        assert!(backend.calls().is_empty());
        assert_eq!(
            app.drain_events()
                .iter()
                .filter(|e| matches!(e, UiEvent::ActionFailed { .. }))
                .count(),
            3
        );
    }
}
