//! Client engine for a browser-style screen recorder.
//!
//! The library models the whole client side of the service: device
//! acquisition and webcam-overlay composition ([`media`]), the recording
//! lifecycle and fragment container ([`capture`]), the anonymous session
//! identity ([`session`]), the per-session recording catalog ([`catalog`]),
//! the blocking HTTP backend client ([`api`]), share/trim/delete actions
//! ([`actions`], [`trim`]), and the single-threaded engine that ties them
//! together ([`engine`]).

pub mod actions;
pub mod api;
pub mod capture;
pub mod catalog;
pub mod config;
pub mod engine;
pub mod error;
pub mod logging;
pub mod media;
pub mod session;
pub mod trim;

pub use api::{ApiClient, Backend, UploadOutcome};
pub use capture::{CaptureSession, CaptureState, FragmentEncoder, RawSegmentEncoder};
pub use engine::{Intent, RecorderApp, UiEvent};
pub use error::ClientError;
pub use media::{DeviceProvider, OverlayGeometry, RecordingMode, StreamComposer};
pub use session::{FileTokenStore, MemoryTokenStore, SessionManager};
pub use trim::{SegmentDurationProbe, TrimController};
