//! Trim range selection against an asynchronously-arriving source duration.

use std::rc::Rc;
use std::time::{Duration, Instant};

use anyhow::Result;
use log::{debug, info};

use crate::api::Backend;
use crate::capture;
use crate::error::ClientError;
use crate::media::TARGET_FPS;

/// Bounded wait for the source duration before giving up.
pub const METADATA_TIMEOUT_SECS: u64 = 5;

/// Default trim window length when the source is long enough.
pub const DEFAULT_RANGE_SECS: f64 = 10.0;

/// Reports the playable duration of a recording, if known yet. Polled by the
/// controller until it answers or the bounded wait expires.
pub trait MetadataProbe {
    fn duration(&mut self, filename: &str) -> Result<Option<f64>>;
}

/// Duration probe for the raw-segment container: fetches the recording and
/// counts segments at the composition rate.
pub struct SegmentDurationProbe {
    backend: Rc<dyn Backend>,
}

impl SegmentDurationProbe {
    pub fn new(backend: Rc<dyn Backend>) -> Self {
        Self { backend }
    }
}

impl MetadataProbe for SegmentDurationProbe {
    fn duration(&mut self, filename: &str) -> Result<Option<f64>> {
        let bytes = self
            .backend
            .download(filename)
            .map_err(|err| anyhow::anyhow!("{err}"))?;
        Ok(capture::count_segments(&bytes).map(|segments| segments as f64 / TARGET_FPS as f64))
    }
}

/// A validated sub-range of a recording, in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrimRange {
    pub start: f64,
    pub end: f64,
    /// Real playable duration of the source.
    pub duration: f64,
}

impl TrimRange {
    fn initial(duration: f64) -> Self {
        Self {
            start: 0.0,
            end: DEFAULT_RANGE_SECS.min(duration),
            duration,
        }
    }
}

#[derive(Debug)]
enum TrimPhase {
    Closed,
    WaitingForMetadata { filename: String, deadline: Instant },
    Ready { filename: String, range: TrimRange },
}

/// Drives the trim panel: waits (bounded) for the source duration, then
/// exposes a clamped two-handle range whose moves seek the preview.
pub struct TrimController {
    phase: TrimPhase,
    timeout: Duration,
}

impl TrimController {
    pub fn new() -> Self {
        Self::with_timeout(Duration::from_secs(METADATA_TIMEOUT_SECS))
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            phase: TrimPhase::Closed,
            timeout,
        }
    }

    /// Begins a trim for `filename`. If the duration is already known the
    /// range is initialized immediately; otherwise the controller waits for
    /// metadata and must be polled.
    pub fn open(
        &mut self,
        filename: &str,
        probe: &mut dyn MetadataProbe,
    ) -> Result<Option<TrimRange>, ClientError> {
        self.phase = TrimPhase::WaitingForMetadata {
            filename: filename.to_owned(),
            deadline: Instant::now() + self.timeout,
        };
        self.poll(probe)
    }

    /// Polls for metadata while waiting. Expiry is reported as
    /// `MetadataTimeout`, distinct from any network failure.
    pub fn poll(&mut self, probe: &mut dyn MetadataProbe) -> Result<Option<TrimRange>, ClientError> {
        let TrimPhase::WaitingForMetadata { filename, deadline } = &self.phase else {
            return Ok(self.range());
        };
        let filename = filename.clone();
        let deadline = *deadline;

        let duration = probe
            .duration(&filename)
            .map_err(|err| ClientError::Media(err.to_string()))?;

        match duration {
            Some(duration) if duration.is_finite() && duration > 0.0 => {
                let range = TrimRange::initial(duration);
                info!("Trim range for {filename} initialized over {duration:.1}s");
                self.phase = TrimPhase::Ready { filename, range };
                Ok(Some(range))
            }
            _ if Instant::now() >= deadline => {
                debug!("Metadata wait for {filename} expired");
                self.phase = TrimPhase::Closed;
                Err(ClientError::MetadataTimeout)
            }
            _ => Ok(None),
        }
    }

    pub fn is_open(&self) -> bool {
        !matches!(self.phase, TrimPhase::Closed)
    }

    pub fn is_waiting(&self) -> bool {
        matches!(self.phase, TrimPhase::WaitingForMetadata { .. })
    }

    pub fn filename(&self) -> Option<&str> {
        match &self.phase {
            TrimPhase::Ready { filename, .. } | TrimPhase::WaitingForMetadata { filename, .. } => {
                Some(filename)
            }
            TrimPhase::Closed => None,
        }
    }

    pub fn range(&self) -> Option<TrimRange> {
        match &self.phase {
            TrimPhase::Ready { range, .. } => Some(*range),
            _ => None,
        }
    }

    /// Moves the start handle; returns the clamped position for the preview
    /// seek.
    pub fn set_start(&mut self, seconds: f64) -> Result<f64, ClientError> {
        let range = self.range_mut()?;
        range.start = seconds.clamp(0.0, range.duration);
        Ok(range.start)
    }

    /// Moves the end handle; returns the clamped position for the preview
    /// seek.
    pub fn set_end(&mut self, seconds: f64) -> Result<f64, ClientError> {
        let range = self.range_mut()?;
        range.end = seconds.clamp(0.0, range.duration);
        Ok(range.end)
    }

    /// The (filename, range) pair to submit, validated locally. The caller
    /// closes the controller only once the request succeeded, so failures
    /// leave the panel untouched.
    pub fn submission(&self) -> Result<(String, TrimRange), ClientError> {
        match &self.phase {
            TrimPhase::Ready { filename, range } => {
                if range.start >= range.end {
                    return Err(ClientError::Validation(format!(
                        "Invalid trim range: {} must come before {}",
                        format_timestamp(range.start),
                        format_timestamp(range.end)
                    )));
                }
                Ok((filename.clone(), *range))
            }
            _ => Err(ClientError::validation("No trim range to submit yet")),
        }
    }

    /// Hides the trim surface and drops any pending metadata wait.
    pub fn cancel(&mut self) {
        self.phase = TrimPhase::Closed;
    }

    fn range_mut(&mut self) -> Result<&mut TrimRange, ClientError> {
        match &mut self.phase {
            TrimPhase::Ready { range, .. } => Ok(range),
            _ => Err(ClientError::validation("Trim range is not ready yet")),
        }
    }
}

impl Default for TrimController {
    fn default() -> Self {
        Self::new()
    }
}

/// Renders seconds as `mm:ss.t` for the live endpoint readout. Rounds to
/// tenths first so values just under a minute boundary carry over.
pub fn format_timestamp(seconds: f64) -> String {
    let tenths = (seconds.max(0.0) * 10.0).round() as u64;
    let minutes = tenths / 600;
    let rest = (tenths % 600) as f64 / 10.0;
    format!("{minutes:02}:{rest:04.1}")
}
