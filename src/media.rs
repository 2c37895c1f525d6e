//! Device acquisition and live stream composition.
//!
//! Tracks are pull-based: the engine drives one composition per tick at
//! [`TARGET_FPS`]. A track returning `Ok(None)` has ended (the OS revoked
//! the capture, or the user hit the platform's own "stop sharing" control).

use anyhow::Result;
use image::imageops::{self, FilterType};
use image::RgbaImage;
use log::{info, warn};

use crate::error::ClientError;

/// Composition rate for the synthetic recorded stream.
pub const TARGET_FPS: u32 = 30;

/// Samples per audio block at the composition rate (48 kHz mono).
pub const AUDIO_BLOCK_SAMPLES: usize = 48_000 / TARGET_FPS as usize;

/// Raw frame flowing through the compositor.
#[derive(Debug, Clone)]
pub struct Frame {
    pub rgba: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Live video track. `Ok(None)` means the track ended.
pub trait VideoTrack {
    fn next_frame(&mut self) -> Result<Option<Frame>>;

    /// Releases the underlying device handle. Must be idempotent.
    fn stop(&mut self) {}
}

/// Live audio track yielding blocks of mono f32 samples in [-1, 1].
pub trait AudioTrack {
    fn next_block(&mut self) -> Result<Option<Vec<f32>>>;

    fn stop(&mut self) {}
}

/// One acquired stream: a video track and/or an audio track.
pub struct MediaStream {
    pub video: Option<Box<dyn VideoTrack>>,
    pub audio: Option<Box<dyn AudioTrack>>,
}

impl MediaStream {
    pub fn video_only(video: Box<dyn VideoTrack>) -> Self {
        Self {
            video: Some(video),
            audio: None,
        }
    }

    pub fn with_audio(video: Box<dyn VideoTrack>, audio: Box<dyn AudioTrack>) -> Self {
        Self {
            video: Some(video),
            audio: Some(audio),
        }
    }

    /// Stops every constituent track.
    pub fn stop(&mut self) {
        if let Some(video) = self.video.as_mut() {
            video.stop();
        }
        if let Some(audio) = self.audio.as_mut() {
            audio.stop();
        }
    }
}

/// Pluggable device negotiation, so the engine runs against real capture
/// plumbing, a synthetic pattern generator, or test doubles.
pub trait DeviceProvider {
    /// Requests display capture with audio. Fails with `PermissionDenied`
    /// when the user declines and `Unsupported` where display capture does
    /// not exist (e.g. a touch-only device).
    fn acquire_screen(&self) -> Result<MediaStream, ClientError>;

    /// Requests camera/microphone capture. Absent ids for both devices is a
    /// valid "no additional device" request yielding `Ok(None)`; enumeration
    /// failures degrade to `Ok(None)` rather than aborting the flow.
    fn acquire_device(
        &self,
        camera: Option<&str>,
        mic: Option<&str>,
    ) -> Result<Option<MediaStream>, ClientError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordingMode {
    ScreenOnly,
    WebcamOnly,
    Combined,
}

impl RecordingMode {
    pub fn label(&self) -> &'static str {
        match self {
            RecordingMode::ScreenOnly => "screen",
            RecordingMode::WebcamOnly => "webcam",
            RecordingMode::Combined => "screen+webcam",
        }
    }
}

/// The streams owned by one recording attempt. At least one must be present
/// before capture may start; Combined requires both.
pub struct SourceSet {
    pub screen: Option<MediaStream>,
    pub device: Option<MediaStream>,
}

impl SourceSet {
    pub fn mode(&self) -> Option<RecordingMode> {
        match (&self.screen, &self.device) {
            (Some(_), Some(_)) => Some(RecordingMode::Combined),
            (Some(_), None) => Some(RecordingMode::ScreenOnly),
            (None, Some(_)) => Some(RecordingMode::WebcamOnly),
            (None, None) => None,
        }
    }

    pub fn release(&mut self) {
        if let Some(screen) = self.screen.as_mut() {
            screen.stop();
        }
        if let Some(device) = self.device.as_mut() {
            device.stop();
        }
        self.screen = None;
        self.device = None;
    }
}

/// Overlay position and size as fractions of the composed frame, so the
/// geometry stays valid when the source resizes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlayGeometry {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub visible: bool,
}

impl OverlayGeometry {
    /// Clamps every fraction into [0, 1], with a small floor on the box so
    /// a degenerate drag cannot collapse the overlay to nothing.
    pub fn clamped(self) -> Self {
        Self {
            x: self.x.clamp(0.0, 1.0),
            y: self.y.clamp(0.0, 1.0),
            width: self.width.clamp(0.01, 1.0),
            height: self.height.clamp(0.01, 1.0),
            visible: self.visible,
        }
    }
}

impl Default for OverlayGeometry {
    /// Bottom-right corner, a quarter of the frame wide.
    fn default() -> Self {
        Self {
            x: 0.72,
            y: 0.70,
            width: 0.25,
            height: 0.25,
            visible: true,
        }
    }
}

/// Pure composition of one tick: screen frame as background, device frame
/// drawn as a positioned, resizable overlay on top.
pub fn compose_frame(screen: &Frame, overlay: Option<&Frame>, geometry: &OverlayGeometry) -> Frame {
    let overlay = match overlay {
        Some(frame) if geometry.visible => frame,
        _ => return screen.clone(),
    };

    let Some(mut canvas) = RgbaImage::from_raw(screen.width, screen.height, screen.rgba.clone())
    else {
        warn!("Screen frame buffer does not match its dimensions; passing through");
        return screen.clone();
    };
    let Some(top) = RgbaImage::from_raw(overlay.width, overlay.height, overlay.rgba.clone()) else {
        warn!("Overlay frame buffer does not match its dimensions; skipping overlay");
        return screen.clone();
    };

    let geometry = geometry.clamped();
    let target_w = ((geometry.width * screen.width as f32).round() as u32).max(1);
    let target_h = ((geometry.height * screen.height as f32).round() as u32).max(1);
    let scaled = imageops::resize(&top, target_w, target_h, FilterType::Triangle);

    // Keep the whole box inside the frame.
    let max_x = screen.width.saturating_sub(target_w);
    let max_y = screen.height.saturating_sub(target_h);
    let x = ((geometry.x * screen.width as f32).round() as u32).min(max_x);
    let y = ((geometry.y * screen.height as f32).round() as u32).min(max_y);

    imageops::overlay(&mut canvas, &scaled, i64::from(x), i64::from(y));

    Frame {
        rgba: canvas.into_raw(),
        width: screen.width,
        height: screen.height,
    }
}

/// Real-time mix of two mono sample blocks, clamped to [-1, 1].
pub fn mix_audio(a: &[f32], b: &[f32]) -> Vec<f32> {
    let len = a.len().max(b.len());
    (0..len)
        .map(|i| {
            let sa = a.get(i).copied().unwrap_or(0.0);
            let sb = b.get(i).copied().unwrap_or(0.0);
            (sa + sb).clamp(-1.0, 1.0)
        })
        .collect()
}

/// Owns the live streams for the duration of one recording attempt and
/// produces the composite (frame, audio) ticks the capture session records.
pub struct StreamComposer {
    sources: Option<SourceSet>,
    geometry: OverlayGeometry,
}

impl StreamComposer {
    pub fn new() -> Self {
        Self {
            sources: None,
            geometry: OverlayGeometry::default(),
        }
    }

    /// Acquires the streams for `mode`. Any previously held set is fully
    /// released first: no two live device acquisitions may coexist.
    pub fn acquire(
        &mut self,
        provider: &dyn DeviceProvider,
        mode: RecordingMode,
        camera: Option<&str>,
        mic: Option<&str>,
    ) -> Result<RecordingMode, ClientError> {
        self.release();

        let sources = match mode {
            RecordingMode::ScreenOnly => SourceSet {
                screen: Some(provider.acquire_screen()?),
                device: None,
            },
            RecordingMode::WebcamOnly => {
                let device = provider.acquire_device(camera, mic)?.ok_or_else(|| {
                    ClientError::validation("No camera or microphone available to record")
                })?;
                SourceSet {
                    screen: None,
                    device: Some(device),
                }
            }
            RecordingMode::Combined => {
                let screen = provider.acquire_screen()?;
                // A missing device degrades to screen-only; a failed screen
                // acquisition above aborts the whole start.
                let device = match provider.acquire_device(camera, mic) {
                    Ok(device) => device,
                    Err(err) => {
                        warn!("Device acquisition failed, recording screen only: {err}");
                        None
                    }
                };
                if device.is_none() {
                    info!("No overlay device available; composition disabled");
                }
                SourceSet {
                    screen: Some(screen),
                    device,
                }
            }
        };

        let effective = sources
            .mode()
            .ok_or_else(|| ClientError::validation("No stream available to record"))?;
        self.sources = Some(sources);
        Ok(effective)
    }

    pub fn mode(&self) -> Option<RecordingMode> {
        self.sources.as_ref().and_then(|s| s.mode())
    }

    pub fn geometry(&self) -> OverlayGeometry {
        self.geometry
    }

    /// Geometry updates arrive only through this setter (the drag/resize
    /// contract); values are clamped into the frame.
    pub fn set_geometry(&mut self, geometry: OverlayGeometry) {
        self.geometry = geometry.clamped();
    }

    /// Hides or shows the overlay without stopping composition.
    pub fn set_overlay_visible(&mut self, visible: bool) {
        self.geometry.visible = visible;
    }

    /// Produces the next composite tick. `Ok(None)` means a constituent
    /// video track ended and recording must stop.
    pub fn try_next_composite(&mut self) -> Result<Option<(Frame, Vec<f32>)>, ClientError> {
        self.next_composite_inner()
            .map_err(|err| ClientError::Media(err.to_string()))
    }

    fn next_composite_inner(&mut self) -> Result<Option<(Frame, Vec<f32>)>> {
        let Some(sources) = self.sources.as_mut() else {
            return Ok(None);
        };

        let (frame, screen_audio, device_audio) = match (&mut sources.screen, &mut sources.device)
        {
            (Some(screen), device) => {
                let Some(background) = pull_frame(screen)? else {
                    return Ok(None);
                };
                let overlay = match device {
                    Some(device) => match pull_frame(device)? {
                        Some(frame) => Some(frame),
                        // Overlay device ended mid-recording; treat like the
                        // screen ending and force a stop.
                        None => return Ok(None),
                    },
                    None => None,
                };
                let composed = compose_frame(&background, overlay.as_ref(), &self.geometry);
                let screen_audio = pull_audio(screen)?;
                let device_audio = match device {
                    Some(device) => pull_audio(device)?,
                    None => Vec::new(),
                };
                (composed, screen_audio, device_audio)
            }
            (None, Some(device)) => {
                let Some(frame) = pull_frame(device)? else {
                    return Ok(None);
                };
                let audio = pull_audio(device)?;
                (frame, audio, Vec::new())
            }
            (None, None) => return Ok(None),
        };

        Ok(Some((frame, mix_audio(&screen_audio, &device_audio))))
    }

    /// Stops every constituent track and drops the set. Must run before a
    /// new acquisition and whenever recording ends or fails, or the hardware
    /// keeps its live-capture indicator lit.
    pub fn release(&mut self) {
        if let Some(mut sources) = self.sources.take() {
            sources.release();
        }
    }
}

impl Default for StreamComposer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for StreamComposer {
    fn drop(&mut self) {
        self.release();
    }
}

fn pull_frame(stream: &mut MediaStream) -> Result<Option<Frame>> {
    match stream.video.as_mut() {
        Some(track) => track.next_frame(),
        None => Ok(None),
    }
}

fn pull_audio(stream: &mut MediaStream) -> Result<Vec<f32>> {
    match stream.audio.as_mut() {
        // An ended audio track degrades to silence rather than stopping the
        // recording; only video ends force a stop.
        Some(track) => Ok(track.next_block()?.unwrap_or_default()),
        None => Ok(Vec::new()),
    }
}

/// Deterministic moving-gradient video track used by the CLI smoke path and
/// the tests.
pub struct TestPatternTrack {
    width: u32,
    height: u32,
    remaining: Option<u64>,
    tick: u64,
    stopped: bool,
}

impl TestPatternTrack {
    pub fn new(width: u32, height: u32, frames: Option<u64>) -> Self {
        Self {
            width,
            height,
            remaining: frames,
            tick: 0,
            stopped: false,
        }
    }
}

impl VideoTrack for TestPatternTrack {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.stopped {
            return Ok(None);
        }
        if let Some(remaining) = self.remaining.as_mut() {
            if *remaining == 0 {
                return Ok(None);
            }
            *remaining -= 1;
        }

        let mut rgba = Vec::with_capacity((self.width * self.height * 4) as usize);
        for y in 0..self.height {
            for x in 0..self.width {
                rgba.push(((x as u64 + self.tick) % 256) as u8);
                rgba.push(((y as u64 + self.tick) % 256) as u8);
                rgba.push((self.tick % 256) as u8);
                rgba.push(255);
            }
        }
        self.tick += 1;
        Ok(Some(Frame {
            rgba,
            width: self.width,
            height: self.height,
        }))
    }

    fn stop(&mut self) {
        self.stopped = true;
    }
}

/// Silent audio track matching the composition rate.
pub struct SilenceTrack {
    stopped: bool,
}

impl SilenceTrack {
    pub fn new() -> Self {
        Self { stopped: false }
    }
}

impl Default for SilenceTrack {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioTrack for SilenceTrack {
    fn next_block(&mut self) -> Result<Option<Vec<f32>>> {
        if self.stopped {
            return Ok(None);
        }
        Ok(Some(vec![0.0; AUDIO_BLOCK_SAMPLES]))
    }

    fn stop(&mut self) {
        self.stopped = true;
    }
}

/// Device provider emitting synthetic streams; the "hardware" for headless
/// runs. Screen streams run for `frames` ticks, then end like a real
/// stop-sharing event.
pub struct SyntheticProvider {
    pub frames: Option<u64>,
}

impl SyntheticProvider {
    pub fn new(frames: Option<u64>) -> Self {
        Self { frames }
    }
}

impl DeviceProvider for SyntheticProvider {
    fn acquire_screen(&self) -> Result<MediaStream, ClientError> {
        Ok(MediaStream::with_audio(
            Box::new(TestPatternTrack::new(640, 360, self.frames)),
            Box::new(SilenceTrack::new()),
        ))
    }

    fn acquire_device(
        &self,
        camera: Option<&str>,
        mic: Option<&str>,
    ) -> Result<Option<MediaStream>, ClientError> {
        if camera.is_none() && mic.is_none() {
            return Ok(None);
        }
        let video: Option<Box<dyn VideoTrack>> = camera
            .map(|_| Box::new(TestPatternTrack::new(160, 120, self.frames)) as Box<dyn VideoTrack>);
        let audio: Option<Box<dyn AudioTrack>> =
            mic.map(|_| Box::new(SilenceTrack::new()) as Box<dyn AudioTrack>);
        Ok(Some(MediaStream { video, audio }))
    }
}
