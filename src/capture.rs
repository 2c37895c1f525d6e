//! Recording lifecycle: Idle -> Recording -> {Paused <-> Recording} ->
//! Stopping -> Idle, with ordered fragment accumulation.

use anyhow::Result;
use log::{debug, info};

use crate::error::ClientError;
use crate::media::Frame;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CaptureState {
    #[default]
    Idle,
    Recording,
    Paused,
    Stopping,
}

/// Turns one composite (frame, audio) tick into an opaque encoded fragment.
///
/// The container/codec is deliberately unspecified upstream; the capture
/// session only guarantees the final blob is the ordered concatenation of
/// every fragment delivered between start and stop.
pub trait FragmentEncoder {
    fn encode(&mut self, frame: &Frame, audio: &[f32]) -> Result<Vec<u8>>;

    fn mime_type(&self) -> &'static str {
        "application/octet-stream"
    }

    /// Filename hint for the multipart upload; the server assigns the real one.
    fn file_name(&self) -> &'static str {
        "recording.bin"
    }
}

/// Length-delimited raw-segment framing: each fragment is one frame plus its
/// audio block behind a fixed header. Dumb but self-describing, which is all
/// the headless pipeline needs.
pub struct RawSegmentEncoder;

const SEGMENT_MAGIC: &[u8; 4] = b"RSEG";

impl FragmentEncoder for RawSegmentEncoder {
    fn encode(&mut self, frame: &Frame, audio: &[f32]) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(20 + frame.rgba.len() + audio.len() * 4);
        out.extend_from_slice(SEGMENT_MAGIC);
        out.extend_from_slice(&frame.width.to_le_bytes());
        out.extend_from_slice(&frame.height.to_le_bytes());
        out.extend_from_slice(&(frame.rgba.len() as u32).to_le_bytes());
        out.extend_from_slice(&(audio.len() as u32).to_le_bytes());
        out.extend_from_slice(&frame.rgba);
        for sample in audio {
            out.extend_from_slice(&sample.to_le_bytes());
        }
        Ok(out)
    }
}

/// Counts raw segments in a finished blob. Used to recover a playable
/// duration (`segments / fps`) without a media element.
pub fn count_segments(blob: &[u8]) -> Option<u64> {
    let mut offset = 0usize;
    let mut count = 0u64;
    while offset < blob.len() {
        if blob.len() - offset < 20 || &blob[offset..offset + 4] != SEGMENT_MAGIC {
            return None;
        }
        let rgba_len =
            u32::from_le_bytes(blob[offset + 12..offset + 16].try_into().ok()?) as usize;
        let audio_len =
            u32::from_le_bytes(blob[offset + 16..offset + 20].try_into().ok()?) as usize;
        offset = offset.checked_add(20 + rgba_len + audio_len * 4)?;
        if offset > blob.len() {
            return None;
        }
        count += 1;
    }
    Some(count)
}

/// Owns one recording attempt: accepts encoded fragments while recording and
/// hands out the finished blob exactly once.
#[derive(Debug, Default)]
pub struct CaptureSession {
    state: CaptureState,
    fragments: Vec<Vec<u8>>,
}

impl CaptureSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    pub fn fragment_count(&self) -> usize {
        self.fragments.len()
    }

    /// Valid only from Idle.
    pub fn start(&mut self) -> Result<(), ClientError> {
        if self.state != CaptureState::Idle {
            return Err(ClientError::validation("A recording is already in progress"));
        }
        self.fragments.clear();
        self.state = CaptureState::Recording;
        info!("Recording started");
        Ok(())
    }

    pub fn pause(&mut self) -> Result<(), ClientError> {
        if self.state != CaptureState::Recording {
            return Err(ClientError::validation("Nothing is recording to pause"));
        }
        self.state = CaptureState::Paused;
        info!("Recording paused");
        Ok(())
    }

    pub fn resume(&mut self) -> Result<(), ClientError> {
        if self.state != CaptureState::Paused {
            return Err(ClientError::validation("Nothing is paused to resume"));
        }
        self.state = CaptureState::Recording;
        info!("Recording resumed");
        Ok(())
    }

    /// Accepts a fragment delivered by the encoder. Fragments are only
    /// meaningful while Recording; anything else is dropped.
    pub fn push_fragment(&mut self, bytes: Vec<u8>) -> bool {
        if self.state != CaptureState::Recording {
            debug!("Dropping fragment delivered while {:?}", self.state);
            return false;
        }
        self.fragments.push(bytes);
        true
    }

    /// Stops the session and concatenates the fragments, exactly once, in
    /// delivery order. A stop while already Idle is a silent no-op.
    pub fn stop(&mut self) -> Option<Vec<u8>> {
        match self.state {
            CaptureState::Idle => None,
            CaptureState::Recording | CaptureState::Paused | CaptureState::Stopping => {
                self.state = CaptureState::Stopping;
                let total: usize = self.fragments.iter().map(Vec::len).sum();
                let mut blob = Vec::with_capacity(total);
                for fragment in self.fragments.drain(..) {
                    blob.extend_from_slice(&fragment);
                }
                self.state = CaptureState::Idle;
                info!("Recording stopped ({total} bytes)");
                Some(blob)
            }
        }
    }

    /// Tears the session down without producing a blob. This is the path
    /// for "no blob should ever be produced" (e.g. permission was revoked).
    pub fn reset(&mut self) {
        self.fragments.clear();
        self.state = CaptureState::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blob_is_the_ordered_concatenation_of_fragments() {
        let mut session = CaptureSession::new();
        session.start().expect("start");
        assert!(session.push_fragment(vec![1, 2]));
        assert!(session.push_fragment(vec![3]));
        assert!(session.push_fragment(vec![4, 5, 6]));
        let blob = session.stop().expect("blob");
        assert_eq!(blob, vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(session.state(), CaptureState::Idle);
    }

    #[test]
    fn zero_and_one_fragment_blobs() {
        let mut session = CaptureSession::new();
        session.start().expect("start");
        assert_eq!(session.stop().expect("empty blob"), Vec::<u8>::new());

        session.start().expect("restart");
        session.push_fragment(vec![9]);
        assert_eq!(session.stop().expect("blob"), vec![9]);
    }

    #[test]
    fn stop_while_idle_is_a_silent_noop() {
        let mut session = CaptureSession::new();
        assert!(session.stop().is_none());
    }

    #[test]
    fn fragments_are_not_accepted_while_paused() {
        let mut session = CaptureSession::new();
        session.start().expect("start");
        session.push_fragment(vec![1]);
        session.pause().expect("pause");
        assert!(!session.push_fragment(vec![2]));
        session.resume().expect("resume");
        assert!(session.push_fragment(vec![3]));
        assert_eq!(session.stop().expect("blob"), vec![1, 3]);
    }

    #[test]
    fn lifecycle_transitions_are_guarded() {
        let mut session = CaptureSession::new();
        assert!(session.pause().is_err());
        assert!(session.resume().is_err());
        session.start().expect("start");
        assert!(session.start().is_err());
        assert!(session.resume().is_err());
        session.pause().expect("pause");
        assert!(session.pause().is_err());
    }

    #[test]
    fn stop_from_paused_produces_the_blob() {
        let mut session = CaptureSession::new();
        session.start().expect("start");
        session.push_fragment(vec![7]);
        session.pause().expect("pause");
        assert_eq!(session.stop().expect("blob"), vec![7]);
    }

    #[test]
    fn reset_discards_fragments() {
        let mut session = CaptureSession::new();
        session.start().expect("start");
        session.push_fragment(vec![1]);
        session.reset();
        assert_eq!(session.state(), CaptureState::Idle);
        assert!(session.stop().is_none());
    }

    #[test]
    fn raw_segments_roundtrip_a_count() {
        let mut encoder = RawSegmentEncoder;
        let frame = Frame {
            rgba: vec![0; 16],
            width: 2,
            height: 2,
        };
        let mut blob = Vec::new();
        for _ in 0..5 {
            blob.extend(encoder.encode(&frame, &[0.0; 4]).expect("encode"));
        }
        assert_eq!(count_segments(&blob), Some(5));
        assert_eq!(count_segments(&[]), Some(0));
        assert_eq!(count_segments(b"garbage"), None);
    }
}
