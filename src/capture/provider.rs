use anyhow::Result;
use tokio::sync::mpsc;

use super::frame::{AudioFrame, StreamSource};
use super::track::{TrackHandle, TrackKind};

/// Constraints for a display/tab capture request.
///
/// Acquisition first asks for tab audio with local playback kept audible,
/// then retries once with relaxed constraints if that specific shape is
/// rejected or unsupported.
#[derive(Debug, Clone, Copy)]
pub struct DisplayRequest {
    /// `Some(false)` asks the environment to keep playing captured audio
    /// locally; `None` leaves the behavior up to the environment.
    pub suppress_local_playback: Option<bool>,
}

impl DisplayRequest {
    /// Preferred shape: tab audio with local playback left audible.
    pub fn preferred() -> Self {
        Self {
            suppress_local_playback: Some(false),
        }
    }

    /// Relaxed fallback: generic screen share with audio.
    pub fn relaxed() -> Self {
        Self {
            suppress_local_playback: None,
        }
    }
}

/// One acquired media stream: an optional audio frame feed plus the raw
/// tracks backing it.
///
/// Display capture may yield no audio feed at all (video-only share); that is
/// not an error, but the tracks are still retained so they can be stopped at
/// teardown.
pub struct CaptureStream {
    /// Audio frames, if the stream carries an audio track.
    pub frames: Option<mpsc::Receiver<AudioFrame>>,
    /// Every raw track backing the stream, video tracks included.
    pub tracks: Vec<TrackHandle>,
}

impl CaptureStream {
    pub fn has_audio(&self) -> bool {
        self.frames.is_some()
    }

    /// Audio tracks for a given source (the mute targets, for microphones).
    pub fn audio_tracks(&self, source: StreamSource) -> Vec<TrackHandle> {
        self.tracks
            .iter()
            .filter(|t| t.kind() == TrackKind::Audio && t.source() == source)
            .cloned()
            .collect()
    }
}

/// Device acquisition seam.
///
/// Implementations own the platform specifics (browser media APIs, OS capture
/// frameworks, test tone generators) and hand back frame channels plus track
/// handles. Producers must honor [`TrackHandle`] semantics: emit silence while
/// a track is disabled, and shut down when it is stopped.
#[async_trait::async_trait]
pub trait CaptureProvider: Send + Sync {
    /// Open the microphone (audio only). Failure is fatal for the session.
    async fn open_microphone(&self) -> Result<CaptureStream>;

    /// Open a display/tab capture with audio. The returned stream may carry
    /// no audio feed if the user shared video only.
    async fn open_display(&self, request: DisplayRequest) -> Result<CaptureStream>;

    /// Provider name for logging
    fn name(&self) -> &str;
}
