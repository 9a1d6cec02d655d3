use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::frame::StreamSource;

/// Kind of media flowing through a track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Audio,
    Video,
}

/// Handle to one raw capture track.
///
/// A track is produced by a [`CaptureProvider`](super::CaptureProvider) and
/// shared with the session for two control operations that must not disturb
/// the stream graph:
///
/// - `set_enabled(false)` makes the producer emit silence in place of real
///   samples (mute). The producer keeps running and downstream consumers see
///   an uninterrupted stream of silent frames.
/// - `stop()` ends the track for good: the producer shuts down and releases
///   the underlying device. Video tracks carry no frames through the pipeline
///   but still must be stopped so the OS capture indicator goes away.
#[derive(Debug, Clone)]
pub struct TrackHandle {
    label: String,
    kind: TrackKind,
    source: StreamSource,
    enabled: Arc<AtomicBool>,
    live: Arc<AtomicBool>,
}

impl TrackHandle {
    pub fn new(label: impl Into<String>, kind: TrackKind, source: StreamSource) -> Self {
        Self {
            label: label.into(),
            kind,
            source,
            enabled: Arc::new(AtomicBool::new(true)),
            live: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn kind(&self) -> TrackKind {
        self.kind
    }

    pub fn source(&self) -> StreamSource {
        self.source
    }

    /// Enable or disable the track. Disabled audio tracks produce silence.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Permanently stop the track and release the underlying device.
    pub fn stop(&self) {
        self.live.store(false, Ordering::SeqCst);
    }

    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }
}
