use anyhow::{bail, Context, Result};
use tokio::sync::mpsc;
use tracing::{info, warn};

use super::frame::{AudioFrame, StreamSource};
use super::provider::{CaptureProvider, DisplayRequest};
use super::track::TrackHandle;

/// Everything acquired for one session, ready for the stream graph.
pub struct AcquiredStreams {
    /// Microphone audio frames (always present).
    pub mic_frames: mpsc::Receiver<AudioFrame>,
    /// Display audio frames, absent when the share carried no audio track.
    pub display_frames: Option<mpsc::Receiver<AudioFrame>>,
    /// Microphone audio tracks; these are the mute targets.
    pub mic_tracks: Vec<TrackHandle>,
    /// Every raw track acquired, display video included. All of them must be
    /// stopped at teardown to release OS-level capture indicators.
    pub all_tracks: Vec<TrackHandle>,
}

/// Acquire the microphone and display streams for a new session.
///
/// Microphone failure is fatal. Display capture is tried with the preferred
/// constraint shape and retried once relaxed; both attempts failing is fatal
/// too, but a display stream without an audio track degrades gracefully to
/// microphone-only recording. Invoked exactly once per session start.
pub async fn acquire_streams(provider: &dyn CaptureProvider) -> Result<AcquiredStreams> {
    let mut mic = provider
        .open_microphone()
        .await
        .context("microphone access failed")?;

    let mic_tracks = mic.audio_tracks(StreamSource::Microphone);
    if mic_tracks.is_empty() || mic.frames.is_none() {
        stop_all(&mic.tracks);
        bail!("microphone stream has no audio track");
    }
    // A fresh session always starts unmuted.
    for track in &mic_tracks {
        track.set_enabled(true);
    }

    let display = match provider.open_display(DisplayRequest::preferred()).await {
        Ok(stream) => stream,
        Err(err) => {
            warn!(
                provider = provider.name(),
                "preferred display capture rejected ({err:#}), retrying with relaxed constraints"
            );
            match provider.open_display(DisplayRequest::relaxed()).await {
                Ok(stream) => stream,
                Err(err) => {
                    stop_all(&mic.tracks);
                    return Err(err).context("display capture failed");
                }
            }
        }
    };

    if display.has_audio() {
        info!("acquired microphone and display audio streams");
    } else {
        info!("display share carries no audio track, recording microphone only");
    }

    let mut all_tracks = mic.tracks.clone();
    all_tracks.extend(display.tracks.iter().cloned());

    Ok(AcquiredStreams {
        mic_frames: mic.frames.take().context("microphone frame feed missing")?,
        display_frames: display.frames,
        mic_tracks,
        all_tracks,
    })
}

fn stop_all(tracks: &[TrackHandle]) {
    for track in tracks {
        track.stop();
    }
}
