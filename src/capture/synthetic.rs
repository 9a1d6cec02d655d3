// Synthetic capture provider generating sine tones in real time.
//
// Stands in for platform capture in the CLI demo and in tests: frames are
// paced by a tokio interval at the configured frame duration, and producers
// honor TrackHandle semantics (silence while disabled, shutdown on stop).

use std::f32::consts::TAU;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::mpsc;
use tracing::debug;

use super::frame::{AudioFrame, StreamSource};
use super::provider::{CaptureProvider, CaptureStream, DisplayRequest};
use super::track::{TrackHandle, TrackKind};
use crate::config::AudioConfig;

/// Tone-generating capture provider.
#[derive(Debug, Clone)]
pub struct SyntheticProvider {
    audio: AudioConfig,
    /// Microphone tone frequency in Hz
    mic_freq: f32,
    /// Display tone frequency in Hz
    display_freq: f32,
    /// Peak amplitude as a fraction of i16 range
    amplitude: f32,
    /// Whether display capture yields an audio track
    display_audio: bool,
}

impl SyntheticProvider {
    pub fn new(audio: AudioConfig) -> Self {
        Self {
            audio,
            mic_freq: 440.0,
            display_freq: 330.0,
            amplitude: 0.4,
            display_audio: true,
        }
    }

    /// Configure whether display capture produces an audio track
    /// (video-only shares exercise the mic-only degradation path).
    pub fn with_display_audio(mut self, display_audio: bool) -> Self {
        self.display_audio = display_audio;
        self
    }

    pub fn with_amplitude(mut self, amplitude: f32) -> Self {
        self.amplitude = amplitude;
        self
    }

    fn spawn_tone(&self, track: TrackHandle, freq: f32, source: StreamSource) -> mpsc::Receiver<AudioFrame> {
        let (tx, rx) = mpsc::channel(32);
        let audio = self.audio.clone();
        let amplitude = self.amplitude;

        tokio::spawn(async move {
            let samples_per_frame =
                (audio.sample_rate as u64 * audio.frame_duration_ms / 1000) as usize * audio.channels as usize;
            let mut interval = tokio::time::interval(Duration::from_millis(audio.frame_duration_ms));
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            let mut phase: f32 = 0.0;
            let mut timestamp_ms: u64 = 0;
            let step = TAU * freq / audio.sample_rate as f32;

            loop {
                interval.tick().await;
                if !track.is_live() {
                    debug!(?source, "synthetic track stopped, releasing producer");
                    break;
                }

                let enabled = track.is_enabled();
                let mut samples = Vec::with_capacity(samples_per_frame);
                for i in 0..samples_per_frame {
                    if enabled && i % audio.channels as usize == 0 {
                        phase = (phase + step) % TAU;
                    }
                    let value = if enabled {
                        (phase.sin() * amplitude * i16::MAX as f32) as i16
                    } else {
                        // Disabled track keeps producing, but only silence.
                        0
                    };
                    samples.push(value);
                }

                let frame = AudioFrame {
                    samples,
                    sample_rate: audio.sample_rate,
                    channels: audio.channels,
                    timestamp_ms,
                    source,
                };
                timestamp_ms += audio.frame_duration_ms;

                if tx.send(frame).await.is_err() {
                    debug!(?source, "synthetic frame consumer dropped, stopping producer");
                    break;
                }
            }
        });

        rx
    }
}

#[async_trait::async_trait]
impl CaptureProvider for SyntheticProvider {
    async fn open_microphone(&self) -> Result<CaptureStream> {
        let track = TrackHandle::new("synthetic-mic", TrackKind::Audio, StreamSource::Microphone);
        let rx = self.spawn_tone(track.clone(), self.mic_freq, StreamSource::Microphone);
        Ok(CaptureStream {
            frames: Some(rx),
            tracks: vec![track],
        })
    }

    async fn open_display(&self, request: DisplayRequest) -> Result<CaptureStream> {
        debug!(
            suppress_local_playback = ?request.suppress_local_playback,
            "opening synthetic display capture"
        );
        let video = TrackHandle::new("synthetic-display-video", TrackKind::Video, StreamSource::Display);
        if !self.display_audio {
            return Ok(CaptureStream {
                frames: None,
                tracks: vec![video],
            });
        }
        let audio = TrackHandle::new("synthetic-display-audio", TrackKind::Audio, StreamSource::Display);
        let rx = self.spawn_tone(audio.clone(), self.display_freq, StreamSource::Display);
        Ok(CaptureStream {
            frames: Some(rx),
            tracks: vec![video, audio],
        })
    }

    fn name(&self) -> &str {
        "synthetic"
    }
}
