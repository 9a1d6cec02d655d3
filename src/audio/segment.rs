// Rolling fixed-duration segment recording.
//
// The recorder owns the single reader of the mixed stream and chains
// segments back to back: open, collect frames, finalize on the wall-clock
// deadline (or immediately when stop is requested), hand the blob off, open
// the next. At most one segment is ever open.

use anyhow::{bail, Result};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{self, Instant};
use tracing::{debug, info};

use crate::audio::encoding::encode_wav;
use crate::capture::AudioFrame;

/// Settings for the segment chain
#[derive(Debug, Clone)]
pub struct SegmentSettings {
    /// Wall-clock duration of each segment
    pub duration: Duration,
    /// Negotiated MIME type stamped onto every finalized blob
    pub mime_type: String,
}

/// One finalized segment of mixed audio.
///
/// Holds raw PCM so the accumulator can concatenate sessions losslessly;
/// [`SegmentBlob::encode`] produces the container bytes for dispatch.
#[derive(Debug, Clone)]
pub struct SegmentBlob {
    /// Position in recording order (0-indexed)
    pub sequence: usize,
    /// Interleaved i16 PCM collected during the segment
    pub samples: Vec<i16>,
    pub sample_rate: u32,
    pub channels: u16,
    pub mime_type: String,
}

impl SegmentBlob {
    /// Encode the segment into its negotiated container format.
    pub fn encode(&self) -> Result<Vec<u8>> {
        encode_wav(&self.samples, self.sample_rate, self.channels)
    }

    pub fn duration_ms(&self) -> u64 {
        if self.sample_rate == 0 || self.channels == 0 {
            return 0;
        }
        let frames = self.samples.len() as u64 / self.channels as u64;
        frames * 1000 / self.sample_rate as u64
    }
}

/// Collects the frames of the currently open segment.
struct OpenSegment {
    samples: Vec<i16>,
    sample_rate: u32,
    channels: u16,
}

impl OpenSegment {
    fn from_first_frame(frame: &AudioFrame) -> Self {
        Self {
            samples: Vec::new(),
            sample_rate: frame.sample_rate,
            channels: frame.channels,
        }
    }

    fn write_frame(&mut self, frame: &AudioFrame) {
        self.samples.extend_from_slice(&frame.samples);
    }
}

struct SegmentOutcome {
    blob: Option<SegmentBlob>,
    stop_requested: bool,
}

/// Records fixed-duration segments from the mixed stream until stopped.
pub struct SegmentRecorder {
    settings: SegmentSettings,
    sequence: usize,
}

impl SegmentRecorder {
    pub fn new(settings: SegmentSettings) -> Self {
        info!(
            "segment recorder initialized: {}ms segments, {}",
            settings.duration.as_millis(),
            settings.mime_type
        );
        Self {
            settings,
            sequence: 0,
        }
    }

    /// Run the segment chain.
    ///
    /// Every finalized non-empty segment is sent on `segments` in recording
    /// order. Returns `Ok(())` once stop is requested and the in-flight
    /// segment has been flushed; returns an error if the mixed stream dies
    /// while recording is still expected to continue (fatal for the session).
    pub async fn run(
        mut self,
        mut frames: mpsc::Receiver<AudioFrame>,
        mut stop: watch::Receiver<bool>,
        segments: mpsc::Sender<SegmentBlob>,
    ) -> Result<()> {
        loop {
            let outcome = self.record_one(&mut frames, &mut stop).await?;

            if let Some(blob) = outcome.blob {
                debug!(
                    sequence = blob.sequence,
                    samples = blob.samples.len(),
                    "segment finalized"
                );
                if segments.send(blob).await.is_err() {
                    debug!("segment consumer dropped, ending recorder");
                    return Ok(());
                }
            } else {
                debug!("segment finalized with no audio data, skipping dispatch");
            }

            if outcome.stop_requested {
                info!("segment recorder stopped after {} segments", self.sequence);
                return Ok(());
            }
        }
    }

    /// Record a single segment until its deadline fires or stop is requested.
    async fn record_one(
        &mut self,
        frames: &mut mpsc::Receiver<AudioFrame>,
        stop: &mut watch::Receiver<bool>,
    ) -> Result<SegmentOutcome> {
        let deadline = Instant::now() + self.settings.duration;
        let mut open: Option<OpenSegment> = None;
        let mut stop_requested = *stop.borrow_and_update();

        while !stop_requested {
            tokio::select! {
                _ = time::sleep_until(deadline) => break,
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow_and_update() {
                        stop_requested = true;
                    }
                }
                maybe_frame = frames.recv() => match maybe_frame {
                    Some(frame) => {
                        let segment = open.get_or_insert_with(|| OpenSegment::from_first_frame(&frame));
                        segment.write_frame(&frame);
                    }
                    None => {
                        if *stop.borrow() {
                            stop_requested = true;
                        } else {
                            bail!("mixed audio stream ended while recording");
                        }
                    }
                }
            }
        }

        let blob = open.filter(|s| !s.samples.is_empty()).map(|s| {
            let blob = SegmentBlob {
                sequence: self.sequence,
                samples: s.samples,
                sample_rate: s.sample_rate,
                channels: s.channels,
                mime_type: self.settings.mime_type.clone(),
            };
            self.sequence += 1;
            blob
        });

        Ok(SegmentOutcome {
            blob,
            stop_requested,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::StreamSource;

    fn settings(duration_ms: u64) -> SegmentSettings {
        SegmentSettings {
            duration: Duration::from_millis(duration_ms),
            mime_type: "audio/wav".to_string(),
        }
    }

    fn frame(timestamp_ms: u64, samples: Vec<i16>) -> AudioFrame {
        AudioFrame {
            samples,
            sample_rate: 16000,
            channels: 1,
            timestamp_ms,
            source: StreamSource::Mixed,
        }
    }

    #[tokio::test]
    async fn stop_forces_immediate_finalize() {
        let (frame_tx, frame_rx) = mpsc::channel(16);
        let (stop_tx, stop_rx) = watch::channel(false);
        let (seg_tx, mut seg_rx) = mpsc::channel(16);

        let recorder = SegmentRecorder::new(settings(60_000));
        let handle = tokio::spawn(recorder.run(frame_rx, stop_rx, seg_tx));

        frame_tx.send(frame(0, vec![1, 2, 3])).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        stop_tx.send(true).unwrap();

        let blob = seg_rx.recv().await.expect("in-flight segment flushed");
        assert_eq!(blob.sequence, 0);
        assert_eq!(blob.samples, vec![1, 2, 3]);
        assert!(seg_rx.recv().await.is_none());
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn segments_chain_in_recording_order() {
        let (frame_tx, frame_rx) = mpsc::channel(64);
        let (stop_tx, stop_rx) = watch::channel(false);
        let (seg_tx, mut seg_rx) = mpsc::channel(16);

        let recorder = SegmentRecorder::new(settings(100));
        let handle = tokio::spawn(recorder.run(frame_rx, stop_rx, seg_tx));

        // Feed frames for a bit over two segment durations.
        for i in 0..10u64 {
            frame_tx.send(frame(i * 25, vec![i as i16; 4])).await.unwrap();
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        stop_tx.send(true).unwrap();
        drop(frame_tx);

        let mut sequences = Vec::new();
        while let Some(blob) = seg_rx.recv().await {
            sequences.push(blob.sequence);
        }
        assert!(sequences.len() >= 2, "expected multiple segments, got {sequences:?}");
        let expected: Vec<usize> = (0..sequences.len()).collect();
        assert_eq!(sequences, expected, "segments must finalize in order");
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn empty_segment_is_skipped_but_loop_continues() {
        let (frame_tx, frame_rx) = mpsc::channel(16);
        let (stop_tx, stop_rx) = watch::channel(false);
        let (seg_tx, mut seg_rx) = mpsc::channel(16);

        let recorder = SegmentRecorder::new(settings(40));
        let handle = tokio::spawn(recorder.run(frame_rx, stop_rx, seg_tx));

        // First segment elapses with no frames at all.
        tokio::time::sleep(Duration::from_millis(60)).await;
        frame_tx.send(frame(0, vec![7, 7])).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        stop_tx.send(true).unwrap();

        let blob = seg_rx.recv().await.expect("second segment delivered");
        assert_eq!(blob.sequence, 0, "empty segment must not consume a sequence number");
        assert_eq!(blob.samples, vec![7, 7]);
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn dead_stream_while_recording_is_fatal() {
        let (frame_tx, frame_rx) = mpsc::channel(16);
        let (_stop_tx, stop_rx) = watch::channel(false);
        let (seg_tx, _seg_rx) = mpsc::channel(16);

        let recorder = SegmentRecorder::new(settings(60_000));
        let handle = tokio::spawn(recorder.run(frame_rx, stop_rx, seg_tx));

        frame_tx.send(frame(0, vec![1])).await.unwrap();
        drop(frame_tx); // stream dies without a stop request

        let result = handle.await.unwrap();
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn stop_before_any_frame_produces_no_blob() {
        let (_frame_tx, frame_rx) = mpsc::channel::<AudioFrame>(16);
        let (stop_tx, stop_rx) = watch::channel(false);
        let (seg_tx, mut seg_rx) = mpsc::channel(16);

        stop_tx.send(true).unwrap();
        let recorder = SegmentRecorder::new(settings(60_000));
        recorder.run(frame_rx, stop_rx, seg_tx).await.unwrap();
        assert!(seg_rx.recv().await.is_none());
    }
}
