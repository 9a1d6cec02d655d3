// Streaming mixer combining microphone and display audio.
//
// Frames from each source are queued separately, paired up, and mixed by
// sample addition with clipping. A frame whose partner never arrives (the
// other source stalled or ended) is flushed alone once it outlives the
// pairing window, so one dead source never dams the stream.

use anyhow::Result;
use std::collections::{HashMap, VecDeque};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::capture::{AudioFrame, StreamSource};

/// Configuration for the stream mixer
#[derive(Debug, Clone)]
pub struct MixerConfig {
    /// Expected sample rate; mismatched frames are dropped
    pub sample_rate: u32,
    /// Expected channel count; mismatched frames are dropped
    pub channels: u16,
    /// Sources feeding the mixer
    pub sources: Vec<StreamSource>,
    /// How long an unpaired frame may wait before being flushed alone
    pub max_pair_delay_ms: u64,
}

impl MixerConfig {
    pub fn new(sample_rate: u32, channels: u16, sources: Vec<StreamSource>) -> Self {
        Self {
            sample_rate,
            channels,
            sources,
            max_pair_delay_ms: 200,
        }
    }
}

/// Mixes tagged audio frames from multiple sources into one stream.
pub struct StreamMixer {
    config: MixerConfig,
    queues: HashMap<StreamSource, VecDeque<AudioFrame>>,
    /// Highest timestamp seen on any input, used to age unpaired frames
    latest_ms: u64,
}

impl StreamMixer {
    pub fn new(config: MixerConfig) -> Self {
        let mut queues = HashMap::new();
        for source in &config.sources {
            queues.insert(*source, VecDeque::new());
        }

        info!(
            "stream mixer initialized: {}Hz, {} channels, {} sources",
            config.sample_rate,
            config.channels,
            config.sources.len()
        );

        Self {
            config,
            queues,
            latest_ms: 0,
        }
    }

    /// Run the mixer until the input closes, forwarding mixed frames.
    ///
    /// Returns when the input channel is exhausted (remaining buffered frames
    /// are flushed) or the output consumer goes away.
    pub async fn run(
        mut self,
        mut input: mpsc::Receiver<AudioFrame>,
        output: mpsc::Sender<AudioFrame>,
    ) -> Result<()> {
        while let Some(frame) = input.recv().await {
            self.push(frame);
            while let Some(mixed) = self.pop_ready(false) {
                if output.send(mixed).await.is_err() {
                    debug!("mixed frame consumer dropped, stopping mixer");
                    return Ok(());
                }
            }
        }

        // Input ended; flush whatever is still queued, unpaired or not.
        while let Some(mixed) = self.pop_ready(true) {
            if output.send(mixed).await.is_err() {
                break;
            }
        }

        debug!("stream mixer input exhausted");
        Ok(())
    }

    fn push(&mut self, frame: AudioFrame) {
        if frame.sample_rate != self.config.sample_rate {
            warn!(
                "frame sample rate mismatch: expected {}, got {}, dropping",
                self.config.sample_rate, frame.sample_rate
            );
            return;
        }
        if frame.channels != self.config.channels {
            warn!(
                "frame channel count mismatch: expected {}, got {}, dropping",
                self.config.channels, frame.channels
            );
            return;
        }

        self.latest_ms = self.latest_ms.max(frame.timestamp_ms);
        if let Some(queue) = self.queues.get_mut(&frame.source) {
            queue.push_back(frame);
        } else {
            debug!(source = ?frame.source, "frame from unregistered source dropped");
        }
    }

    /// Pop the next output frame, if one is ready.
    ///
    /// A frame is ready when every source has a frame queued (full mix), or
    /// when the oldest queued frame has waited past the pairing window
    /// (flushed alone). `drain` treats everything as ready.
    fn pop_ready(&mut self, drain: bool) -> Option<AudioFrame> {
        let all_ready = !self.queues.is_empty() && self.queues.values().all(|q| !q.is_empty());

        if all_ready {
            let frames: Vec<AudioFrame> = self
                .queues
                .values_mut()
                .filter_map(|q| q.pop_front())
                .collect();
            return Some(Self::mix_frames(frames));
        }

        // Find the oldest waiting frame across all queues.
        let stale_source = self
            .queues
            .iter()
            .filter(|(_, q)| !q.is_empty())
            .min_by_key(|(_, q)| q.front().map(|f| f.timestamp_ms).unwrap_or(u64::MAX))
            .map(|(source, _)| *source)?;

        let front_ms = self.queues[&stale_source].front()?.timestamp_ms;
        if drain || front_ms + self.config.max_pair_delay_ms <= self.latest_ms {
            return self
                .queues
                .get_mut(&stale_source)
                .and_then(|q| q.pop_front());
        }

        None
    }

    /// Mix frames by sample addition with clipping to the i16 range.
    fn mix_frames(mut frames: Vec<AudioFrame>) -> AudioFrame {
        if frames.len() == 1 {
            let mut frame = frames.remove(0);
            frame.source = StreamSource::Mixed;
            return frame;
        }

        let timestamp_ms = frames.iter().map(|f| f.timestamp_ms).min().unwrap_or(0);
        let max_len = frames.iter().map(|f| f.samples.len()).max().unwrap_or(0);
        let sample_rate = frames.first().map(|f| f.sample_rate).unwrap_or(0);
        let channels = frames.first().map(|f| f.channels).unwrap_or(0);

        let mut mixed_samples = Vec::with_capacity(max_len);
        for i in 0..max_len {
            let mut sum: i32 = 0;
            for frame in &frames {
                sum += frame.samples.get(i).copied().unwrap_or(0) as i32;
            }
            mixed_samples.push(sum.clamp(i16::MIN as i32, i16::MAX as i32) as i16);
        }

        AudioFrame {
            samples: mixed_samples,
            sample_rate,
            channels,
            timestamp_ms,
            source: StreamSource::Mixed,
        }
    }
}
