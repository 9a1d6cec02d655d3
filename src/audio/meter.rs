// Microphone volume metering and the low-clarity hint.
//
// Fed from the microphone tap only, never the mixed stream: display audio
// must not mask a quiet microphone. Levels are normalized RMS on a 0-100
// scale; a rolling average staying under the low threshold for enough
// consecutive checks raises the "low" hint so the UI can nudge the user.

use std::collections::VecDeque;

use crate::capture::AudioFrame;
use crate::config::VolumeConfig;

/// Derived clarity signal for the UI volume indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClarityHint {
    Normal,
    Low,
}

/// Stateful volume meter over the microphone frame stream.
pub struct VolumeMeter {
    tuning: VolumeConfig,
    recent: VecDeque<f32>,
    low_checks: u32,
}

impl VolumeMeter {
    pub fn new(tuning: VolumeConfig) -> Self {
        Self {
            recent: VecDeque::with_capacity(tuning.history_len),
            low_checks: 0,
            tuning,
        }
    }

    /// Sample one microphone frame.
    ///
    /// Returns `(level, hint)` where level is 0-100. While muted the reported
    /// level is pinned to zero and the hint can never be `Low`; the rolling
    /// window keeps filling (with the silence the muted track emits) so the
    /// meter resumes seamlessly on unmute.
    pub fn sample(&mut self, frame: &AudioFrame, muted: bool) -> (f32, ClarityHint) {
        let level = normalized_rms(&frame.samples, self.tuning.scale);

        self.recent.push_back(level);
        while self.recent.len() > self.tuning.history_len {
            self.recent.pop_front();
        }

        let mut hint = ClarityHint::Normal;
        let window_warm = self.recent.len() * 4 >= self.tuning.history_len * 3;
        if !muted && window_warm {
            let avg: f32 = self.recent.iter().sum::<f32>() / self.recent.len() as f32;
            if avg < self.tuning.low_threshold {
                self.low_checks += 1;
                if self.low_checks >= self.tuning.low_checks_trigger {
                    hint = ClarityHint::Low;
                }
            } else {
                self.low_checks = 0;
            }
        }

        (if muted { 0.0 } else { level }, hint)
    }
}

/// Root-mean-square of the samples normalized to 0-100 with an empirical
/// scaling factor, clamped at 100.
fn normalized_rms(samples: &[i16], scale: f32) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
    let rms = (sum_sq / samples.len() as f64).sqrt();
    ((rms / i16::MAX as f64 * 100.0) as f32 * scale).min(100.0)
}
