use anyhow::Result;
use serde::Deserialize;
use std::time::Duration;

/// Top-level pipeline configuration.
///
/// Every tunable the pipeline carries lives here with the empirically chosen
/// defaults; a TOML file can override any subset.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub audio: AudioConfig,
    pub segment: SegmentConfig,
    pub volume: VolumeConfig,
    pub transcription: TranscriptionConfig,
}

/// Capture format shared by every stream in the graph.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Sample rate in Hz (16kHz suits speech-to-text backends)
    pub sample_rate: u32,
    /// Channel count (1 = mono, 2 = stereo)
    pub channels: u16,
    /// Capture buffer duration in milliseconds (affects latency)
    pub frame_duration_ms: u64,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            channels: 1,
            frame_duration_ms: 100,
        }
    }
}

/// Segmented-recording settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SegmentConfig {
    /// Wall-clock duration of each recorded segment in milliseconds
    pub duration_ms: u64,
    /// Ordered encoding preferences probed at session start; the first
    /// supported entry wins, otherwise the default encoding is used.
    pub preferred_mime_types: Vec<String>,
}

impl SegmentConfig {
    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }
}

impl Default for SegmentConfig {
    fn default() -> Self {
        Self {
            duration_ms: 5000,
            preferred_mime_types: vec![
                "audio/wav;codecs=pcm_s16le".to_string(),
                "audio/wav".to_string(),
                "audio/x-wav".to_string(),
            ],
        }
    }
}

/// Volume meter tuning. The thresholds are empirical, not invariants.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VolumeConfig {
    /// Scaling factor applied to normalized RMS before clamping to 0-100
    pub scale: f32,
    /// Rolling average below this level counts as a low-volume check
    pub low_threshold: f32,
    /// Number of recent samples in the rolling window
    pub history_len: usize,
    /// Consecutive low checks before the low-clarity hint is raised
    pub low_checks_trigger: u32,
}

impl Default for VolumeConfig {
    fn default() -> Self {
        Self {
            scale: 1.7,
            low_threshold: 15.0,
            history_len: 20,
            low_checks_trigger: 30,
        }
    }
}

/// HTTP transcription backend settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TranscriptionConfig {
    /// Transcription endpoint URL; unset means transcription is disabled
    pub endpoint: Option<String>,
    /// Bearer token for the endpoint
    pub api_key: Option<String>,
    /// Retries per segment inside the transcription call
    pub max_retries: u32,
    /// Base delay between retries (doubles per attempt)
    pub retry_delay_ms: u64,
    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key: None,
            max_retries: 3,
            retry_delay_ms: 1000,
            request_timeout_secs: 60,
        }
    }
}

impl PipelineConfig {
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_tuned_constants() {
        let cfg = PipelineConfig::default();
        assert_eq!(cfg.segment.duration(), Duration::from_secs(5));
        assert_eq!(cfg.volume.history_len, 20);
        assert_eq!(cfg.volume.low_checks_trigger, 30);
        assert!((cfg.volume.low_threshold - 15.0).abs() < f32::EPSILON);
        assert_eq!(cfg.transcription.max_retries, 3);
    }
}
