use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Statistics about a recording session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStats {
    /// Whether recording is currently active
    pub is_recording: bool,

    /// When the current session started, if one is underway
    pub started_at: Option<DateTime<Utc>>,

    /// Elapsed session duration in seconds
    pub duration_secs: f64,

    /// Number of segments finalized so far
    pub segments_recorded: usize,

    /// Number of transcript chunks delivered so far
    pub transcript_chunks: usize,
}

impl SessionStats {
    pub fn inactive() -> Self {
        Self {
            is_recording: false,
            started_at: None,
            duration_secs: 0.0,
            segments_recorded: 0,
            transcript_chunks: 0,
        }
    }
}
