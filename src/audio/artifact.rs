use anyhow::{Context, Result};
use std::fmt;
use std::path::Path;

use super::encoding::encode_wav;
use super::segment::SegmentBlob;

/// The final audio artifact for a session: every finalized segment
/// concatenated in recording order into one container.
#[derive(Clone)]
pub struct AudioArtifact {
    /// Encoded container bytes
    pub data: Vec<u8>,
    pub mime_type: String,
    pub duration_ms: u64,
    pub segment_count: usize,
}

impl AudioArtifact {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Write the artifact to disk (the download path for a finished session).
    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, &self.data)
            .with_context(|| format!("failed to write audio artifact to {}", path.display()))
    }
}

impl fmt::Debug for AudioArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioArtifact")
            .field("bytes", &self.data.len())
            .field("mime_type", &self.mime_type)
            .field("duration_ms", &self.duration_ms)
            .field("segment_count", &self.segment_count)
            .finish()
    }
}

/// Concatenate all segment blobs of a session into one artifact.
///
/// Returns `Ok(None)` when no segments were finalized; an empty session is
/// not an error. Segment order in the slice is recording order and is
/// preserved sample for sample.
pub fn concatenate_segments(blobs: &[SegmentBlob]) -> Result<Option<AudioArtifact>> {
    let Some(first) = blobs.first() else {
        return Ok(None);
    };

    let total: usize = blobs.iter().map(|b| b.samples.len()).sum();
    let mut samples = Vec::with_capacity(total);
    let mut duration_ms = 0;
    for blob in blobs {
        samples.extend_from_slice(&blob.samples);
        duration_ms += blob.duration_ms();
    }

    let data = encode_wav(&samples, first.sample_rate, first.channels)
        .context("failed to encode final audio artifact")?;

    Ok(Some(AudioArtifact {
        data,
        mime_type: first.mime_type.clone(),
        duration_ms,
        segment_count: blobs.len(),
    }))
}
