pub mod artifact;
pub mod encoding;
pub mod meter;
pub mod mixer;
pub mod segment;

pub use artifact::{concatenate_segments, AudioArtifact};
pub use encoding::{negotiate_segment_mime, DEFAULT_SEGMENT_MIME};
pub use meter::{ClarityHint, VolumeMeter};
pub use mixer::{MixerConfig, StreamMixer};
pub use segment::{SegmentBlob, SegmentRecorder, SegmentSettings};
