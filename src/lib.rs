pub mod audio;
pub mod capture;
pub mod config;
pub mod session;
pub mod transcribe;

pub use audio::{AudioArtifact, ClarityHint, SegmentBlob, StreamMixer, VolumeMeter};
pub use capture::{AudioFrame, CaptureProvider, CaptureStream, StreamSource, SyntheticProvider, TrackHandle};
pub use config::PipelineConfig;
pub use session::{AudioSession, SessionHooks, SessionState, SessionStats, StateDetails};
pub use transcribe::{HttpTranscriber, HttpTranscriberConfig, NoopTranscriber, Transcriber};
