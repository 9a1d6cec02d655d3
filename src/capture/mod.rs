pub mod acquire;
pub mod frame;
pub mod provider;
pub mod synthetic;
pub mod track;

pub use acquire::{acquire_streams, AcquiredStreams};
pub use frame::{AudioFrame, StreamSource};
pub use provider::{CaptureProvider, CaptureStream, DisplayRequest};
pub use synthetic::SyntheticProvider;
pub use track::{TrackHandle, TrackKind};
