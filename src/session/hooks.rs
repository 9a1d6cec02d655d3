use crate::audio::{AudioArtifact, ClarityHint};

use super::state::SessionState;

/// Extra payload accompanying a state change notification.
#[derive(Debug, Default, Clone)]
pub struct StateDetails {
    /// Human-readable message, present on `Error`
    pub error_message: Option<String>,
    /// Final audio artifact, present when a session finished with audio
    pub final_audio: Option<AudioArtifact>,
}

impl StateDetails {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            error_message: Some(message.into()),
            final_audio: None,
        }
    }

    pub fn finished(final_audio: Option<AudioArtifact>) -> Self {
        Self {
            error_message: None,
            final_audio,
        }
    }
}

type StateChangeFn = dyn Fn(SessionState, StateDetails) + Send + Sync;
type TranscriptChunkFn = dyn Fn(String) + Send + Sync;
type VolumeUpdateFn = dyn Fn(f32, ClarityHint) + Send + Sync;
type MuteChangeFn = dyn Fn(bool) + Send + Sync;

/// Callbacks wired to the host UI.
///
/// Every pipeline observation flows through exactly one of these four
/// channels; unset hooks are simply skipped. Hooks are invoked from pipeline
/// tasks, so they should return quickly and must not call back into the
/// session synchronously.
#[derive(Default)]
pub struct SessionHooks {
    on_state_change: Option<Box<StateChangeFn>>,
    on_transcript_chunk: Option<Box<TranscriptChunkFn>>,
    on_volume_update: Option<Box<VolumeUpdateFn>>,
    on_mute_change: Option<Box<MuteChangeFn>>,
}

impl SessionHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_state_change(
        mut self,
        f: impl Fn(SessionState, StateDetails) + Send + Sync + 'static,
    ) -> Self {
        self.on_state_change = Some(Box::new(f));
        self
    }

    pub fn on_transcript_chunk(mut self, f: impl Fn(String) + Send + Sync + 'static) -> Self {
        self.on_transcript_chunk = Some(Box::new(f));
        self
    }

    pub fn on_volume_update(
        mut self,
        f: impl Fn(f32, ClarityHint) + Send + Sync + 'static,
    ) -> Self {
        self.on_volume_update = Some(Box::new(f));
        self
    }

    pub fn on_mute_change(mut self, f: impl Fn(bool) + Send + Sync + 'static) -> Self {
        self.on_mute_change = Some(Box::new(f));
        self
    }

    pub(crate) fn state_changed(&self, state: SessionState, details: StateDetails) {
        if let Some(hook) = &self.on_state_change {
            hook(state, details);
        }
    }

    pub(crate) fn transcript_chunk(&self, text: String) {
        if let Some(hook) = &self.on_transcript_chunk {
            hook(text);
        }
    }

    pub(crate) fn volume_update(&self, level: f32, hint: ClarityHint) {
        if let Some(hook) = &self.on_volume_update {
            hook(level, hint);
        }
    }

    pub(crate) fn mute_changed(&self, muted: bool) {
        if let Some(hook) = &self.on_mute_change {
            hook(muted);
        }
    }
}
