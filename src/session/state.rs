use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a recording session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    Idle,
    Initializing,
    Recording,
    Stopping,
    Stopped,
    Error,
}

impl SessionState {
    /// States from which a new session may be started. `Error` is included
    /// so a failed session can be retried from scratch.
    pub fn can_start(self) -> bool {
        matches!(
            self,
            SessionState::Idle | SessionState::Stopped | SessionState::Error
        )
    }

    /// Whether a session is currently underway (resources held).
    pub fn is_active(self) -> bool {
        matches!(
            self,
            SessionState::Initializing | SessionState::Recording | SessionState::Stopping
        )
    }

    /// Legality relation for the session lifecycle. Everything outside this
    /// table is a bug in the caller and gets logged and suppressed instead
    /// of corrupting the pipeline.
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Idle, Initializing)
                | (Initializing, Recording)
                | (Initializing, Stopping)
                | (Initializing, Error)
                | (Recording, Stopping)
                | (Recording, Error)
                | (Stopping, Stopped)
                | (Stopping, Error)
                | (Stopped, Initializing)
                | (Error, Initializing)
        )
    }
}

impl Default for SessionState {
    fn default() -> Self {
        SessionState::Idle
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Initializing => "initializing",
            SessionState::Recording => "recording",
            SessionState::Stopping => "stopping",
            SessionState::Stopped => "stopped",
            SessionState::Error => "error",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::SessionState::*;
    use super::*;

    #[test]
    fn start_allowed_only_from_terminal_states() {
        assert!(Idle.can_start());
        assert!(Stopped.can_start());
        assert!(Error.can_start());
        assert!(!Initializing.can_start());
        assert!(!Recording.can_start());
        assert!(!Stopping.can_start());
    }

    #[test]
    fn happy_path_is_legal() {
        let path = [Idle, Initializing, Recording, Stopping, Stopped];
        for pair in path.windows(2) {
            assert!(
                pair[0].can_transition_to(pair[1]),
                "{} -> {} should be legal",
                pair[0],
                pair[1]
            );
        }
        assert!(Stopped.can_transition_to(Initializing));
    }

    #[test]
    fn failure_paths_are_legal() {
        assert!(Initializing.can_transition_to(Error));
        assert!(Recording.can_transition_to(Error));
        assert!(Stopping.can_transition_to(Error));
        assert!(Error.can_transition_to(Initializing));
    }

    #[test]
    fn shortcuts_are_illegal() {
        assert!(!Idle.can_transition_to(Recording));
        assert!(!Idle.can_transition_to(Stopped));
        assert!(!Recording.can_transition_to(Stopped));
        assert!(!Recording.can_transition_to(Idle));
        assert!(!Stopped.can_transition_to(Recording));
        assert!(!Error.can_transition_to(Recording));
        assert!(!Recording.can_transition_to(Recording));
    }

    #[test]
    fn cancel_during_initialization_is_legal() {
        assert!(Initializing.can_transition_to(Stopping));
        assert!(Stopping.can_transition_to(Stopped));
    }
}
