pub mod controller;
pub mod hooks;
pub mod state;
pub mod stats;

pub use controller::AudioSession;
pub use hooks::{SessionHooks, StateDetails};
pub use state::SessionState;
pub use stats::SessionStats;
