// End-to-end session lifecycle tests against the synthetic capture provider.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{bail, Result};
use tokio::sync::mpsc;

use segscribe::capture::{AudioFrame, CaptureProvider, CaptureStream, DisplayRequest, TrackHandle, TrackKind};
use segscribe::capture::{StreamSource, SyntheticProvider};
use segscribe::config::PipelineConfig;
use segscribe::session::{AudioSession, SessionHooks, SessionState, StateDetails};
use segscribe::transcribe::{NoopTranscriber, Transcriber};
use segscribe::AudioArtifact;

#[derive(Debug, Clone, PartialEq)]
enum Event {
    State(SessionState),
    Mute(bool),
    Chunk(String),
}

struct Harness {
    events: Arc<Mutex<Vec<Event>>>,
    volume_updates: Arc<AtomicUsize>,
    terminal_rx: mpsc::UnboundedReceiver<(SessionState, StateDetails)>,
}

impl Harness {
    /// Hooks that record every observation and forward terminal states.
    fn hooks() -> (SessionHooks, Harness) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let volume_updates = Arc::new(AtomicUsize::new(0));
        let (terminal_tx, terminal_rx) = mpsc::unbounded_channel();

        let hooks = SessionHooks::new()
            .on_state_change({
                let events = Arc::clone(&events);
                move |state, details| {
                    events.lock().unwrap().push(Event::State(state));
                    if matches!(state, SessionState::Stopped | SessionState::Error) {
                        let _ = terminal_tx.send((state, details));
                    }
                }
            })
            .on_transcript_chunk({
                let events = Arc::clone(&events);
                move |text| events.lock().unwrap().push(Event::Chunk(text))
            })
            .on_volume_update({
                let volume_updates = Arc::clone(&volume_updates);
                move |_, _| {
                    volume_updates.fetch_add(1, Ordering::SeqCst);
                }
            })
            .on_mute_change({
                let events = Arc::clone(&events);
                move |muted| events.lock().unwrap().push(Event::Mute(muted))
            });

        (
            hooks,
            Harness {
                events,
                volume_updates,
                terminal_rx,
            },
        )
    }

    async fn wait_terminal(&mut self) -> (SessionState, StateDetails) {
        tokio::time::timeout(Duration::from_secs(5), self.terminal_rx.recv())
            .await
            .expect("timed out waiting for a terminal state")
            .expect("terminal channel closed")
    }

    fn states(&self) -> Vec<SessionState> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                Event::State(s) => Some(*s),
                _ => None,
            })
            .collect()
    }

    fn mute_events(&self) -> Vec<bool> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                Event::Mute(m) => Some(*m),
                _ => None,
            })
            .collect()
    }

    fn chunks(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                Event::Chunk(c) => Some(c.clone()),
                _ => None,
            })
            .collect()
    }
}

/// Fast-running config: 20ms frames, 150ms segments.
fn test_config() -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.audio.frame_duration_ms = 20;
    config.segment.duration_ms = 150;
    config
}

fn synthetic_session(
    transcriber: Arc<dyn Transcriber>,
) -> (AudioSession, Harness) {
    let config = test_config();
    let provider = Arc::new(SyntheticProvider::new(config.audio.clone()));
    let (hooks, harness) = Harness::hooks();
    (
        AudioSession::new(provider, transcriber, hooks, config),
        harness,
    )
}

/// Provider whose microphone is unavailable.
struct DeniedProvider;

#[async_trait::async_trait]
impl CaptureProvider for DeniedProvider {
    async fn open_microphone(&self) -> Result<CaptureStream> {
        bail!("permission denied")
    }

    async fn open_display(&self, _request: DisplayRequest) -> Result<CaptureStream> {
        bail!("permission denied")
    }

    fn name(&self) -> &str {
        "denied"
    }
}

/// Provider that opens healthy tracks but never delivers a frame.
struct StalledProvider;

impl StalledProvider {
    fn idle_stream(source: StreamSource, label: &str) -> CaptureStream {
        let track = TrackHandle::new(label, TrackKind::Audio, source);
        let (tx, rx) = mpsc::channel(4);
        let watched = track.clone();
        tokio::spawn(async move {
            // Hold the sender open until the track is stopped.
            while watched.is_live() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            drop(tx);
        });
        CaptureStream {
            frames: Some(rx),
            tracks: vec![track],
        }
    }
}

#[async_trait::async_trait]
impl CaptureProvider for StalledProvider {
    async fn open_microphone(&self) -> Result<CaptureStream> {
        Ok(Self::idle_stream(StreamSource::Microphone, "stalled-mic"))
    }

    async fn open_display(&self, _request: DisplayRequest) -> Result<CaptureStream> {
        // Video-only share: no audio frames from the display.
        Ok(CaptureStream {
            frames: None,
            tracks: vec![TrackHandle::new(
                "stalled-display-video",
                TrackKind::Video,
                StreamSource::Display,
            )],
        })
    }

    fn name(&self) -> &str {
        "stalled"
    }
}

/// Provider whose microphone delivers a few frames and then dies: the frame
/// sender drops while the track is still live, as when a device vanishes.
struct DyingProvider;

#[async_trait::async_trait]
impl CaptureProvider for DyingProvider {
    async fn open_microphone(&self) -> Result<CaptureStream> {
        let track = TrackHandle::new("dying-mic", TrackKind::Audio, StreamSource::Microphone);
        let (tx, rx) = mpsc::channel(8);
        tokio::spawn(async move {
            for i in 0..3u64 {
                let frame = AudioFrame {
                    samples: vec![100; 320],
                    sample_rate: 16000,
                    channels: 1,
                    timestamp_ms: i * 20,
                    source: StreamSource::Microphone,
                };
                if tx.send(frame).await.is_err() {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
            // Sender drops here; the track was never stopped.
        });
        Ok(CaptureStream {
            frames: Some(rx),
            tracks: vec![track],
        })
    }

    async fn open_display(&self, _request: DisplayRequest) -> Result<CaptureStream> {
        Ok(CaptureStream {
            frames: None,
            tracks: vec![TrackHandle::new(
                "dying-display-video",
                TrackKind::Video,
                StreamSource::Display,
            )],
        })
    }

    fn name(&self) -> &str {
        "dying"
    }
}

/// Provider that takes a while to open the microphone.
struct SlowProvider;

#[async_trait::async_trait]
impl CaptureProvider for SlowProvider {
    async fn open_microphone(&self) -> Result<CaptureStream> {
        tokio::time::sleep(Duration::from_millis(200)).await;
        Ok(StalledProvider::idle_stream(
            StreamSource::Microphone,
            "slow-mic",
        ))
    }

    async fn open_display(&self, request: DisplayRequest) -> Result<CaptureStream> {
        StalledProvider.open_display(request).await
    }

    fn name(&self) -> &str {
        "slow"
    }
}

/// Transcriber that fails its first call and labels later ones.
struct FlakyTranscriber {
    calls: AtomicUsize,
}

#[async_trait::async_trait]
impl Transcriber for FlakyTranscriber {
    async fn transcribe(&self, _audio: &str, _mime: &str, _language: &str) -> Result<String> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call == 0 {
            bail!("backend unavailable");
        }
        Ok(format!("chunk {call}"))
    }

    fn name(&self) -> &str {
        "flaky"
    }
}

/// Transcriber that always produces text.
struct EchoTranscriber;

#[async_trait::async_trait]
impl Transcriber for EchoTranscriber {
    async fn transcribe(&self, _audio: &str, mime: &str, _language: &str) -> Result<String> {
        Ok(format!("heard {mime}"))
    }

    fn name(&self) -> &str {
        "echo"
    }
}

#[tokio::test]
async fn happy_path_records_transcribes_and_finishes() {
    let (session, mut harness) = synthetic_session(Arc::new(EchoTranscriber));

    session.start("en").await;
    assert_eq!(session.state(), SessionState::Recording);

    // Let a few segments finalize.
    tokio::time::sleep(Duration::from_millis(500)).await;
    let stats = session.stats();
    assert!(stats.is_recording);
    assert!(
        stats.segments_recorded >= 2,
        "expected several segments, got {}",
        stats.segments_recorded
    );

    session.stop();
    let (state, details) = harness.wait_terminal().await;

    assert_eq!(state, SessionState::Stopped);
    let artifact: AudioArtifact = details.final_audio.expect("final audio present");
    assert!(artifact.segment_count >= 2);
    assert!(artifact.duration_ms > 0);
    assert!(artifact.len() > 44, "artifact must hold more than a header");

    assert_eq!(
        harness.states(),
        vec![
            SessionState::Initializing,
            SessionState::Recording,
            SessionState::Stopping,
            SessionState::Stopped,
        ]
    );
    assert!(!harness.chunks().is_empty(), "transcript chunks delivered");
    assert!(harness.volume_updates.load(Ordering::SeqCst) > 0);
    assert_eq!(session.state(), SessionState::Stopped);
}

#[tokio::test]
async fn acquisition_failure_reports_error_and_allows_retry() {
    let config = test_config();
    let (hooks, mut harness) = Harness::hooks();
    let session = AudioSession::new(
        Arc::new(DeniedProvider),
        Arc::new(NoopTranscriber),
        hooks,
        config,
    );

    session.start("en").await;
    let (state, details) = harness.wait_terminal().await;

    assert_eq!(state, SessionState::Error);
    let message = details.error_message.expect("error carries a message");
    assert!(message.contains("audio devices"), "got: {message}");
    assert!(harness.chunks().is_empty());
    assert!(session.state().can_start());

    // A retry is allowed and goes through Initializing again.
    session.start("en").await;
    let (state, _) = harness.wait_terminal().await;
    assert_eq!(state, SessionState::Error);
    let inits = harness
        .states()
        .iter()
        .filter(|s| **s == SessionState::Initializing)
        .count();
    assert_eq!(inits, 2);
}

#[tokio::test]
async fn mute_cycle_keeps_recording_and_resets_on_stop() {
    let (session, mut harness) = synthetic_session(Arc::new(NoopTranscriber));

    session.start("en").await;
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert!(session.toggle_mute(), "first toggle mutes");
    assert!(session.is_mic_muted());
    assert_eq!(session.state(), SessionState::Recording, "mute never stops recording");

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!session.toggle_mute(), "second toggle unmutes");
    tokio::time::sleep(Duration::from_millis(200)).await;

    session.stop();
    let (state, details) = harness.wait_terminal().await;
    assert_eq!(state, SessionState::Stopped);
    assert!(details.final_audio.is_some(), "muted stretches still produce audio");
    assert!(!session.is_mic_muted(), "mute state is session-scoped");

    // start(false), muted, unmuted, teardown reset.
    assert_eq!(harness.mute_events(), vec![false, true, false, false]);
}

#[tokio::test]
async fn mute_is_ignored_outside_recording() {
    let (session, _harness) = synthetic_session(Arc::new(NoopTranscriber));
    assert!(!session.toggle_mute());
    assert_eq!(session.state(), SessionState::Idle);
}

#[tokio::test]
async fn stop_without_a_session_is_ignored() {
    let (session, harness) = synthetic_session(Arc::new(NoopTranscriber));
    session.stop();
    assert_eq!(session.state(), SessionState::Idle);
    assert!(harness.states().is_empty());
}

#[tokio::test]
async fn transcription_failure_never_interrupts_recording() {
    let (session, mut harness) = synthetic_session(Arc::new(FlakyTranscriber {
        calls: AtomicUsize::new(0),
    }));

    session.start("en").await;
    tokio::time::sleep(Duration::from_millis(600)).await;
    session.stop();

    let (state, details) = harness.wait_terminal().await;
    assert_eq!(state, SessionState::Stopped, "failed dispatch must not kill the session");

    // The failed segment's audio is still in the artifact.
    let artifact = details.final_audio.expect("artifact");
    assert!(artifact.segment_count >= 2);
    // Later segments still produced chunks.
    assert!(!harness.chunks().is_empty());
}

#[tokio::test]
async fn capture_death_mid_recording_is_fatal_and_allows_restart() {
    let config = test_config();
    let (hooks, mut harness) = Harness::hooks();
    let session = AudioSession::new(
        Arc::new(DyingProvider),
        Arc::new(NoopTranscriber),
        hooks,
        config,
    );

    session.start("en").await;
    assert_eq!(session.state(), SessionState::Recording);

    // The capture stream dies after a few frames with no stop requested.
    let (state, details) = harness.wait_terminal().await;
    assert_eq!(state, SessionState::Error);
    let message = details.error_message.expect("fatal error carries a message");
    assert!(message.contains("Recording failed"), "got: {message}");

    // Teardown re-affirms the error once resources are released.
    let (state, _) = harness.wait_terminal().await;
    assert_eq!(state, SessionState::Error);
    assert_eq!(session.state(), SessionState::Error);
    assert!(session.state().can_start(), "failed session must be restartable");

    // A fresh start goes through Initializing and records again.
    session.start("en").await;
    assert_eq!(session.state(), SessionState::Recording);
    let (state, _) = harness.wait_terminal().await;
    assert_eq!(state, SessionState::Error);
}

#[tokio::test]
async fn cleanup_during_initialization_completes_teardown() {
    let config = test_config();
    let (hooks, mut harness) = Harness::hooks();
    let session = AudioSession::new(
        Arc::new(SlowProvider),
        Arc::new(NoopTranscriber),
        hooks,
        config,
    );

    let starter = {
        let session = session.clone();
        tokio::spawn(async move { session.start("en").await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(session.state(), SessionState::Initializing);

    // cleanup() resolves only after start() has finished the teardown.
    session.cleanup().await;
    assert!(!session.state().is_active());

    let (state, details) = harness.wait_terminal().await;
    assert_eq!(state, SessionState::Stopped);
    assert!(details.final_audio.is_none());
    starter.await.unwrap();
}

#[tokio::test]
async fn session_with_no_audio_finishes_without_artifact() {
    let config = test_config();
    let (hooks, mut harness) = Harness::hooks();
    let session = AudioSession::new(
        Arc::new(StalledProvider),
        Arc::new(NoopTranscriber),
        hooks,
        config,
    );

    session.start("en").await;
    assert_eq!(session.state(), SessionState::Recording);
    tokio::time::sleep(Duration::from_millis(100)).await;
    session.stop();

    let (state, details) = harness.wait_terminal().await;
    assert_eq!(state, SessionState::Stopped);
    assert!(details.final_audio.is_none(), "no frames means no artifact");
}

#[tokio::test]
async fn cleanup_tears_down_and_is_idempotent() {
    let (session, mut harness) = synthetic_session(Arc::new(NoopTranscriber));

    session.start("en").await;
    tokio::time::sleep(Duration::from_millis(200)).await;

    session.cleanup().await;
    let (state, _) = harness.wait_terminal().await;
    assert_eq!(state, SessionState::Stopped);
    assert_eq!(session.state(), SessionState::Stopped);

    // A second cleanup finds nothing to do.
    session.cleanup().await;
    assert_eq!(session.state(), SessionState::Stopped);

    // And the session object is reusable afterwards.
    session.start("en").await;
    assert_eq!(session.state(), SessionState::Recording);
    session.stop();
    let (state, _) = harness.wait_terminal().await;
    assert_eq!(state, SessionState::Stopped);
}

#[tokio::test]
async fn stats_reset_when_no_session_is_active() {
    let (session, mut harness) = synthetic_session(Arc::new(NoopTranscriber));

    let idle_stats = session.stats();
    assert!(!idle_stats.is_recording);
    assert!(idle_stats.started_at.is_none());

    session.start("en").await;
    let active_stats = session.stats();
    assert!(active_stats.is_recording);
    assert!(active_stats.started_at.is_some());

    session.stop();
    harness.wait_terminal().await;
    assert!(!session.stats().is_recording);
}
