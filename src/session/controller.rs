// Session controller: owns the capture graph, the segment recorder, and the
// lifecycle state machine.
//
// One `AudioSession` serves one host for its lifetime; each call to
// `start()` builds a fresh pipeline (streams, mixer, recorder, meter,
// dispatcher) and teardown releases every resource before the session is
// reusable. All pipeline state lives in the per-start `ActiveSession`, never
// in globals.

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::audio::{
    concatenate_segments, negotiate_segment_mime, ClarityHint, MixerConfig, SegmentBlob,
    SegmentRecorder, SegmentSettings, StreamMixer, VolumeMeter, DEFAULT_SEGMENT_MIME,
};
use crate::capture::{acquire_streams, AudioFrame, CaptureProvider, StreamSource, TrackHandle};
use crate::config::PipelineConfig;
use crate::transcribe::{Transcriber, TranscriptionDispatcher};

use super::hooks::{SessionHooks, StateDetails};
use super::state::SessionState;
use super::stats::SessionStats;

/// How long teardown waits for a pipeline task before giving up on it.
const TEARDOWN_TASK_TIMEOUT: Duration = Duration::from_secs(5);

/// Live audio capture and segmented-transcription session controller.
#[derive(Clone)]
pub struct AudioSession {
    provider: Arc<dyn CaptureProvider>,
    transcriber: Arc<dyn Transcriber>,
    hooks: Arc<SessionHooks>,
    config: PipelineConfig,
    inner: Arc<Mutex<Inner>>,
}

#[derive(Default)]
struct Inner {
    state: SessionState,
    mic_muted: bool,
    active: Option<ActiveSession>,
}

/// Resources of the session currently underway.
struct ActiveSession {
    id: Uuid,
    started_at: DateTime<Utc>,
    stop_tx: watch::Sender<bool>,
    muted_flag: Arc<AtomicBool>,
    /// Microphone audio tracks, the mute targets
    mic_tracks: Vec<TrackHandle>,
    /// Every raw track acquired, display video included
    all_tracks: Vec<TrackHandle>,
    /// Append-only sequence of finalized segment blobs
    blobs: Arc<tokio::sync::Mutex<Vec<SegmentBlob>>>,
    segments_recorded: Arc<AtomicUsize>,
    chunks_delivered: Arc<AtomicUsize>,
    /// Pumps, mixer, meter, segment collector
    aux_tasks: Vec<JoinHandle<()>>,
    /// The recorder-driving task; runs teardown when the chain ends
    driver: Option<JoinHandle<()>>,
}

impl AudioSession {
    pub fn new(
        provider: Arc<dyn CaptureProvider>,
        transcriber: Arc<dyn Transcriber>,
        hooks: SessionHooks,
        config: PipelineConfig,
    ) -> Self {
        Self {
            provider,
            transcriber,
            hooks: Arc::new(hooks),
            config,
            inner: Arc::new(Mutex::new(Inner::default())),
        }
    }

    pub fn state(&self) -> SessionState {
        self.lock_inner().state
    }

    pub fn is_mic_muted(&self) -> bool {
        self.lock_inner().mic_muted
    }

    /// Begin a new session.
    ///
    /// Legal only from `Idle`, `Stopped`, or `Error`; anywhere else the call
    /// is logged and ignored. All runtime failures are reported through
    /// `on_state_change(Error, ..)`, never returned.
    pub async fn start(&self, language_hint: &str) {
        {
            let mut inner = self.lock_inner();
            if !inner.state.can_start() {
                warn!(state = %inner.state, "start() ignored: session already active");
                return;
            }
            inner.state = SessionState::Initializing;
            inner.mic_muted = false;
        }
        self.hooks
            .state_changed(SessionState::Initializing, StateDetails::default());
        self.hooks.mute_changed(false);

        let acquired = match acquire_streams(self.provider.as_ref()).await {
            Ok(acquired) => acquired,
            Err(err) => {
                error!("stream acquisition failed: {err:#}");
                self.transition(
                    SessionState::Error,
                    StateDetails::error(format!("Could not access audio devices: {err:#}")),
                );
                return;
            }
        };

        // stop() may have cancelled the session while devices were being
        // acquired; release everything we just opened and finish here, since
        // no pipeline exists to do it.
        if self.state() != SessionState::Initializing {
            info!("session cancelled during initialization, releasing acquired tracks");
            for track in &acquired.all_tracks {
                track.stop();
            }
            self.transition(SessionState::Stopped, StateDetails::finished(None));
            self.hooks.mute_changed(false);
            return;
        }

        let mime_type = match negotiate_segment_mime(&self.config.segment.preferred_mime_types) {
            Some(mime) => mime,
            None => {
                warn!(
                    "no preferred segment encoding supported, falling back to {}",
                    DEFAULT_SEGMENT_MIME
                );
                DEFAULT_SEGMENT_MIME.to_string()
            }
        };

        let session_id = Uuid::new_v4();
        info!(session = %session_id, %mime_type, language = language_hint, "starting session");

        let (stop_tx, stop_rx) = watch::channel(false);
        let muted_flag = Arc::new(AtomicBool::new(false));
        let blobs = Arc::new(tokio::sync::Mutex::new(Vec::new()));
        let segments_recorded = Arc::new(AtomicUsize::new(0));
        let chunks_delivered = Arc::new(AtomicUsize::new(0));
        let mut aux_tasks = Vec::new();

        let has_display_audio = acquired.display_frames.is_some();
        let (mixer_tx, mixer_rx) = mpsc::channel::<AudioFrame>(64);
        let (meter_tx, meter_rx) = mpsc::channel::<AudioFrame>(16);

        // Microphone pump: fans frames out to the mixer and the volume meter.
        {
            let mixer_tx = mixer_tx.clone();
            let mut mic_frames = acquired.mic_frames;
            aux_tasks.push(tokio::spawn(async move {
                while let Some(frame) = mic_frames.recv().await {
                    // The meter may lag behind; dropping samples is fine.
                    let _ = meter_tx.try_send(frame.clone());
                    if mixer_tx.send(frame).await.is_err() {
                        break;
                    }
                }
            }));
        }

        if let Some(mut display_frames) = acquired.display_frames {
            let mixer_tx = mixer_tx.clone();
            aux_tasks.push(tokio::spawn(async move {
                while let Some(frame) = display_frames.recv().await {
                    if mixer_tx.send(frame).await.is_err() {
                        break;
                    }
                }
            }));
        }
        drop(mixer_tx);

        let mut sources = vec![StreamSource::Microphone];
        if has_display_audio {
            sources.push(StreamSource::Display);
        }
        let (mixed_tx, mixed_rx) = mpsc::channel::<AudioFrame>(64);
        let mixer = StreamMixer::new(MixerConfig::new(
            self.config.audio.sample_rate,
            self.config.audio.channels,
            sources,
        ));
        aux_tasks.push(tokio::spawn(async move {
            if let Err(err) = mixer.run(mixer_rx, mixed_tx).await {
                warn!("stream mixer exited with error: {err:#}");
            }
        }));

        // Volume meter: microphone tap only, never the mixed stream.
        {
            let hooks = Arc::clone(&self.hooks);
            let muted = Arc::clone(&muted_flag);
            let mut meter = VolumeMeter::new(self.config.volume.clone());
            let mut meter_rx = meter_rx;
            aux_tasks.push(tokio::spawn(async move {
                while let Some(frame) = meter_rx.recv().await {
                    let (level, hint) = meter.sample(&frame, muted.load(Ordering::SeqCst));
                    hooks.volume_update(level, hint);
                }
            }));
        }

        // Segment collector: retains every finalized blob, then dispatches it
        // for transcription without holding up the chain.
        let dispatcher = TranscriptionDispatcher::new(
            Arc::clone(&self.transcriber),
            Arc::clone(&self.hooks),
            language_hint.to_string(),
            Arc::clone(&chunks_delivered),
        );
        let (segment_tx, mut segment_rx) = mpsc::channel::<SegmentBlob>(8);
        {
            let blobs = Arc::clone(&blobs);
            let segments_recorded = Arc::clone(&segments_recorded);
            aux_tasks.push(tokio::spawn(async move {
                while let Some(blob) = segment_rx.recv().await {
                    segments_recorded.fetch_add(1, Ordering::SeqCst);
                    blobs.lock().await.push(blob.clone());
                    dispatcher.dispatch(blob);
                }
            }));
        }

        {
            let mut inner = self.lock_inner();
            inner.active = Some(ActiveSession {
                id: session_id,
                started_at: Utc::now(),
                stop_tx,
                muted_flag,
                mic_tracks: acquired.mic_tracks,
                all_tracks: acquired.all_tracks,
                blobs,
                segments_recorded,
                chunks_delivered,
                aux_tasks,
                driver: None,
            });
        }

        // A stop() racing in right here moves the state to Stopping and this
        // transition is suppressed. If that stop() came before the pipeline
        // was installed it had no stop handle to signal, so re-send it.
        self.transition(SessionState::Recording, StateDetails::default());
        if self.state() == SessionState::Stopping {
            if let Some(active) = self.lock_inner().active.as_ref() {
                let _ = active.stop_tx.send(true);
            }
        }

        let recorder = SegmentRecorder::new(SegmentSettings {
            duration: self.config.segment.duration(),
            mime_type,
        });
        let session = self.clone();
        let driver = tokio::spawn(async move {
            match recorder.run(mixed_rx, stop_rx, segment_tx).await {
                Ok(()) => session.finish_session(None).await,
                Err(err) => {
                    error!("segment recorder failed: {err:#}");
                    session
                        .finish_session(Some(format!("Recording failed: {err}")))
                        .await;
                }
            }
        });

        if let Some(active) = self.lock_inner().active.as_mut() {
            active.driver = Some(driver);
        }
    }

    /// Request a graceful stop. Completion is reported via `on_state_change`
    /// once the in-flight segment has been flushed and teardown finished.
    pub fn stop(&self) {
        let mut inner = self.lock_inner();
        match inner.state {
            SessionState::Recording | SessionState::Initializing => {
                inner.state = SessionState::Stopping;
                let stop_tx = inner.active.as_ref().map(|a| a.stop_tx.clone());
                drop(inner);
                self.hooks
                    .state_changed(SessionState::Stopping, StateDetails::default());
                // During initialization there may be no pipeline to signal
                // yet; start() notices the state change, releases whatever it
                // acquired, and finishes the session itself.
                if let Some(stop_tx) = stop_tx {
                    let _ = stop_tx.send(true);
                }
            }
            state => {
                info!(%state, "stop() ignored: nothing to stop");
            }
        }
    }

    /// Toggle microphone mute. Valid only while recording; flips the enabled
    /// flag on the raw microphone tracks so they emit silence into the mix
    /// without disturbing the stream graph. Returns the new mute state.
    pub fn toggle_mute(&self) -> bool {
        let muted = {
            let mut inner = self.lock_inner();
            if inner.state != SessionState::Recording {
                warn!(state = %inner.state, "toggle_mute() ignored: not recording");
                return inner.mic_muted;
            }
            if inner.active.is_none() {
                warn!("toggle_mute() ignored: no active pipeline");
                return inner.mic_muted;
            }
            inner.mic_muted = !inner.mic_muted;
            let muted = inner.mic_muted;
            if let Some(active) = inner.active.as_ref() {
                active.muted_flag.store(muted, Ordering::SeqCst);
                for track in &active.mic_tracks {
                    track.set_enabled(!muted);
                }
            }
            muted
        };

        debug!(muted, "microphone mute toggled");
        self.hooks.mute_changed(muted);
        if muted {
            // The indicator drops to zero right away instead of waiting for
            // the next meter sample.
            self.hooks.volume_update(0.0, ClarityHint::Normal);
        }
        muted
    }

    /// Current session statistics.
    pub fn stats(&self) -> SessionStats {
        let inner = self.lock_inner();
        match &inner.active {
            Some(active) => SessionStats {
                is_recording: inner.state == SessionState::Recording,
                started_at: Some(active.started_at),
                duration_secs: (Utc::now() - active.started_at).num_milliseconds() as f64 / 1000.0,
                segments_recorded: active.segments_recorded.load(Ordering::SeqCst),
                transcript_chunks: active.chunks_delivered.load(Ordering::SeqCst),
            },
            None => SessionStats::inactive(),
        }
    }

    /// Forceful teardown regardless of state, for host unmount. Resolves once
    /// teardown has fully completed and the session is reusable.
    pub async fn cleanup(&self) {
        let driver = {
            let mut inner = self.lock_inner();
            inner.active.as_mut().and_then(|a| a.driver.take())
        };

        if self.state().is_active() {
            self.stop();
        } else {
            debug!("cleanup(): no active session");
        }

        if let Some(driver) = driver {
            match tokio::time::timeout(Duration::from_secs(10), driver).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => warn!("session driver ended abnormally: {err}"),
                Err(_) => warn!("session driver did not finish teardown in time"),
            }
        }

        // start() may still be mid-acquisition with no driver installed; it
        // finishes the teardown itself once it notices the stop. Wait for
        // that before reporting the session reusable.
        let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
        while self.state().is_active() {
            if tokio::time::Instant::now() >= deadline {
                warn!("cleanup timed out waiting for teardown to complete");
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Tear the active session down. Runs on every exit path (normal stop,
    /// initialization failure, mid-recording error, forced cleanup) and is
    /// idempotent: a second call finds no active session and does nothing.
    async fn finish_session(&self, fatal: Option<String>) {
        let active = { self.lock_inner().active.take() };
        let Some(mut active) = active else {
            debug!("teardown requested with no active session, nothing to do");
            return;
        };

        if let Some(message) = &fatal {
            self.transition(SessionState::Error, StateDetails::error(message.clone()));
        }

        // Cancel any pending segment deadline and stop every raw track,
        // display video included, so capture indicators are released.
        let _ = active.stop_tx.send(true);
        for track in &active.all_tracks {
            debug!(track = track.label(), "stopping capture track");
            track.stop();
        }

        // Pipeline tasks drain on their own once the tracks stop and their
        // channels close; give them a bounded window.
        for task in active.aux_tasks.drain(..) {
            match tokio::time::timeout(TEARDOWN_TASK_TIMEOUT, task).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) if err.is_panic() => {
                    warn!("pipeline task panicked during teardown: {err}");
                }
                Ok(Err(_)) => {}
                Err(_) => warn!(
                    "pipeline task did not shut down within {:?}",
                    TEARDOWN_TASK_TIMEOUT
                ),
            }
        }

        let artifact = {
            let blobs = active.blobs.lock().await;
            match concatenate_segments(&blobs) {
                Ok(artifact) => artifact,
                Err(err) => {
                    warn!("failed to assemble final audio artifact: {err:#}");
                    None
                }
            }
        };

        // The volume indicator returns to its rest state.
        self.hooks.volume_update(0.0, ClarityHint::Normal);

        // Mute is session-scoped: always reset on teardown.
        self.lock_inner().mic_muted = false;
        active.muted_flag.store(false, Ordering::SeqCst);
        self.hooks.mute_changed(false);

        if fatal.is_some() || self.state() == SessionState::Error {
            // Stay in Error; re-affirm it with whatever audio was salvaged.
            let message =
                fatal.unwrap_or_else(|| "recording stopped after an earlier error".to_string());
            self.hooks.state_changed(
                SessionState::Error,
                StateDetails {
                    error_message: Some(message),
                    final_audio: artifact,
                },
            );
        } else {
            self.transition(SessionState::Stopped, StateDetails::finished(artifact));
        }

        info!(session = %active.id, "session teardown complete");
    }

    /// Apply a state transition, suppressing anything the legality relation
    /// rejects, and notify the host.
    fn transition(&self, next: SessionState, details: StateDetails) {
        {
            let mut inner = self.lock_inner();
            if !inner.state.can_transition_to(next) {
                warn!(from = %inner.state, to = %next, "illegal state transition suppressed");
                return;
            }
            inner.state = next;
        }
        self.hooks.state_changed(next, details);
    }

    fn lock_inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for AudioSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioSession")
            .field("state", &self.state())
            .field("provider", &self.provider.name())
            .field("transcriber", &self.transcriber.name())
            .finish()
    }
}
