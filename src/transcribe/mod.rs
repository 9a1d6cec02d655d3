pub mod http;

use anyhow::Result;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::audio::SegmentBlob;
use crate::session::SessionHooks;

pub use http::{HttpTranscriber, HttpTranscriberConfig};

/// Remote speech-to-text call, treated as opaque.
///
/// Implementations receive base64-encoded container bytes, the container MIME
/// type, and a BCP-47 language hint, and return the transcribed text. They
/// may fail; the dispatcher swallows every failure.
#[async_trait::async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(
        &self,
        audio_base64: &str,
        mime_type: &str,
        language_hint: &str,
    ) -> Result<String>;

    /// Backend name for logging
    fn name(&self) -> &str;
}

/// Transcriber that produces no text; used for dry runs without a backend.
pub struct NoopTranscriber;

#[async_trait::async_trait]
impl Transcriber for NoopTranscriber {
    async fn transcribe(&self, _audio: &str, _mime: &str, _language: &str) -> Result<String> {
        Ok(String::new())
    }

    fn name(&self) -> &str {
        "noop"
    }
}

/// Fire-and-forget submission of finalized segments to the transcriber.
///
/// Each dispatch spawns an independent task, so recording cadence never
/// waits on transcription latency and several calls may be in flight at
/// once. Dispatch order is recording order; delivery order of the resulting
/// text chunks is not guaranteed under variable latency, which is an
/// accepted limitation. Failures are logged and the chunk is dropped, the
/// segment's audio having already been retained for the final artifact.
pub struct TranscriptionDispatcher {
    transcriber: Arc<dyn Transcriber>,
    hooks: Arc<SessionHooks>,
    language_hint: String,
    chunks_delivered: Arc<AtomicUsize>,
}

impl TranscriptionDispatcher {
    pub fn new(
        transcriber: Arc<dyn Transcriber>,
        hooks: Arc<SessionHooks>,
        language_hint: String,
        chunks_delivered: Arc<AtomicUsize>,
    ) -> Self {
        Self {
            transcriber,
            hooks,
            language_hint,
            chunks_delivered,
        }
    }

    /// Submit one finalized segment. Never blocks, never fails the session.
    pub fn dispatch(&self, blob: SegmentBlob) {
        let transcriber = Arc::clone(&self.transcriber);
        let hooks = Arc::clone(&self.hooks);
        let chunks_delivered = Arc::clone(&self.chunks_delivered);
        let language_hint = self.language_hint.clone();

        tokio::spawn(async move {
            let sequence = blob.sequence;
            let bytes = match blob.encode() {
                Ok(bytes) => bytes,
                Err(err) => {
                    warn!("segment {sequence}: failed to encode audio for transcription: {err:#}");
                    return;
                }
            };
            let payload = BASE64.encode(bytes);

            match transcriber
                .transcribe(&payload, &blob.mime_type, &language_hint)
                .await
            {
                Ok(text) => {
                    let text = text.trim();
                    if text.is_empty() {
                        debug!("segment {sequence}: empty transcription, nothing to deliver");
                    } else {
                        chunks_delivered.fetch_add(1, Ordering::SeqCst);
                        hooks.transcript_chunk(text.to_string());
                    }
                }
                Err(err) => {
                    warn!("segment {sequence}: transcription failed, dropping chunk: {err:#}");
                }
            }
        });
    }
}
