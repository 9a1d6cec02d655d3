//! Walkthrough of a full session lifecycle against the synthetic capture
//! provider: start, watch volume updates, mute and unmute mid-recording,
//! stop, and collect the final audio artifact.
//!
//! Run with `cargo run --example live_session`.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::mpsc;

use segscribe::config::PipelineConfig;
use segscribe::session::{AudioSession, SessionHooks, SessionState};
use segscribe::transcribe::NoopTranscriber;
use segscribe::{AudioArtifact, ClarityHint, SyntheticProvider};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    // Short segments so the demo produces several of them quickly.
    let mut config = PipelineConfig::default();
    config.segment.duration_ms = 1000;

    let (done_tx, mut done_rx) = mpsc::unbounded_channel::<Option<AudioArtifact>>();
    let hooks = SessionHooks::new()
        .on_state_change(move |state, details| {
            println!("state -> {state}");
            if let Some(message) = &details.error_message {
                println!("  error: {message}");
            }
            if matches!(state, SessionState::Stopped | SessionState::Error) {
                let _ = done_tx.send(details.final_audio);
            }
        })
        .on_transcript_chunk(|text| println!("transcript: {text}"))
        .on_volume_update(|level, hint| {
            if hint == ClarityHint::Low {
                println!("volume {level:5.1} (low - speak up?)");
            }
        })
        .on_mute_change(|muted| println!("mic muted: {muted}"));

    let provider = Arc::new(SyntheticProvider::new(config.audio.clone()));
    let session = AudioSession::new(provider, Arc::new(NoopTranscriber), hooks, config);

    session.start("en").await;

    // Record normally for a while, then mute for one segment's worth of time.
    tokio::time::sleep(Duration::from_millis(1500)).await;
    session.toggle_mute();
    tokio::time::sleep(Duration::from_millis(1000)).await;
    session.toggle_mute();
    tokio::time::sleep(Duration::from_millis(1500)).await;

    let stats = session.stats();
    println!(
        "stopping after {:.1}s, {} segments so far",
        stats.duration_secs, stats.segments_recorded
    );
    session.stop();

    let artifact = done_rx
        .recv()
        .await
        .context("no terminal state notification")?;
    match artifact {
        Some(artifact) => println!(
            "final artifact: {} bytes, {}ms across {} segments",
            artifact.len(),
            artifact.duration_ms,
            artifact.segment_count
        ),
        None => println!("no audio recorded"),
    }

    session.cleanup().await;
    Ok(())
}
