use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};

use segscribe::config::PipelineConfig;
use segscribe::session::{AudioSession, SessionHooks, SessionState};
use segscribe::transcribe::{HttpTranscriber, HttpTranscriberConfig, NoopTranscriber, Transcriber};
use segscribe::{AudioArtifact, ClarityHint, SyntheticProvider};

/// Record a timed capture session and write the accumulated audio to disk.
#[derive(Parser, Debug)]
#[command(name = "segscribe", version, about)]
struct Args {
    /// Path to a TOML config file
    #[arg(short, long)]
    config: Option<String>,

    /// BCP-47 language hint passed to the transcriber
    #[arg(short, long, default_value = "en")]
    language: String,

    /// How long to record before stopping, in seconds
    #[arg(short, long, default_value_t = 12)]
    duration_secs: u64,

    /// Where to write the final audio artifact
    #[arg(short, long, default_value = "session.wav")]
    output: PathBuf,

    /// Transcription endpoint URL (overrides the config file)
    #[arg(short, long)]
    endpoint: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => PipelineConfig::load(path)
            .with_context(|| format!("failed to load config from {path}"))?,
        None => PipelineConfig::default(),
    };
    if args.endpoint.is_some() {
        config.transcription.endpoint = args.endpoint.clone();
    }

    let transcriber: Arc<dyn Transcriber> = match HttpTranscriberConfig::from_pipeline(
        &config.transcription,
    ) {
        Ok(http_config) => {
            info!(endpoint = %http_config.endpoint, "transcription enabled");
            Arc::new(HttpTranscriber::new(http_config)?)
        }
        Err(_) => {
            info!("no transcription endpoint configured, recording audio only");
            Arc::new(NoopTranscriber)
        }
    };

    // The terminal state change carries the final artifact; forward it out of
    // the hook so main can await it.
    let (done_tx, mut done_rx) = mpsc::unbounded_channel::<(SessionState, Option<AudioArtifact>)>();
    let hooks = SessionHooks::new()
        .on_state_change(move |state, details| {
            if let Some(message) = &details.error_message {
                warn!(%state, "session error: {message}");
            } else {
                info!(%state, "session state changed");
            }
            if matches!(state, SessionState::Stopped | SessionState::Error) {
                let _ = done_tx.send((state, details.final_audio));
            }
        })
        .on_transcript_chunk(|text| {
            println!("{text}");
        })
        .on_volume_update(|level, hint| {
            if hint == ClarityHint::Low {
                warn!(level, "microphone volume is low, consider moving closer");
            }
        })
        .on_mute_change(|muted| {
            info!(muted, "microphone mute changed");
        });

    let provider = Arc::new(SyntheticProvider::new(config.audio.clone()));
    let session = AudioSession::new(provider, transcriber, hooks, config);

    session.start(&args.language).await;
    if !session.state().is_active() {
        anyhow::bail!("session failed to start");
    }

    tokio::select! {
        _ = tokio::time::sleep(Duration::from_secs(args.duration_secs)) => {
            info!("recording window elapsed, stopping");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("interrupted, stopping");
        }
    }
    let stats = session.stats();
    session.stop();

    let (state, artifact) = done_rx
        .recv()
        .await
        .context("session ended without a terminal state notification")?;

    info!(
        segments = stats.segments_recorded,
        chunks = stats.transcript_chunks,
        "session finished in state {state}"
    );

    match artifact {
        Some(artifact) => {
            artifact.save(&args.output)?;
            info!(
                path = %args.output.display(),
                bytes = artifact.data.len(),
                duration_ms = artifact.duration_ms,
                "final audio written"
            );
        }
        None => warn!("session produced no audio"),
    }

    session.cleanup().await;
    Ok(())
}
