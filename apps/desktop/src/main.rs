use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::Parser;
use client_core::{
    ControllerEvent, HttpBackend, PermissionGate, VoiceSettings, WorkoutController,
    WorkoutDependencies, WorkoutPhase, WorkoutPlan, WorkoutSnapshot,
};
use shared::domain::{UserId, Voice};
use tokio::sync::{broadcast, watch};
use tokio_stream::{
    wrappers::{errors::BroadcastStreamRecvError, BroadcastStream, WatchStream},
    StreamExt,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(about = "Terminal boxing trainer")]
struct Args {
    #[arg(long, default_value = "http://127.0.0.1:8001")]
    server_url: String,
    #[arg(long, default_value = "local-trainee")]
    user_id: String,
    #[arg(long, default_value_t = Voice::Alloy)]
    voice: Voice,
    #[arg(long, default_value_t = 1.0)]
    speed: f64,
    /// Generate moves locally and skip the server entirely.
    #[arg(long)]
    offline: bool,
    #[arg(long)]
    round_seconds: Option<u32>,
    #[arg(long)]
    break_seconds: Option<u32>,
    #[arg(long)]
    seed: Option<u64>,
    /// Where synthesised clips are written.
    #[arg(long, default_value = "./data/audio")]
    audio_dir: PathBuf,
}

/// Grants audio when the clip directory can be created and written to.
struct AudioDirGate {
    dir: PathBuf,
}

#[async_trait]
impl PermissionGate for AudioDirGate {
    async fn request_audio_permission(&self) -> Result<bool> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("failed to create audio dir '{}'", self.dir.display()))?;
        let probe = self.dir.join(".write-probe");
        match tokio::fs::write(&probe, b"ok").await {
            Ok(()) => {
                let _ = tokio::fs::remove_file(&probe).await;
                Ok(true)
            }
            Err(err) => {
                warn!(dir = %self.dir.display(), error = %err, "audio dir is not writable");
                Ok(false)
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let args = Args::parse();

    let deps = dependencies(&args)?;
    let controller = WorkoutController::new(
        deps,
        plan_from(&args),
        VoiceSettings {
            voice: args.voice,
            speed: args.speed,
        },
    );

    let events = controller.subscribe_events();
    let state = controller.watch_state();
    let printer = tokio::spawn(print_events(events, args.audio_dir.clone()));
    let status = tokio::spawn(print_status(state));

    controller.start(UserId(args.user_id.clone())).await?;
    println!("Workout started for {}. Press Ctrl-C to stop.", args.user_id);

    let summary = tokio::select! {
        summary = controller.finished() => summary,
        _ = tokio::signal::ctrl_c() => {
            println!("Stopping workout...");
            controller.cancel().await
        }
    };

    status.abort();
    drop(controller);
    let _ = printer.await;

    if let Some(summary) = summary {
        let session = &summary.session;
        println!(
            "Session {}: {:?}, {}/{} rounds, intensity {:?}",
            session.id,
            summary.phase,
            session.rounds_completed,
            session.total_rounds,
            session.intensity_progression
        );
    }
    Ok(())
}

fn dependencies(args: &Args) -> Result<WorkoutDependencies> {
    let gate = Arc::new(AudioDirGate {
        dir: args.audio_dir.clone(),
    });
    if args.offline {
        info!("running offline with local move generation");
        return Ok(WorkoutDependencies {
            permission: gate,
            ..WorkoutDependencies::offline(args.seed)
        });
    }

    let backend = Arc::new(HttpBackend::new(&args.server_url)?);
    info!(server = %backend.base_url(), "using workout server");
    Ok(WorkoutDependencies {
        moves: backend.clone(),
        recorder: backend.clone(),
        speech: backend,
        permission: gate,
    })
}

fn plan_from(args: &Args) -> WorkoutPlan {
    let mut plan = WorkoutPlan::default();
    if let Some(secs) = args.round_seconds {
        plan.round_secs = secs;
    }
    if let Some(secs) = args.break_seconds {
        plan.break_secs = secs;
    }
    plan
}

async fn print_events(events: broadcast::Receiver<ControllerEvent>, audio_dir: PathBuf) {
    let mut events = BroadcastStream::new(events);
    let mut clip_index = 0usize;
    while let Some(event) = events.next().await {
        let event = match event {
            Ok(event) => event,
            Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                warn!(skipped, "event printer fell behind");
                continue;
            }
        };
        match event {
            ControllerEvent::PhaseChanged { phase, round } => match phase {
                WorkoutPhase::RoundActive => println!("== Round {round} =="),
                WorkoutPhase::BreakActive => println!("== Break after round {round} =="),
                WorkoutPhase::Complete => println!("== Workout complete =="),
                WorkoutPhase::Idle => println!("== Workout stopped =="),
            },
            ControllerEvent::Announcement(text) => println!("  >> {text}"),
            ControllerEvent::MoveCalled(command) => println!(
                "  [{:.1}/{:.1}] {} ({} ms)",
                command.complexity_score,
                command.intensity_score,
                command.command,
                command.duration_ms
            ),
            ControllerEvent::ComplexityRaised { complexity, .. } => {
                println!("  complexity up to {complexity:.1}")
            }
            ControllerEvent::SpeechReady(clip) => {
                clip_index += 1;
                let path = clip_path(&audio_dir, clip_index, &clip.text);
                if let Err(err) = tokio::fs::write(&path, &clip.audio).await {
                    warn!(path = %path.display(), error = %err, "failed to save clip");
                }
            }
            ControllerEvent::SessionStarted(id) => info!(session_id = %id, "session recorded"),
            ControllerEvent::RoundRecorded { round, .. } => info!(round, "round recorded"),
            ControllerEvent::Error(err) => warn!(error = %err, "workout degraded"),
        }
    }
}

async fn print_status(state: watch::Receiver<WorkoutSnapshot>) {
    let mut snapshots = WatchStream::from_changes(state);
    while let Some(snapshot) = snapshots.next().await {
        if let Some(line) = status_line(&snapshot) {
            println!("{line}");
        }
    }
}

/// One line every 30 seconds of the countdown.
fn status_line(snapshot: &WorkoutSnapshot) -> Option<String> {
    let remaining = snapshot.round.seconds_remaining;
    if remaining == 0 || remaining % 30 != 0 {
        return None;
    }
    let label = match snapshot.phase {
        WorkoutPhase::RoundActive => "round",
        WorkoutPhase::BreakActive => "break",
        WorkoutPhase::Idle | WorkoutPhase::Complete => return None,
    };
    Some(format!(
        "  {label} {} {:02}:{:02} left",
        snapshot.round.round,
        remaining / 60,
        remaining % 60
    ))
}

fn clip_path(dir: &Path, index: usize, text: &str) -> PathBuf {
    let slug: String = text
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
        .collect::<String>()
        .split('-')
        .filter(|part| !part.is_empty())
        .take(6)
        .collect::<Vec<_>>()
        .join("-");
    dir.join(format!("{index:04}-{slug}.mp3"))
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
