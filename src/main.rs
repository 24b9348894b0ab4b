//! EventRecord-RS - Demo Entry Point
//!
//! Records a short burst of actions, saves it, replays it once and then runs
//! an authored script through a fixed action recorder. Useful for checking a
//! store directory and the log output by hand.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use crossbeam_channel::{unbounded, Sender};
use eventrecord_rs::{
    backend::open_store,
    config::{app_data_dir, LOG_DIR},
    types::SavedRecording,
    ActionRecorder, AppConfig, FixedActionRecorder, PlaybackLimit, Recorder, RecorderCallback,
    RecorderError, RecorderId, RecorderManager,
};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// How long the demo waits for any single background step
const STEP_TIMEOUT: Duration = Duration::from_secs(10);

/// Lifecycle events the demo waits on
#[derive(Debug)]
enum DemoEvent {
    Saved(SavedRecording),
    PlaybackStopped,
    Failed(String),
}

/// Forwards the interesting lifecycle events to the main thread
struct DemoCallback {
    name: &'static str,
    tx: Sender<DemoEvent>,
}

impl RecorderCallback for DemoCallback {
    fn on_recording_started(&self) {
        tracing::info!("[{}] recording started", self.name);
    }

    fn on_recording_stopped(&self) {
        tracing::info!("[{}] recording stopped", self.name);
    }

    fn on_recording_save_progress(&self, progress: f64) {
        tracing::debug!("[{}] save progress {:.0}%", self.name, progress);
    }

    fn on_recording_saved(&self, recording: &SavedRecording) {
        let _ = self.tx.send(DemoEvent::Saved(recording.clone()));
    }

    fn on_playback_started(&self) {
        tracing::info!("[{}] playback started", self.name);
    }

    fn on_playback_stopped(&self) {
        let _ = self.tx.send(DemoEvent::PlaybackStopped);
    }

    fn on_error(&self, error: &RecorderError) {
        let _ = self.tx.send(DemoEvent::Failed(error.to_string()));
    }
}

fn init_logging() -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,eventrecord_rs=debug"));

    let log_dir = app_data_dir()
        .map(|dir| dir.join(LOG_DIR))
        .filter(|dir| std::fs::create_dir_all(dir).is_ok());

    match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(&dir, "eventrecord.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(writer),
                )
                .init();
            tracing::debug!("Writing logs to {:?}", dir);
            Some(guard)
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
            None
        }
    }
}

fn wait_for<F>(rx: &crossbeam_channel::Receiver<DemoEvent>, mut matches: F) -> anyhow::Result<DemoEvent>
where
    F: FnMut(&DemoEvent) -> bool,
{
    loop {
        let event = rx
            .recv_timeout(STEP_TIMEOUT)
            .context("Timed out waiting for a recorder event")?;
        if let DemoEvent::Failed(message) = &event {
            anyhow::bail!("Recorder reported an error: {}", message);
        }
        if matches(&event) {
            return Ok(event);
        }
    }
}

fn main() -> anyhow::Result<()> {
    let _log_guard = init_logging();

    tracing::info!("Starting EventRecord demo");

    let config = match AppConfig::default_path() {
        Ok(path) => AppConfig::load_or_default(path),
        Err(e) => {
            tracing::warn!("No app data directory ({}), using an in-memory store", e);
            AppConfig::in_memory()
        }
    };
    let store = open_store(&config.store).context("Failed to open entry store")?;
    let manager = RecorderManager::shared(store, &config).context("Failed to start manager")?;

    // Live recording
    let (tx, rx) = unbounded();
    let recorder = ActionRecorder::<String>::new(manager.clone(), RecorderId(1))?;
    recorder.set_callback(Arc::new(DemoCallback {
        name: "live",
        tx: tx.clone(),
    }));

    recorder.start_recording()?;
    for (action, pause) in [("open", 120), ("scroll", 80), ("tap", 200), ("close", 50)] {
        std::thread::sleep(Duration::from_millis(pause));
        recorder.action_performed(action.to_string());
    }
    recorder.stop_recording_titled("demo session")?;

    let saved = match wait_for(&rx, |event| matches!(event, DemoEvent::Saved(_)))? {
        DemoEvent::Saved(saved) => saved,
        other => anyhow::bail!("Unexpected event {:?}", other),
    };
    tracing::info!(
        "Saved {} with {} entries",
        saved.id,
        recorder.recording_entry_count(saved.id)?
    );

    // Replay once
    recorder.set_playback_limit(PlaybackLimit::from_runs(1));
    recorder.start_playback(
        saved.id,
        Arc::new(|action: String| tracing::info!("replayed: {}", action)),
    )?;
    wait_for(&rx, |event| matches!(event, DemoEvent::PlaybackStopped))?;

    // Authored script
    let script = FixedActionRecorder::<String>::new(manager.clone())?;
    script.set_callback(Arc::new(DemoCallback { name: "script", tx }));
    for (step, delay) in [("ready", 100), ("set", 100), ("go", 300)] {
        if !script.insert_action(step.to_string(), delay) {
            anyhow::bail!("Failed to write script step {}", step);
        }
    }
    script.set_playback_limit(PlaybackLimit::from_runs(2));
    script.start_playback(Arc::new(|step: String| tracing::info!("script: {}", step)))?;
    wait_for(&rx, |event| matches!(event, DemoEvent::PlaybackStopped))?;

    for recording in manager.all_recordings() {
        tracing::info!(
            "{} {} created {}",
            recording.id,
            recording.title.as_deref().unwrap_or("(untitled)"),
            recording.created_at
        );
    }

    script.release()?;
    recorder.release()?;
    tracing::info!("Demo finished");
    Ok(())
}
