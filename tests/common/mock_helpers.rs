//! Recording callbacks and listeners for assertions

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, Sender};
use eventrecord_rs::{types::SavedRecording, RecorderCallback, RecorderError, TriggerListener};

use super::test_timeout;

/// A lifecycle event as seen by a callback
#[derive(Debug, Clone, PartialEq)]
pub enum Observed {
    RecordingStarted,
    RecordingStopped,
    Progress(f64),
    Saved(SavedRecording),
    DataCleared,
    PrePlayback,
    PlaybackStarted,
    PlaybackStopped,
    Error(String),
}

impl Observed {
    /// Same variant, ignoring the payload
    pub fn same_kind(&self, other: &Observed) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }
}

/// Callback that keeps every event it receives
pub struct EventLog {
    events: Mutex<Vec<Observed>>,
    tx: Sender<Observed>,
    rx: Receiver<Observed>,
}

impl EventLog {
    pub fn new() -> Arc<Self> {
        let (tx, rx) = unbounded();
        Arc::new(Self {
            events: Mutex::new(Vec::new()),
            tx,
            rx,
        })
    }

    fn push(&self, event: Observed) {
        self.events.lock().unwrap().push(event.clone());
        let _ = self.tx.send(event);
    }

    /// Every event received so far
    pub fn events(&self) -> Vec<Observed> {
        self.events.lock().unwrap().clone()
    }

    /// Events received so far, excluding save progress
    pub fn lifecycle(&self) -> Vec<Observed> {
        self.events()
            .into_iter()
            .filter(|e| !matches!(e, Observed::Progress(_)))
            .collect()
    }

    /// Number of events of the same kind as `kind`
    pub fn count(&self, kind: &Observed) -> usize {
        self.events().iter().filter(|e| e.same_kind(kind)).count()
    }

    /// Wait for the next event matching `predicate`, consuming the ones before it
    pub fn wait_for<F>(&self, mut predicate: F) -> Option<Observed>
    where
        F: FnMut(&Observed) -> bool,
    {
        let deadline = Instant::now() + test_timeout();
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.rx.recv_timeout(remaining) {
                Ok(event) if predicate(&event) => return Some(event),
                Ok(_) => continue,
                Err(_) => return None,
            }
        }
    }

    /// Wait for the next saved recording
    pub fn wait_saved(&self) -> SavedRecording {
        match self.wait_for(|e| matches!(e, Observed::Saved(_))) {
            Some(Observed::Saved(saved)) => saved,
            other => panic!("Expected a saved recording, got {:?}", other),
        }
    }

    /// Wait for the next playback stop
    pub fn wait_playback_stopped(&self) {
        assert!(
            self.wait_for(|e| *e == Observed::PlaybackStopped).is_some(),
            "Playback did not stop in time: {:?}",
            self.events()
        );
    }
}

impl RecorderCallback for EventLog {
    fn on_recording_started(&self) {
        self.push(Observed::RecordingStarted);
    }

    fn on_recording_stopped(&self) {
        self.push(Observed::RecordingStopped);
    }

    fn on_recording_save_progress(&self, progress: f64) {
        self.push(Observed::Progress(progress));
    }

    fn on_recording_saved(&self, recording: &SavedRecording) {
        self.push(Observed::Saved(recording.clone()));
    }

    fn on_recording_data_cleared(&self) {
        self.push(Observed::DataCleared);
    }

    fn on_pre_playback(&self) {
        self.push(Observed::PrePlayback);
    }

    fn on_playback_started(&self) {
        self.push(Observed::PlaybackStarted);
    }

    fn on_playback_stopped(&self) {
        self.push(Observed::PlaybackStopped);
    }

    fn on_error(&self, error: &RecorderError) {
        self.push(Observed::Error(error.to_string()));
    }
}

type StallRule<T> = (Box<dyn Fn(&T) -> bool + Send + Sync>, Duration);

/// Trigger listener that timestamps every payload
///
/// Optionally sleeps inside `on_trigger` for matching payloads, after the
/// timestamp was taken.
pub struct TriggerLog<T> {
    started: Instant,
    triggers: Mutex<Vec<(Duration, T)>>,
    errors: Mutex<Vec<String>>,
    stall: Option<StallRule<T>>,
}

impl<T: Clone + Send + 'static> TriggerLog<T> {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            started: Instant::now(),
            triggers: Mutex::new(Vec::new()),
            errors: Mutex::new(Vec::new()),
            stall: None,
        })
    }

    /// Listener that blocks for `pause` on every payload matching `when`
    pub fn stalling(
        when: impl Fn(&T) -> bool + Send + Sync + 'static,
        pause: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            started: Instant::now(),
            triggers: Mutex::new(Vec::new()),
            errors: Mutex::new(Vec::new()),
            stall: Some((Box::new(when), pause)),
        })
    }

    /// Payloads in the order they fired
    pub fn payloads(&self) -> Vec<T> {
        self.triggers
            .lock()
            .unwrap()
            .iter()
            .map(|(_, payload)| payload.clone())
            .collect()
    }

    /// Time of every trigger, measured from the creation of the log
    pub fn offsets(&self) -> Vec<Duration> {
        self.triggers.lock().unwrap().iter().map(|(at, _)| *at).collect()
    }

    /// Time between each trigger and the one before it
    pub fn gaps(&self) -> Vec<Duration> {
        self.offsets()
            .windows(2)
            .map(|pair| pair[1].saturating_sub(pair[0]))
            .collect()
    }

    /// Number of triggers so far
    pub fn fired(&self) -> usize {
        self.triggers.lock().unwrap().len()
    }

    /// Errors reported to the listener
    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().unwrap().clone()
    }

    /// Wait until at least `n` triggers fired
    pub fn wait_for_count(&self, n: usize) -> bool {
        super::wait_until(|| self.triggers.lock().unwrap().len() >= n)
    }
}

impl<T: Clone + Send + 'static> TriggerListener<T> for TriggerLog<T> {
    fn on_trigger(&self, payload: T) {
        let at = self.started.elapsed();
        let pause = self
            .stall
            .as_ref()
            .filter(|(when, _)| when(&payload))
            .map(|(_, pause)| *pause);
        self.triggers.lock().unwrap().push((at, payload));
        if let Some(pause) = pause {
            std::thread::sleep(pause);
        }
    }

    fn on_error(&self, error: &RecorderError) {
        self.errors.lock().unwrap().push(error.to_string());
    }
}
