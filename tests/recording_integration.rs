//! Integration tests for live recording and saving

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::builders::ManagerBuilder;
use common::mock_helpers::{EventLog, Observed, TriggerLog};
use eventrecord_rs::{
    ActionRecorder, PlaybackLimit, Recorder, RecorderError, RecorderId, RecorderState,
};
use serial_test::serial;

fn recorder_with_log(id: u32) -> (ActionRecorder<String>, Arc<EventLog>) {
    let manager = ManagerBuilder::new().build();
    let recorder = ActionRecorder::new(manager, RecorderId(id)).unwrap();
    let log = EventLog::new();
    recorder.set_callback(log.clone());
    (recorder, log)
}

#[test]
fn test_action_while_idle_is_ignored() {
    let (recorder, log) = recorder_with_log(1);

    assert!(!recorder.action_performed("ignored".to_string()));
    assert_eq!(recorder.buffered_len(), 0);
    assert!(recorder.flush_callbacks(common::test_timeout()));
    assert!(log.events().is_empty());
}

#[test]
fn test_stop_twice_reports_once() {
    let (recorder, log) = recorder_with_log(1);

    recorder.start_recording().unwrap();
    recorder.stop_recording(false).unwrap();
    recorder.stop_recording(false).unwrap();

    assert!(recorder.flush_callbacks(common::test_timeout()));
    assert_eq!(
        log.events(),
        vec![Observed::RecordingStarted, Observed::RecordingStopped]
    );
    assert_eq!(recorder.state(), RecorderState::Idle);
}

#[test]
fn test_start_recording_twice_is_rejected() {
    let (recorder, _log) = recorder_with_log(1);

    recorder.start_recording().unwrap();
    let err = recorder.start_recording().unwrap_err();
    assert!(matches!(err, RecorderError::IllegalTransition { .. }));
    assert!(recorder.is_recording());
}

#[test]
fn test_discarded_recording_is_not_saved() {
    let (recorder, log) = recorder_with_log(1);

    recorder.start_recording().unwrap();
    recorder.action_performed("a".to_string());
    recorder.stop_recording(false).unwrap();

    assert!(recorder.flush_callbacks(common::test_timeout()));
    assert!(recorder.recordings().is_empty());
    assert!(!log.events().iter().any(|e| matches!(e, Observed::Saved(_))));
}

#[test]
#[serial]
fn test_save_reports_progress_then_saved() {
    let (recorder, log) = recorder_with_log(1);

    recorder.start_recording().unwrap();
    for action in ["a", "b", "c", "d"] {
        assert!(recorder.action_performed(action.to_string()));
    }
    recorder.stop_recording_titled("four taps").unwrap();
    let saved = log.wait_saved();

    assert_eq!(saved.title.as_deref(), Some("four taps"));
    assert_eq!(recorder.latest_recording(), Some(saved.clone()));
    assert_eq!(recorder.recording_entry_count(saved.id).unwrap(), 4);
    assert_eq!(recorder.entry_count().unwrap(), 4);

    let progress: Vec<f64> = log
        .events()
        .into_iter()
        .filter_map(|e| match e {
            Observed::Progress(p) => Some(p),
            _ => None,
        })
        .collect();
    assert_eq!(progress.len(), 4);
    common::assert_float_eq(progress[0], 25.0, 1e-9);
    common::assert_float_eq(progress[3], 100.0, 1e-9);
    assert!(progress.windows(2).all(|w| w[0] < w[1]));
}

#[test]
#[serial]
fn test_round_trip_preserves_payloads_and_order() {
    let (recorder, log) = recorder_with_log(7);
    let actions: Vec<String> = (0..6).map(|i| format!("action-{}", i)).collect();

    recorder.start_recording().unwrap();
    for action in &actions {
        std::thread::sleep(Duration::from_millis(3));
        assert!(recorder.action_performed(action.clone()));
    }
    recorder.stop_recording(true).unwrap();
    let saved = log.wait_saved();
    assert_eq!(recorder.recording_entry_count(saved.id).unwrap(), 6);

    let triggers = TriggerLog::<String>::new();
    recorder.set_playback_limit(PlaybackLimit::from_runs(1));
    recorder.start_playback(saved.id, triggers.clone()).unwrap();
    log.wait_playback_stopped();

    assert_eq!(triggers.payloads(), actions);
    assert_eq!(recorder.runs_completed(), 1);
}

#[test]
fn test_empty_recording_still_saves() {
    let (recorder, log) = recorder_with_log(1);

    recorder.start_recording().unwrap();
    recorder.stop_recording(true).unwrap();
    let saved = log.wait_saved();

    assert_eq!(recorder.recording_entry_count(saved.id).unwrap(), 0);
    assert_eq!(log.count(&Observed::Progress(0.0)), 0);
}

#[test]
fn test_restart_clears_buffer() {
    let (recorder, _log) = recorder_with_log(1);

    recorder.start_recording().unwrap();
    recorder.action_performed("old".to_string());
    recorder.stop_recording(false).unwrap();
    recorder.start_recording().unwrap();

    assert_eq!(recorder.buffered_len(), 0);
}

#[test]
fn test_clear_recording_data_deletes_recordings() {
    let (recorder, log) = recorder_with_log(2);

    recorder.start_recording().unwrap();
    recorder.action_performed("a".to_string());
    recorder.stop_recording(true).unwrap();
    log.wait_saved();

    recorder.clear_recording_data().unwrap();
    assert!(recorder.recordings().is_empty());
    assert_eq!(recorder.entry_count().unwrap(), 0);
    assert!(log.wait_for(|e| *e == Observed::DataCleared).is_some());
}

#[test]
fn test_release_stops_recording_and_blocks_further_use() {
    let (recorder, log) = recorder_with_log(1);
    let slot = recorder.slot().to_string();
    let store = recorder.core().store().clone();

    recorder.start_recording().unwrap();
    recorder.release().unwrap();

    assert!(!store.exists(&slot).unwrap());
    assert!(matches!(recorder.start_recording(), Err(RecorderError::Released)));
    assert!(matches!(recorder.release(), Err(RecorderError::Released)));
    assert!(matches!(recorder.entry_count(), Err(RecorderError::Released)));
    assert!(!recorder.action_performed("late".to_string()));

    assert!(recorder.flush_callbacks(common::test_timeout()));
    assert_eq!(
        log.events(),
        vec![Observed::RecordingStarted, Observed::RecordingStopped]
    );
}
