//! Mode observables
//!
//! A [`ModeWatch`] caches the last published boolean and fans it out to any
//! number of crossbeam receivers. A value is only sent when it differs from
//! the cached one, so subscribers never see the same mode twice in a row.

use std::sync::{Mutex, PoisonError};

use crossbeam_channel::{unbounded, Receiver, Sender};

#[derive(Debug, Default)]
struct WatchState {
    value: bool,
    subscribers: Vec<Sender<bool>>,
}

/// Last-value-cached, notify-on-change boolean stream
#[derive(Debug, Default)]
pub struct ModeWatch {
    state: Mutex<WatchState>,
}

impl ModeWatch {
    /// Create a watch holding `false`
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value
    pub fn get(&self) -> bool {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).value
    }

    /// Subscribe; the receiver immediately gets the current value
    pub fn subscribe(&self) -> Receiver<bool> {
        let (tx, rx) = unbounded();
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        // Cannot fail, rx is alive
        let _ = tx.send(state.value);
        state.subscribers.push(tx);
        rx
    }

    /// Publish a value, returning whether it changed
    pub fn publish(&self, value: bool) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.value == value {
            return false;
        }
        state.value = value;
        state.subscribers.retain(|tx| tx.send(value).is_ok());
        true
    }

    /// Number of live subscribers
    pub fn subscriber_count(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .subscribers
            .len()
    }
}
