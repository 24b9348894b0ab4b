//! Per-recorder dispatch thread
//!
//! Background workers (save and playback) never call user code directly.
//! They push typed [`Notification`]s onto an unbounded crossbeam channel and a
//! dedicated dispatch thread turns them into callback invocations, one at a
//! time and in send order. Notifications are enqueued while the recorder's
//! state lock is held, so the delivery order matches the order of state
//! changes.
//!
//! # Triggers
//!
//! Trigger notifications carry the session they belong to and an ack
//! channel. The playback worker blocks on the ack, so a slow listener stalls
//! the triggers after it instead of letting them pile up. Delivery goes
//! through a [`TriggerGate`]: a trigger whose session was closed in the
//! meantime is acked without reaching the listener, and closing a session
//! waits for a trigger that is already inside the listener.
//!
//! The thread exits once every sender is gone.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};

use super::callback::{RecorderCallback, RecorderEvent, TriggerListener};
use crate::error::{RecorderError, Result};

/// Message handled by the dispatch thread
pub(crate) enum Notification<T> {
    /// Lifecycle event for a recorder callback
    Lifecycle(Arc<dyn RecorderCallback>, RecorderEvent),
    /// Replayed payload for a trigger listener, acked once handled
    Trigger {
        listener: Arc<dyn TriggerListener<T>>,
        payload: T,
        session: u64,
        ack: Sender<()>,
    },
    /// Session fault for a trigger listener
    TriggerError(Arc<dyn TriggerListener<T>>, Arc<RecorderError>),
    /// Acknowledge once everything queued before it was delivered
    Flush(Sender<()>),
}

/// Playback session allowed to reach trigger listeners
///
/// Session numbers start at 1; 0 means closed.
#[derive(Debug, Default)]
pub(crate) struct TriggerGate {
    open: AtomicU64,
    /// Held for the whole of each `on_trigger` call
    delivering: Mutex<()>,
}

impl TriggerGate {
    fn deliver<T>(&self, listener: &dyn TriggerListener<T>, payload: T, session: u64) {
        let _delivering = self.delivering.lock().unwrap_or_else(PoisonError::into_inner);
        if self.open.load(Ordering::SeqCst) != session {
            tracing::trace!("Trigger of closed session {} dropped", session);
            return;
        }
        listener.on_trigger(payload);
    }
}

/// Sending side of a recorder's dispatch thread
pub(crate) struct Dispatcher<T> {
    tx: Sender<Notification<T>>,
    gate: Arc<TriggerGate>,
    handle: JoinHandle<()>,
}

impl<T> Dispatcher<T> {
    /// Let triggers of `session` through
    pub(crate) fn open_gate(&self, session: u64) {
        self.gate.open.store(session, Ordering::SeqCst);
    }

    /// Stop letting triggers through; returns without waiting
    ///
    /// Safe to call under the recorder's state lock.
    pub(crate) fn close_gate(&self) {
        self.gate.open.store(0, Ordering::SeqCst);
    }

    /// Wait until no trigger is inside a listener
    ///
    /// Returns at once on the dispatch thread itself, where the trigger in
    /// progress (if any) is the caller.
    pub(crate) fn wait_for_triggers(&self) {
        if thread::current().id() == self.handle.thread().id() {
            return;
        }
        drop(
            self.gate
                .delivering
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
    }
}

impl<T: Send + 'static> Dispatcher<T> {
    /// Spawn the dispatch thread
    pub(crate) fn spawn(name: &str) -> Result<Self> {
        let (tx, rx) = unbounded();
        let gate = Arc::new(TriggerGate::default());
        let thread_gate = Arc::clone(&gate);
        let handle = thread::Builder::new()
            .name(format!("dispatch-{}", name))
            .spawn(move || run(rx, thread_gate))
            .map_err(|e| RecorderError::Channel(format!("Failed to spawn dispatch thread: {}", e)))?;
        Ok(Self { tx, gate, handle })
    }

    /// Queue a notification
    pub(crate) fn send(&self, notification: Notification<T>) {
        if self.tx.send(notification).is_err() {
            tracing::warn!("Dispatch thread is gone, notification dropped");
        }
    }

    /// Queue a lifecycle event
    pub(crate) fn lifecycle(&self, callback: Arc<dyn RecorderCallback>, event: RecorderEvent) {
        tracing::trace!("Dispatching {:?}", event);
        self.send(Notification::Lifecycle(callback, event));
    }

    /// Queue a trigger of `session`; the receiver fires once it was handled
    ///
    /// The receiver disconnects instead if the dispatch thread is gone.
    pub(crate) fn trigger(
        &self,
        listener: Arc<dyn TriggerListener<T>>,
        payload: T,
        session: u64,
    ) -> Receiver<()> {
        let (ack, handled) = bounded(1);
        self.send(Notification::Trigger {
            listener,
            payload,
            session,
            ack,
        });
        handled
    }

    /// Block until every notification queued so far was delivered
    pub(crate) fn flush(&self, timeout: Duration) -> bool {
        let (ack_tx, ack_rx) = bounded(1);
        self.send(Notification::Flush(ack_tx));
        ack_rx.recv_timeout(timeout).is_ok()
    }
}

fn run<T>(rx: Receiver<Notification<T>>, gate: Arc<TriggerGate>) {
    for notification in rx {
        let delivered = catch_unwind(AssertUnwindSafe(|| deliver(notification, &gate)));
        if delivered.is_err() {
            tracing::error!("Recorder callback panicked");
        }
    }
    tracing::trace!("Dispatch thread exiting");
}

fn deliver<T>(notification: Notification<T>, gate: &TriggerGate) {
    match notification {
        Notification::Lifecycle(callback, event) => event.deliver(callback.as_ref()),
        Notification::Trigger {
            listener,
            payload,
            session,
            ack,
        } => {
            let handled = catch_unwind(AssertUnwindSafe(|| {
                gate.deliver(listener.as_ref(), payload, session)
            }));
            if handled.is_err() {
                tracing::error!("Trigger listener panicked");
            }
            let _ = ack.send(());
        }
        Notification::TriggerError(listener, error) => listener.on_error(&error),
        Notification::Flush(ack) => {
            let _ = ack.send(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Order(Mutex<Vec<String>>);

    impl RecorderCallback for Order {
        fn on_recording_started(&self) {
            self.0.lock().unwrap().push("started".into());
        }

        fn on_recording_stopped(&self) {
            self.0.lock().unwrap().push("stopped".into());
        }
    }

    #[test]
    fn test_delivers_in_send_order() {
        let dispatcher = Dispatcher::<u32>::spawn("test").unwrap();
        let order = Arc::new(Order::default());
        let seen = Arc::new(Mutex::new(Vec::new()));

        dispatcher.open_gate(1);
        dispatcher.lifecycle(order.clone(), RecorderEvent::RecordingStarted);
        let sink = seen.clone();
        let listener: Arc<dyn TriggerListener<u32>> =
            Arc::new(move |payload: u32| sink.lock().unwrap().push(payload));
        dispatcher.trigger(listener.clone(), 1, 1);
        dispatcher.trigger(listener, 2, 1);
        dispatcher.lifecycle(order.clone(), RecorderEvent::RecordingStopped);

        assert!(dispatcher.flush(Duration::from_secs(5)));
        assert_eq!(*order.0.lock().unwrap(), vec!["started", "stopped"]);
        assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
    }

    #[test]
    fn test_survives_panicking_callback() {
        struct Panics;
        impl RecorderCallback for Panics {
            fn on_playback_started(&self) {
                panic!("boom");
            }
        }

        let dispatcher = Dispatcher::<()>::spawn("panics").unwrap();
        dispatcher.lifecycle(Arc::new(Panics), RecorderEvent::PlaybackStarted);
        assert!(dispatcher.flush(Duration::from_secs(5)));
    }

    fn recording_listener() -> (Arc<dyn TriggerListener<u32>>, Arc<Mutex<Vec<u32>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let listener: Arc<dyn TriggerListener<u32>> =
            Arc::new(move |payload: u32| sink.lock().unwrap().push(payload));
        (listener, seen)
    }

    #[test]
    fn test_closed_gate_acks_without_delivering() {
        let dispatcher = Dispatcher::<u32>::spawn("closed").unwrap();
        let (listener, seen) = recording_listener();

        dispatcher.open_gate(2);
        let stale = dispatcher.trigger(listener.clone(), 1, 1);
        assert!(stale.recv_timeout(Duration::from_secs(5)).is_ok());

        dispatcher.close_gate();
        let closed = dispatcher.trigger(listener, 2, 2);
        assert!(closed.recv_timeout(Duration::from_secs(5)).is_ok());
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_ack_waits_for_listener() {
        let dispatcher = Dispatcher::<u32>::spawn("slow").unwrap();
        let listener: Arc<dyn TriggerListener<u32>> =
            Arc::new(|_: u32| thread::sleep(Duration::from_millis(150)));
        dispatcher.open_gate(1);

        let queued_at = std::time::Instant::now();
        let handled = dispatcher.trigger(listener, 0, 1);
        assert!(handled.recv_timeout(Duration::from_secs(5)).is_ok());
        assert!(queued_at.elapsed() >= Duration::from_millis(150));
    }

    #[test]
    fn test_close_waits_for_trigger_in_progress() {
        let dispatcher = Dispatcher::<u32>::spawn("closing").unwrap();
        let (entered_tx, entered_rx) = bounded(1);
        let finished = Arc::new(Mutex::new(false));
        let flag = finished.clone();
        let listener: Arc<dyn TriggerListener<u32>> = Arc::new(move |_: u32| {
            let _ = entered_tx.send(());
            thread::sleep(Duration::from_millis(100));
            *flag.lock().unwrap() = true;
        });
        dispatcher.open_gate(1);

        let _handled = dispatcher.trigger(listener, 0, 1);
        assert!(entered_rx.recv_timeout(Duration::from_secs(5)).is_ok());
        dispatcher.close_gate();
        dispatcher.wait_for_triggers();
        assert!(*finished.lock().unwrap());
    }

    #[test]
    fn test_panicking_listener_is_still_acked() {
        let dispatcher = Dispatcher::<u32>::spawn("panicking").unwrap();
        let listener: Arc<dyn TriggerListener<u32>> = Arc::new(|_: u32| panic!("boom"));
        dispatcher.open_gate(1);

        let handled = dispatcher.trigger(listener, 0, 1);
        assert!(handled.recv_timeout(Duration::from_secs(5)).is_ok());
    }
}
