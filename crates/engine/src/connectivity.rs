//! Single source of truth for "can we reach the network".
//!
//! The host environment feeds its navigator-style online flag into
//! `set_online`; the monitor deduplicates repeated signals and publishes
//! one event per actual transition on a broadcast channel the orchestrator
//! consumes. Whether the remote store accepts a request is a separate
//! question — a push can still fail while the monitor reports online.

use log::debug;
use tokio::sync::{broadcast, watch};

use herdbook_core::sync::{ConnectivityEvent, ConnectivityState};

const EVENT_CHANNEL_CAPACITY: usize = 16;

pub struct ConnectivityMonitor {
    state: watch::Sender<ConnectivityState>,
    events: broadcast::Sender<ConnectivityEvent>,
}

impl ConnectivityMonitor {
    /// Not persisted: the initial state is recomputed from the host signal
    /// at process start.
    pub fn new(initial: ConnectivityState) -> Self {
        let (state, _) = watch::channel(initial);
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { state, events }
    }

    pub fn is_online(&self) -> bool {
        self.state.borrow().is_online()
    }

    pub fn state(&self) -> ConnectivityState {
        *self.state.borrow()
    }

    /// Feed the current host signal. Emits an event only on an actual
    /// transition, never for repeated signals of the same state.
    pub fn set_online(&self, online: bool) {
        let next = if online {
            ConnectivityState::Online
        } else {
            ConnectivityState::Offline
        };
        let changed = self.state.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
        if changed {
            let event = if online {
                ConnectivityEvent::BecameOnline
            } else {
                ConnectivityEvent::BecameOffline
            };
            debug!("connectivity transition: {:?}", event);
            // No subscribers yet is fine; the watch channel still has the
            // current state for late joiners.
            let _ = self.events.send(event);
        }
    }

    /// Transition events, one per actual state change.
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectivityEvent> {
        self.events.subscribe()
    }

    /// Current-state channel for callers that only need snapshots.
    pub fn watch(&self) -> watch::Receiver<ConnectivityState> {
        self.state.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn repeated_signals_emit_one_event() {
        let monitor = ConnectivityMonitor::new(ConnectivityState::Offline);
        let mut events = monitor.subscribe();

        monitor.set_online(true);
        monitor.set_online(true);
        monitor.set_online(true);

        assert_eq!(
            events.recv().await.expect("event"),
            ConnectivityEvent::BecameOnline
        );
        assert!(events.try_recv().is_err());
        assert!(monitor.is_online());
    }

    #[tokio::test]
    async fn transitions_alternate() {
        let monitor = ConnectivityMonitor::new(ConnectivityState::Online);
        let mut events = monitor.subscribe();

        monitor.set_online(false);
        monitor.set_online(true);

        assert_eq!(
            events.recv().await.expect("event"),
            ConnectivityEvent::BecameOffline
        );
        assert_eq!(
            events.recv().await.expect("event"),
            ConnectivityEvent::BecameOnline
        );
    }

    #[test]
    fn initial_state_is_reported() {
        let monitor = ConnectivityMonitor::new(ConnectivityState::Offline);
        assert!(!monitor.is_online());
        assert_eq!(monitor.state(), ConnectivityState::Offline);
    }
}
