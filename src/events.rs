//! Lifecycle event sinks.
//!
//! `EventBus` keeps only the most recent event and hands it to anyone who
//! subscribes late, so a viewer attaching mid-run sees the current kernel
//! straight away. `ChannelSink` is the lossless alternative for consumers that
//! need the full sequence (history, tests).

use crate::models::BenchmarkEvent;
use crossbeam_channel::{unbounded, Receiver, Sender};
use tokio::sync::watch;

/// Destination for orchestrator events. Publishing must never block for long.
pub trait EventSink: Send + Sync {
    fn publish(&self, event: &BenchmarkEvent);
}

/// Replay-of-one broadcast built on `tokio::sync::watch`.
pub struct EventBus {
    tx: watch::Sender<Option<BenchmarkEvent>>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        EventBus { tx }
    }

    /// New receiver; its first `borrow()` already holds the latest event.
    pub fn subscribe(&self) -> watch::Receiver<Option<BenchmarkEvent>> {
        self.tx.subscribe()
    }

    pub fn latest(&self) -> Option<BenchmarkEvent> {
        self.tx.borrow().clone()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for EventBus {
    fn publish(&self, event: &BenchmarkEvent) {
        // send_replace stores the value even with no live receivers.
        self.tx.send_replace(Some(event.clone()));
    }
}

/// Unbounded crossbeam channel carrying every event in order.
pub struct ChannelSink {
    tx: Sender<BenchmarkEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, Receiver<BenchmarkEvent>) {
        let (tx, rx) = unbounded();
        (ChannelSink { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn publish(&self, event: &BenchmarkEvent) {
        if self.tx.send(event.clone()).is_err() {
            log::debug!("[EVENTS] Receiver dropped; discarding {}", event.test_name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EventMode, EventState, KernelId};

    fn event(kernel: KernelId, state: EventState) -> BenchmarkEvent {
        BenchmarkEvent {
            test_name: kernel.display_name().to_string(),
            kernel,
            mode: EventMode::Single,
            state,
            time_ms: 0.0,
            score: 0.0,
        }
    }

    #[test]
    fn test_late_subscriber_sees_latest_event() {
        let bus = EventBus::new();
        bus.publish(&event(KernelId::PrimeGeneration, EventState::Started));
        bus.publish(&event(KernelId::PrimeGeneration, EventState::Completed));

        let rx = bus.subscribe();
        let seen = rx.borrow().clone().unwrap();
        assert_eq!(seen.kernel, KernelId::PrimeGeneration);
        assert_eq!(seen.state, EventState::Completed);
    }

    #[test]
    fn test_bus_starts_empty() {
        let bus = EventBus::new();
        assert!(bus.latest().is_none());
        assert!(bus.subscribe().borrow().is_none());
    }

    #[test]
    fn test_channel_sink_is_lossless() {
        let (sink, rx) = ChannelSink::new();
        for kernel in KernelId::ALL {
            sink.publish(&event(kernel, EventState::Started));
        }
        let received: Vec<KernelId> = rx.try_iter().map(|e| e.kernel).collect();
        assert_eq!(received, KernelId::ALL.to_vec());
    }

    #[test]
    fn test_channel_sink_survives_dropped_receiver() {
        let (sink, rx) = ChannelSink::new();
        drop(rx);
        sink.publish(&event(KernelId::NQueens, EventState::Completed));
    }
}
