//! Fire-and-forget monitoring
//!
//! The request path hands events to a bounded channel with `try_send` and
//! never waits. A background task drains the channel into a
//! [`MonitoringSink`]. When the channel is full the event is dropped and
//! counted; monitoring never slows delivery.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, trace};

use spotline_core::MonitoringEvent;

/// Destination of monitoring events
pub trait MonitoringSink: Send + Sync {
    /// Record one event
    fn record(&self, event: MonitoringEvent);
}

/// Sink that writes every event to the log
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl MonitoringSink for TracingSink {
    fn record(&self, event: MonitoringEvent) {
        let correlation = event.correlation();
        match serde_json::to_string(&event) {
            Ok(json) => debug!(
                target: "spotline::monitoring",
                event = event.name(),
                request = %correlation.request,
                media = %correlation.media,
                %json,
                "Monitoring event"
            ),
            Err(err) => debug!(target: "spotline::monitoring", error = %err, "Unserializable monitoring event"),
        }
    }
}

/// Sending half of the monitoring channel
#[derive(Debug)]
pub struct Monitor {
    sender: mpsc::Sender<MonitoringEvent>,
    emitted: AtomicU64,
    dropped: AtomicU64,
}

impl Monitor {
    /// Monitor with a channel of `capacity` events and its receiving end
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<MonitoringEvent>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (
            Self {
                sender,
                emitted: AtomicU64::new(0),
                dropped: AtomicU64::new(0),
            },
            receiver,
        )
    }

    /// Queue an event without waiting
    pub fn emit(&self, event: MonitoringEvent) {
        match self.sender.try_send(event) {
            Ok(()) => {
                self.emitted.fetch_add(1, Ordering::Relaxed);
            }
            Err(TrySendError::Full(event)) | Err(TrySendError::Closed(event)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                trace!(event = event.name(), "Monitoring event dropped");
            }
        }
    }

    /// Events queued so far
    pub fn emitted(&self) -> u64 {
        self.emitted.load(Ordering::Relaxed)
    }

    /// Events dropped because the channel was full or closed
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Forward every event to `sink` until all senders are gone
pub async fn drain(mut receiver: mpsc::Receiver<MonitoringEvent>, sink: Arc<dyn MonitoringSink>) {
    while let Some(event) = receiver.recv().await {
        sink.record(event);
    }
    debug!("Monitoring channel closed");
}
