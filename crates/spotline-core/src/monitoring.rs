//! Monitoring events emitted on the delivery path
//!
//! Events are fire-and-forget: the request path hands them to a channel and
//! never waits for a sink. Every event carries the request's [`Correlation`]
//! so downstream consumers can join request and ad-return records.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ad::Ad;
use crate::bucket::{SlotPosition, TimeBucket};
use crate::ids::{MaterialId, MediaId, PositionId};

/// Correlation identifiers shared by all events of one request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Correlation {
    /// Requesting media
    pub media: MediaId,
    /// Cookie identifier of the viewer
    pub cookie: String,
    /// Viewer session
    pub session: Option<String>,
    /// Page or player view
    pub view: Option<String>,
    /// Unique request identifier
    pub request: Uuid,
}

/// Events produced by the delivery runtime
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum MonitoringEvent {
    /// Exactly one per incoming request
    RequestReceived {
        /// Request correlation
        correlation: Correlation,
        /// Position codes named by the request
        codes: Vec<String>,
        /// Bucket the request was served against
        bucket: TimeBucket,
    },
    /// One per granted allocation
    AdReturned {
        /// Request correlation
        correlation: Correlation,
        /// Position the ad was placed in
        position: PositionId,
        /// Sequence index within the position queue
        sequence: SlotPosition,
        /// Allocated ad
        ad: Ad,
        /// Released material
        material: MaterialId,
    },
    /// A position failed somewhere in its pipeline
    DeliveryFailed {
        /// Request correlation
        correlation: Correlation,
        /// Position code that failed
        code: String,
        /// Stage at which the failure was captured
        stage: String,
        /// Rendered cause
        cause: String,
    },
}

impl MonitoringEvent {
    /// Correlation carried by the event
    pub fn correlation(&self) -> &Correlation {
        match self {
            MonitoringEvent::RequestReceived { correlation, .. }
            | MonitoringEvent::AdReturned { correlation, .. }
            | MonitoringEvent::DeliveryFailed { correlation, .. } => correlation,
        }
    }

    /// Short event name for logs
    pub fn name(&self) -> &'static str {
        match self {
            MonitoringEvent::RequestReceived { .. } => "request_received",
            MonitoringEvent::AdReturned { .. } => "ad_returned",
            MonitoringEvent::DeliveryFailed { .. } => "delivery_failed",
        }
    }
}
