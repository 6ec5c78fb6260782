//! ABOUTME: Change notifications broadcast to in-process subscribers
//! ABOUTME: Fire-and-forget publication with no delivery guarantee

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

use crate::repositories::application_versions::ApplicationVersion;
use crate::repositories::applications::Application;
use crate::repositories::groups::Group;
use crate::repositories::metrics::MetricValue;

/// Notification published when a repository changes a record.
///
/// Serialized as `{ "event": <name>, "payload": <record> }` with the wire
/// names downstream consumers already match on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload")]
pub enum ChangeEvent {
    #[serde(rename = "updateApplication")]
    UpdateApplication(Application),
    #[serde(rename = "updateApplicationVersion")]
    UpdateApplicationVersion(ApplicationVersion),
    #[serde(rename = "groupUpdated")]
    GroupUpdated(Group),
    #[serde(rename = "groupMetricUpdated")]
    GroupMetricUpdated(MetricValue),
}

impl ChangeEvent {
    /// Wire name of this notification
    pub fn name(&self) -> &'static str {
        match self {
            ChangeEvent::UpdateApplication(_) => "updateApplication",
            ChangeEvent::UpdateApplicationVersion(_) => "updateApplicationVersion",
            ChangeEvent::GroupUpdated(_) => "groupUpdated",
            ChangeEvent::GroupMetricUpdated(_) => "groupMetricUpdated",
        }
    }
}

/// Broadcast bus carrying change notifications to all subscribers.
///
/// Publishing never blocks and never fails: with no subscribers the event is
/// dropped, and a subscriber that falls more than the bus capacity behind
/// loses the oldest events.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<ChangeEvent>,
}

impl EventBus {
    /// Create a bus buffering up to `capacity` events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers
    pub fn publish(&self, event: ChangeEvent) {
        let name = event.name();
        match self.sender.send(event) {
            Ok(subscriber_count) => {
                debug!(event = name, subscriber_count, "Change notification published");
            }
            Err(_) => {
                debug!(event = name, "No subscribers for change notification");
            }
        }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.sender.subscribe()
    }
}
