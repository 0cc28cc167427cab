//! Event publisher
//!
//! Renders an [`Event`] once and fans the payload out to a room audience.
//! A render failure abandons the publish before anything is enqueued.

use std::sync::Arc;

use crate::registry::{Audience, RoomId, Topic};
use crate::render::{Event, Render};
use crate::stats::EngineStats;

use super::fanout::Broadcaster;

/// Renders room events and hands them to the broadcaster
pub struct EventPublisher<R> {
    renderer: Arc<R>,
    broadcaster: Arc<Broadcaster>,
}

impl<R: Render> EventPublisher<R> {
    /// Publish through `broadcaster`, rendering with `renderer`
    pub fn new(renderer: Arc<R>, broadcaster: Arc<Broadcaster>) -> Self {
        Self {
            renderer,
            broadcaster,
        }
    }

    /// Underlying fan-out pool
    pub fn broadcaster(&self) -> &Arc<Broadcaster> {
        &self.broadcaster
    }

    /// Counters shared with the registry
    pub fn stats(&self) -> &Arc<EngineStats> {
        self.broadcaster.registry().stats()
    }

    /// Render `event` and send it to `audience` in `room_id`
    ///
    /// Returns the number of deliveries enqueued; zero when rendering
    /// failed.
    pub async fn publish(&self, room_id: RoomId, audience: Audience, event: &Event) -> usize {
        let payload = match self.renderer.render(event) {
            Ok(payload) => payload,
            Err(e) => {
                self.stats().publish_abandoned();
                tracing::error!(
                    room_id,
                    event = event.kind(),
                    error = %e,
                    "Failed to render event, publish abandoned"
                );
                return 0;
            }
        };

        let pattern = Topic::audience(room_id, audience);
        let sent = self.broadcaster.publish(&pattern, payload).await;
        tracing::debug!(room_id, event = event.kind(), deliveries = sent, "Event published");
        sent
    }
}
