//! # Subscriber trait
//!
//! `Subscribe` is the extension point for reacting to lifecycle events. Each
//! subscriber is driven by a dedicated worker fed by a bounded queue owned by
//! the [`SubscriberSet`](crate::subscribers::SubscriberSet).
//!
//! ## Contract
//! - Implementations may be slow; they never block the supervisor or other
//!   subscribers.
//! - On queue overflow, events for that subscriber are dropped and a
//!   `SubscriberOverflow` event is published.
//! - Panics are caught and published as `SubscriberPanicked`.

use async_trait::async_trait;

use crate::events::Event;

/// Contract for event subscribers.
#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    /// Handles one event. Called sequentially (FIFO) from this subscriber's worker.
    async fn on_event(&self, event: &Event);

    /// Name used in overflow/panic events.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Preferred queue capacity (clamped to at least 1).
    fn queue_capacity(&self) -> usize {
        1024
    }
}
