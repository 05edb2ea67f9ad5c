//! # RoleSet Events
//!
//! Fire-and-forget membership domain events and the publish/subscribe bus
//! they are delivered over.
//!
//! ## Overview
//!
//! - **Event Types**: [`MembershipEvent`] variants for joins, role changes and
//!   workflow outcomes, wrapped in a generic [`Event`] envelope
//! - **Event Bus**: Publish/subscribe messaging ([`MemoryEventBus`])
//! - **Event Handlers**: Async event processing
//!
//! Publishing is never part of membership correctness: callers publish after
//! a mutation commits and log publish failures instead of surfacing them.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use roleset_events::{EventBus, EventSource, MemoryEventBus, MembershipEvent};
//! use uuid::Uuid;
//!
//! async fn publish_example() {
//!     let bus = MemoryEventBus::new();
//!     let mut sub = bus.subscribe("roleset.invitation.*").await.unwrap();
//!
//!     let event = MembershipEvent::InvitationAccepted {
//!         role_set_id: Uuid::now_v7(),
//!         invitation_id: Uuid::now_v7(),
//!         invited_actor_id: Uuid::now_v7(),
//!     };
//!     bus.publish(event.to_event(EventSource::Space).unwrap()).await.unwrap();
//!
//!     while let Ok(event) = sub.recv().await {
//!         println!("Received: {}", event.event_type);
//!     }
//! }
//! ```
//!
//! ## Topic Patterns
//!
//! Topics are structured as `roleset.{event_type}`:
//! - `roleset.member.joined` - Specific event
//! - `roleset.invitation.*` - All invitation events
//! - `roleset.#` - All membership events
//!
//! Wildcards:
//! - `*` matches exactly one segment
//! - `#` matches zero or more segments

pub mod bus;
pub mod types;

// Re-export main types
pub use bus::{
    topic_matches, EventBus, EventBusError, EventBusResult, EventBusStats, EventHandler,
    MemoryEventBus, Subscription,
};
pub use types::{Event, EventSource, MembershipEvent, TOPIC_PREFIX};
