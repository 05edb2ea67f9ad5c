//! Membership event types
//!
//! This module defines the domain events fired after a membership mutation
//! commits, and the generic envelope they travel in.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::bus::{EventBusError, EventBusResult};

/// Topic namespace shared by every membership event.
pub const TOPIC_PREFIX: &str = "roleset";

/// Kind of resource whose RoleSet produced an event.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EventSource {
    /// A space or subspace RoleSet
    Space,
    /// An organization RoleSet
    Organization,
    /// The platform RoleSet
    Platform,
}

impl EventSource {
    /// Get the string representation of the source.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventSource::Space => "space",
            EventSource::Organization => "organization",
            EventSource::Platform => "platform",
        }
    }
}

/// Event envelope.
///
/// All events are wrapped in this envelope which provides metadata
/// for routing and tracing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Unique event ID
    pub id: Uuid,

    /// Event type (e.g., "member.joined", "invitation.accepted")
    pub event_type: String,

    /// Source resource kind
    pub source: EventSource,

    /// Timestamp when event was created
    pub timestamp: DateTime<Utc>,

    /// RoleSet context
    pub role_set_id: Option<Uuid>,

    /// Actor the event is about
    pub actor_id: Option<Uuid>,

    /// Correlation ID for tracing
    pub correlation_id: Option<String>,

    /// Event version for schema evolution
    pub version: u32,

    /// Event payload
    pub payload: serde_json::Value,

    /// Additional metadata
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Event {
    /// Create a new event.
    ///
    /// # Arguments
    ///
    /// * `event_type` - The event type string
    /// * `source` - The source resource kind
    /// * `payload` - The event payload
    pub fn new(event_type: impl Into<String>, source: EventSource, payload: serde_json::Value) -> Self {
        Self {
            id: Uuid::now_v7(),
            event_type: event_type.into(),
            source,
            timestamp: Utc::now(),
            role_set_id: None,
            actor_id: None,
            correlation_id: None,
            version: 1,
            payload,
            metadata: HashMap::new(),
        }
    }

    /// Set RoleSet context.
    pub fn with_role_set(mut self, role_set_id: Uuid) -> Self {
        self.role_set_id = Some(role_set_id);
        self
    }

    /// Set actor context.
    pub fn with_actor(mut self, actor_id: Uuid) -> Self {
        self.actor_id = Some(actor_id);
        self
    }

    /// Set correlation ID.
    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    /// Add metadata.
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Get the topic for this event.
    ///
    /// Topics are structured as: `roleset.{event_type}`
    pub fn topic(&self) -> String {
        format!("{}.{}", TOPIC_PREFIX, self.event_type)
    }

    /// Parse the payload into a specific type.
    pub fn parse_payload<T: for<'de> Deserialize<'de>>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.payload.clone())
    }
}

// ============================================================================
// Membership Events
// ============================================================================

/// Domain events fired after a membership mutation commits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MembershipEvent {
    /// An actor joined the entry role of a RoleSet
    MemberJoined {
        role_set_id: Uuid,
        actor_id: Uuid,
        contributor_kind: String,
    },
    /// A role was granted
    RoleAssigned {
        role_set_id: Uuid,
        actor_id: Uuid,
        role_name: String,
    },
    /// A role was revoked
    RoleRemoved {
        role_set_id: Uuid,
        actor_id: Uuid,
        role_name: String,
    },
    /// An application was submitted
    ApplicationCreated {
        role_set_id: Uuid,
        application_id: Uuid,
        applicant_id: Uuid,
    },
    /// An application was rejected
    ApplicationDeclined {
        role_set_id: Uuid,
        application_id: Uuid,
        applicant_id: Uuid,
    },
    /// An invitation was issued
    InvitationCreated {
        role_set_id: Uuid,
        invitation_id: Uuid,
        invited_actor_id: Uuid,
        inviter_id: Uuid,
    },
    /// An invitation was accepted
    InvitationAccepted {
        role_set_id: Uuid,
        invitation_id: Uuid,
        invited_actor_id: Uuid,
    },
    /// An invitation was rejected
    InvitationDeclined {
        role_set_id: Uuid,
        invitation_id: Uuid,
        invited_actor_id: Uuid,
    },
    /// An invitation was sent to a not-yet-registered email
    PlatformInvitationCreated {
        role_set_id: Uuid,
        platform_invitation_id: Uuid,
        email: String,
    },
    /// A RoleSet and everything it owned was removed
    RoleSetRemoved { role_set_id: Uuid },
}

impl MembershipEvent {
    /// Event type string used to build the topic.
    pub fn event_type(&self) -> &'static str {
        match self {
            MembershipEvent::MemberJoined { .. } => "member.joined",
            MembershipEvent::RoleAssigned { .. } => "role.assigned",
            MembershipEvent::RoleRemoved { .. } => "role.removed",
            MembershipEvent::ApplicationCreated { .. } => "application.created",
            MembershipEvent::ApplicationDeclined { .. } => "application.declined",
            MembershipEvent::InvitationCreated { .. } => "invitation.created",
            MembershipEvent::InvitationAccepted { .. } => "invitation.accepted",
            MembershipEvent::InvitationDeclined { .. } => "invitation.declined",
            MembershipEvent::PlatformInvitationCreated { .. } => "platform_invitation.created",
            MembershipEvent::RoleSetRemoved { .. } => "role_set.removed",
        }
    }

    /// RoleSet the event concerns.
    pub fn role_set_id(&self) -> Uuid {
        match self {
            MembershipEvent::MemberJoined { role_set_id, .. }
            | MembershipEvent::RoleAssigned { role_set_id, .. }
            | MembershipEvent::RoleRemoved { role_set_id, .. }
            | MembershipEvent::ApplicationCreated { role_set_id, .. }
            | MembershipEvent::ApplicationDeclined { role_set_id, .. }
            | MembershipEvent::InvitationCreated { role_set_id, .. }
            | MembershipEvent::InvitationAccepted { role_set_id, .. }
            | MembershipEvent::InvitationDeclined { role_set_id, .. }
            | MembershipEvent::PlatformInvitationCreated { role_set_id, .. }
            | MembershipEvent::RoleSetRemoved { role_set_id } => *role_set_id,
        }
    }

    /// Actor the event is about, if any.
    pub fn actor_id(&self) -> Option<Uuid> {
        match self {
            MembershipEvent::MemberJoined { actor_id, .. }
            | MembershipEvent::RoleAssigned { actor_id, .. }
            | MembershipEvent::RoleRemoved { actor_id, .. } => Some(*actor_id),
            MembershipEvent::ApplicationCreated { applicant_id, .. }
            | MembershipEvent::ApplicationDeclined { applicant_id, .. } => Some(*applicant_id),
            MembershipEvent::InvitationCreated { invited_actor_id, .. }
            | MembershipEvent::InvitationAccepted { invited_actor_id, .. }
            | MembershipEvent::InvitationDeclined { invited_actor_id, .. } => {
                Some(*invited_actor_id)
            }
            MembershipEvent::PlatformInvitationCreated { .. }
            | MembershipEvent::RoleSetRemoved { .. } => None,
        }
    }

    /// Convert to generic event.
    pub fn to_event(&self, source: EventSource) -> EventBusResult<Event> {
        let payload = serde_json::to_value(self)
            .map_err(|e| EventBusError::SerializationError(e.to_string()))?;

        let mut event = Event::new(self.event_type(), source, payload).with_role_set(self.role_set_id());
        if let Some(actor_id) = self.actor_id() {
            event = event.with_actor(actor_id);
        }
        Ok(event)
    }
}
