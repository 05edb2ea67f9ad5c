//! # Credentials
//!
//! Credentials are typed, resource-scoped grants issued to an actor. Role
//! definitions and authorization rules refer to them through
//! [`CredentialDefinition`] predicates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Well-known credential types.
pub mod credential_types {
    /// Held by every identified actor, scoped to its own id.
    pub const USER_SELF: &str = "user-self";

    /// Held by an actor with an open invitation to a space RoleSet.
    pub const SPACE_MEMBER_INVITEE: &str = "space-member-invitee";

    /// Held by an admin of any child RoleSet, scoped to the parent space.
    pub const SPACE_SUBSPACE_ADMIN: &str = "space-subspace-admin";

    /// Held by an admin or owner of an organization RoleSet.
    pub const ACCOUNT_ADMIN: &str = "account-admin";
}

/// A credential issued to an actor.
///
/// # Example
///
/// ```
/// use roleset_authz::credentials::Credential;
///
/// let credential = Credential::new("space-member", "space-1");
/// assert!(credential.is_valid());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Credential {
    /// Unique credential ID
    pub id: Uuid,

    /// Credential type (e.g. "space-member")
    #[serde(rename = "type")]
    pub credential_type: String,

    /// Resource the credential is scoped to
    pub resource_id: String,

    /// When the credential was issued
    pub issued_at: DateTime<Utc>,

    /// Optional expiry; expired credentials are not valid
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl Credential {
    /// Issue a new, non-expiring credential.
    pub fn new(credential_type: impl Into<String>, resource_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            credential_type: credential_type.into(),
            resource_id: resource_id.into(),
            issued_at: Utc::now(),
            expires_at: None,
        }
    }

    /// Set an expiry on this credential.
    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Check whether the credential has not expired.
    pub fn is_valid(&self) -> bool {
        self.expires_at.map_or(true, |expiry| expiry > Utc::now())
    }

    /// The `{type, resourceID}` pair this credential carries.
    pub fn definition(&self) -> CredentialDefinition {
        CredentialDefinition::new(self.credential_type.clone(), self.resource_id.clone())
    }
}

/// A credential predicate `{type, resourceID}`.
///
/// An empty `resource_id` is a wildcard: it is satisfied by any credential of
/// the same type. The reverse does not hold: a credential with an empty
/// resource ID does not satisfy a predicate scoped to a specific resource.
///
/// # Example
///
/// ```
/// use roleset_authz::credentials::{Credential, CredentialDefinition};
///
/// let scoped = CredentialDefinition::new("space-member", "space-1");
/// let wildcard = CredentialDefinition::any("space-member");
/// let credential = Credential::new("space-member", "space-2");
///
/// assert!(!scoped.is_satisfied_by(&credential));
/// assert!(wildcard.is_satisfied_by(&credential));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct CredentialDefinition {
    /// Credential type to match
    #[serde(rename = "type")]
    pub credential_type: String,

    /// Resource to match; empty matches any resource
    #[serde(default)]
    pub resource_id: String,
}

impl CredentialDefinition {
    /// Create a predicate scoped to one resource.
    pub fn new(credential_type: impl Into<String>, resource_id: impl Into<String>) -> Self {
        Self {
            credential_type: credential_type.into(),
            resource_id: resource_id.into(),
        }
    }

    /// Create a wildcard predicate matching any resource of this type.
    pub fn any(credential_type: impl Into<String>) -> Self {
        Self::new(credential_type, "")
    }

    /// Check if the predicate is a resource wildcard.
    pub fn is_wildcard(&self) -> bool {
        self.resource_id.is_empty()
    }

    /// Check if a credential satisfies this predicate.
    ///
    /// Matches iff the types are equal and the predicate is a wildcard or the
    /// resource IDs are equal. Expiry is not considered here.
    pub fn is_satisfied_by(&self, credential: &Credential) -> bool {
        if self.credential_type != credential.credential_type {
            return false;
        }
        self.is_wildcard() || self.resource_id == credential.resource_id
    }

    /// Check if any valid credential in the slice satisfies this predicate.
    pub fn is_satisfied_by_any(&self, credentials: &[Credential]) -> bool {
        credentials
            .iter()
            .any(|c| c.is_valid() && self.is_satisfied_by(c))
    }

    /// Issue a credential for this definition.
    ///
    /// Issuing from a wildcard produces a credential with an empty resource.
    pub fn issue(&self) -> Credential {
        Credential::new(self.credential_type.clone(), self.resource_id.clone())
    }
}

impl std::fmt::Display for CredentialDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_wildcard() {
            write!(f, "{}:*", self.credential_type)
        } else {
            write!(f, "{}:{}", self.credential_type, self.resource_id)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_exact_match() {
        let def = CredentialDefinition::new("space-member", "space-1");
        assert!(def.is_satisfied_by(&Credential::new("space-member", "space-1")));
    }

    #[test]
    fn test_type_mismatch() {
        let def = CredentialDefinition::new("space-member", "space-1");
        assert!(!def.is_satisfied_by(&Credential::new("space-admin", "space-1")));
    }

    #[test]
    fn test_resource_mismatch() {
        let def = CredentialDefinition::new("space-member", "space-1");
        assert!(!def.is_satisfied_by(&Credential::new("space-member", "space-2")));
    }

    #[test]
    fn test_wildcard_predicate() {
        let def = CredentialDefinition::any("global-admin");
        assert!(def.is_wildcard());
        assert!(def.is_satisfied_by(&Credential::new("global-admin", "anything")));
        assert!(def.is_satisfied_by(&Credential::new("global-admin", "")));
    }

    #[test]
    fn test_empty_credential_resource_does_not_match_scoped_predicate() {
        let def = CredentialDefinition::new("space-member", "space-1");
        assert!(!def.is_satisfied_by(&Credential::new("space-member", "")));
    }

    #[test]
    fn test_expired_credentials_are_ignored() {
        let def = CredentialDefinition::new("space-member", "space-1");
        let expired = Credential::new("space-member", "space-1")
            .with_expiry(Utc::now() - Duration::hours(1));

        assert!(!expired.is_valid());
        assert!(def.is_satisfied_by(&expired));
        assert!(!def.is_satisfied_by_any(&[expired]));
    }

    #[test]
    fn test_display() {
        assert_eq!(
            CredentialDefinition::new("space-member", "space-1").to_string(),
            "space-member:space-1"
        );
        assert_eq!(CredentialDefinition::any("global-admin").to_string(), "global-admin:*");
    }
}
