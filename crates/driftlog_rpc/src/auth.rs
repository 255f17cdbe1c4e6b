//! Authorization of log operations.
//!
//! Every append and read is checked against an [`Authorizer`] with the
//! connection's subject, the object `*` (the whole log) and the action.
//! A connection that never sends `Authenticate` acts as the anonymous
//! subject `""`.

use driftlog_protocol::Status;
use parking_lot::RwLock;
use std::collections::HashSet;

/// Object name for the whole log; also matches any object in a grant.
pub const OBJECT_WILDCARD: &str = "*";

/// Action checked before appends.
pub const APPEND_ACTION: &str = "append";

/// Action checked before reads and read streams.
pub const READ_ACTION: &str = "read";

/// Decides whether a subject may perform an action on an object.
pub trait Authorizer: Send + Sync {
    /// Returns `Ok(())` if permitted.
    ///
    /// # Errors
    ///
    /// Returns a `PermissionDenied` status otherwise.
    fn authorize(&self, subject: &str, object: &str, action: &str) -> Result<(), Status>;
}

/// Permits everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl Authorizer for AllowAll {
    fn authorize(&self, _subject: &str, _object: &str, _action: &str) -> Result<(), Status> {
        Ok(())
    }
}

/// In-memory access control list of `(subject, object, action)` grants.
///
/// Any field of a grant may be `*` to match every value.
///
/// # Example
///
/// ```
/// use driftlog_rpc::{AclAuthorizer, Authorizer};
///
/// let acl = AclAuthorizer::new()
///     .with_grant("root", "*", "*")
///     .with_grant("reader", "*", "read");
///
/// assert!(acl.authorize("root", "*", "append").is_ok());
/// assert!(acl.authorize("reader", "*", "read").is_ok());
/// assert!(acl.authorize("reader", "*", "append").is_err());
/// ```
#[derive(Debug, Default)]
pub struct AclAuthorizer {
    grants: RwLock<HashSet<Grant>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Grant {
    subject: String,
    object: String,
    action: String,
}

impl Grant {
    fn matches(&self, subject: &str, object: &str, action: &str) -> bool {
        field_matches(&self.subject, subject)
            && field_matches(&self.object, object)
            && field_matches(&self.action, action)
    }
}

fn field_matches(granted: &str, requested: &str) -> bool {
    granted == OBJECT_WILDCARD || granted == requested
}

impl AclAuthorizer {
    /// Creates an empty ACL that denies everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a grant, builder style.
    #[must_use]
    pub fn with_grant(self, subject: &str, object: &str, action: &str) -> Self {
        self.grant(subject, object, action);
        self
    }

    /// Adds a grant.
    pub fn grant(&self, subject: &str, object: &str, action: &str) {
        self.grants.write().insert(Grant {
            subject: subject.to_string(),
            object: object.to_string(),
            action: action.to_string(),
        });
    }

    /// Removes a previously added grant. Returns true if it existed.
    pub fn revoke(&self, subject: &str, object: &str, action: &str) -> bool {
        self.grants.write().remove(&Grant {
            subject: subject.to_string(),
            object: object.to_string(),
            action: action.to_string(),
        })
    }

    /// Number of grants.
    #[must_use]
    pub fn len(&self) -> usize {
        self.grants.read().len()
    }

    /// Returns true if there are no grants.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.grants.read().is_empty()
    }
}

impl Authorizer for AclAuthorizer {
    fn authorize(&self, subject: &str, object: &str, action: &str) -> Result<(), Status> {
        let permitted = self
            .grants
            .read()
            .iter()
            .any(|grant| grant.matches(subject, object, action));
        if permitted {
            Ok(())
        } else {
            tracing::debug!(subject, object, action, "authorization denied");
            Err(Status::permission_denied(subject, object, action))
        }
    }
}
