//! Authorization hook for record edits.
//!
//! Renew and delete must prove the right to mutate a record. The shipped
//! policy is token-based: a record registered with a `client-uuid` can
//! only be edited by presenting the same token; a record without one is
//! open. Deployments with real identity plug in their own [`Authorizer`].

use slookup_core::Record;

/// Decides whether an edit of `stored` is allowed.
///
/// Used as `Arc<dyn Authorizer>`.
pub trait Authorizer: Send + Sync {
    /// `presented` is the token carried by the edit request, if any.
    fn authorize(&self, stored: &Record, presented: Option<&str>) -> bool;
}

/// Access-token policy: a stored token demands an exact match.
///
/// Never permissive when a token exists -- a missing or mismatched
/// presentation is denied.
pub struct TokenAuthorizer;

impl Authorizer for TokenAuthorizer {
    fn authorize(&self, stored: &Record, presented: Option<&str>) -> bool {
        match stored.client_uuid() {
            None => true,
            Some(token) => presented == Some(token),
        }
    }
}

/// Denies everything. For tests exercising the rejection paths.
#[cfg(test)]
pub struct DenyAll;

#[cfg(test)]
impl Authorizer for DenyAll {
    fn authorize(&self, _stored: &Record, _presented: Option<&str>) -> bool {
        false
    }
}
