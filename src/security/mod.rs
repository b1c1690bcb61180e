//! Caller identity tokens
//!
//! Every registration carries a [`CallerContext`]: either the trusted marker
//! or an opaque [`SecurityContext`] captured from the caller. The token is
//! stored with the registration entry and handed back on every delivery, so
//! consumers never rely on thread-local state to learn who asked for data.

use std::collections::HashSet;

use parking_lot::RwLock;

/// Opaque permission-scope token
///
/// Copyable and comparable; the pipeline never interprets its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SecurityContext(u64);

impl SecurityContext {
    /// Create a token for the given scope
    pub const fn new(scope: u64) -> Self {
        Self(scope)
    }

    /// Raw scope value
    pub fn scope(&self) -> u64 {
        self.0
    }
}

/// Identity captured at registration time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CallerContext {
    /// Trusted caller; never subject to identity checks
    #[default]
    Trusted,
    /// Caller restricted to a permission scope
    Scoped(SecurityContext),
}

impl CallerContext {
    /// Build from an optional captured context (`None` means trusted)
    pub fn from_captured(context: Option<SecurityContext>) -> Self {
        match context {
            Some(ctx) => CallerContext::Scoped(ctx),
            None => CallerContext::Trusted,
        }
    }

    pub fn is_trusted(&self) -> bool {
        matches!(self, CallerContext::Trusted)
    }

    /// Returns true if re-registering under `other` must be refused
    ///
    /// Only two distinct scoped tokens conflict; the trusted marker on either
    /// side refreshes the existing entry.
    pub fn conflicts_with(&self, other: &CallerContext) -> bool {
        match (self, other) {
            (CallerContext::Scoped(a), CallerContext::Scoped(b)) => a != b,
            _ => false,
        }
    }
}

/// Source of caller identities and permission checks
pub trait IdentityProvider: Send + Sync {
    /// Capture the context of the current caller (`None` for trusted callers)
    fn capture_current_context(&self) -> Option<SecurityContext>;

    /// Whether data may still be delivered under `context`
    ///
    /// Called with the source's lock held; must not call back into the
    /// source.
    fn check_allowed(&self, context: &SecurityContext) -> bool;
}

/// Provider that treats every caller as trusted
#[derive(Debug, Clone, Copy, Default)]
pub struct TrustAll;

impl IdentityProvider for TrustAll {
    fn capture_current_context(&self) -> Option<SecurityContext> {
        None
    }

    fn check_allowed(&self, _context: &SecurityContext) -> bool {
        true
    }
}

/// Provider with an explicitly set current scope and a revocation list
#[derive(Debug, Default)]
pub struct ScopePolicy {
    current: RwLock<Option<SecurityContext>>,
    revoked: RwLock<HashSet<SecurityContext>>,
}

impl ScopePolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the context returned by [`IdentityProvider::capture_current_context`]
    pub fn set_current(&self, context: Option<SecurityContext>) {
        *self.current.write() = context;
    }

    /// Revoke a scope; deliveries under it stop
    pub fn revoke(&self, context: SecurityContext) {
        self.revoked.write().insert(context);
    }

    /// Allow a previously revoked scope again
    pub fn restore(&self, context: &SecurityContext) {
        self.revoked.write().remove(context);
    }
}

impl IdentityProvider for ScopePolicy {
    fn capture_current_context(&self) -> Option<SecurityContext> {
        *self.current.read()
    }

    fn check_allowed(&self, context: &SecurityContext) -> bool {
        !self.revoked.read().contains(context)
    }
}
