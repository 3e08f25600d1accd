use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DenyReason {
    /// No authenticated caller.
    Unauthenticated,
    /// Role missing, deleted or inactive.
    RoleInvalid,
    /// Role valid but the required permission is not in its set.
    PermissionDenied,
    /// Backing lookup failed or timed out.
    StoreUnavailable,
}

impl DenyReason {
    pub fn code(self) -> &'static str {
        match self {
            DenyReason::Unauthenticated => "UNAUTHENTICATED",
            DenyReason::RoleInvalid => "ROLE_INVALID",
            DenyReason::PermissionDenied => "PERMISSION_DENIED",
            DenyReason::StoreUnavailable => "STORE_UNAVAILABLE",
        }
    }
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// A negative decision. Returned to action callers as-is; page callers turn it
/// into a redirect through [`RedirectPaths`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{reason}: `{permission}` not granted")]
pub struct Denial {
    pub reason: DenyReason,
    pub permission: String,
}

impl Denial {
    pub fn new(reason: DenyReason, permission: impl Into<String>) -> Self {
        Self {
            reason,
            permission: permission.into(),
        }
    }

    /// Used by session providers whose own lookup failed before the gate ran.
    pub fn store_unavailable(permission: impl Into<String>) -> Self {
        Self::new(DenyReason::StoreUnavailable, permission)
    }

    pub fn redirect_target<'a>(&self, paths: &'a RedirectPaths) -> &'a str {
        match self.reason {
            DenyReason::Unauthenticated => &paths.login,
            DenyReason::RoleInvalid
            | DenyReason::PermissionDenied
            | DenyReason::StoreUnavailable => &paths.unauthorized,
        }
    }
}

/// Where page-level guards send denied callers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedirectPaths {
    pub login: String,
    pub unauthorized: String,
}

impl Default for RedirectPaths {
    fn default() -> Self {
        Self {
            login: "/login".into(),
            unauthorized: "/unauthorized".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_unauthenticated_goes_to_login() {
        let paths = RedirectPaths::default();
        let target = |reason| Denial::new(reason, "shipments.read").redirect_target(&paths).to_string();
        assert_eq!(target(DenyReason::Unauthenticated), "/login");
        assert_eq!(target(DenyReason::RoleInvalid), "/unauthorized");
        assert_eq!(target(DenyReason::PermissionDenied), "/unauthorized");
        assert_eq!(target(DenyReason::StoreUnavailable), "/unauthorized");
    }

    #[test]
    fn message_carries_code_and_permission() {
        let denial = Denial::new(DenyReason::PermissionDenied, "shipments.delete");
        assert_eq!(
            denial.to_string(),
            "PERMISSION_DENIED: `shipments.delete` not granted"
        );
    }
}
