//! Session provider and the two guard flavours used by handlers.
//!
//! Page routes call [`require_page`]; a denial becomes a redirect and the
//! handler body never runs. GraphQL actions call `graphql::require`, which
//! turns a denial into a structured error before any write happens.

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
};
use axum::response::{IntoResponse, Redirect, Response};
use axum_extra::extract::cookie::PrivateCookieJar;
use chrono::Utc;
use platform_authz::{AllowedVia, Denial, DenyReason, Gate, Permission, Session};
use platform_db::DbPool;
use tracing::{debug, error};
use uuid::Uuid;

use crate::http::AppState;

pub const SESSION_COOKIE: &str = "__Host-st_session";

/// What the session provider knows about the caller of one request.
#[derive(Clone, Debug)]
pub enum SessionState {
    Anonymous,
    Authenticated(Session),
    /// The session lookup itself failed; every check on this request denies.
    Unavailable,
}

impl SessionState {
    pub fn session(&self) -> Option<&Session> {
        match self {
            SessionState::Authenticated(session) => Some(session),
            SessionState::Anonymous | SessionState::Unavailable => None,
        }
    }
}

pub async fn current_session(pool: &DbPool, jar: &PrivateCookieJar) -> SessionState {
    let Some(cookie) = jar.get(SESSION_COOKIE) else {
        return SessionState::Anonymous;
    };
    let Ok(session_id) = Uuid::parse_str(cookie.value()) else {
        debug!("malformed session cookie");
        return SessionState::Anonymous;
    };
    match platform_db::load_session(pool, session_id, Utc::now()).await {
        Ok(Some(session)) => SessionState::Authenticated(session),
        Ok(None) => SessionState::Anonymous,
        Err(err) => {
            error!(error = %err, "session lookup failed");
            SessionState::Unavailable
        }
    }
}

/// Run the gate for one permission against the request's session state.
pub async fn authorize(
    gate: &Gate,
    state: &SessionState,
    permission: Permission,
) -> Result<Session, Denial> {
    authorize_via(gate, state, permission)
        .await
        .map(|(session, _)| session)
}

/// [`authorize`], also reporting whether the permission or the super role
/// let the caller through.
pub async fn authorize_via(
    gate: &Gate,
    state: &SessionState,
    permission: Permission,
) -> Result<(Session, AllowedVia), Denial> {
    if let SessionState::Unavailable = state {
        return Err(Denial::store_unavailable(permission.to_string()));
    }
    let allowed = gate.check_permission(state.session(), permission).await?;
    let session = state
        .session()
        .cloned()
        .ok_or_else(|| Denial::new(DenyReason::Unauthenticated, permission.to_string()))?;
    Ok((session, allowed.via))
}

/// Page-level denial; renders as a redirect.
#[derive(Debug)]
pub struct PageDenied {
    pub denial: Denial,
    pub location: String,
}

impl IntoResponse for PageDenied {
    fn into_response(self) -> Response {
        Redirect::to(&self.location).into_response()
    }
}

pub async fn require_page(
    state: &AppState,
    jar: &PrivateCookieJar,
    permission: Permission,
) -> Result<Session, PageDenied> {
    let session_state = current_session(state.pool.as_ref(), jar).await;
    authorize(&state.gate, &session_state, permission)
        .await
        .map_err(|denial| {
            let location = denial.redirect_target(&state.config.redirects).to_string();
            debug!(reason = %denial.reason, %location, "page guard redirect");
            PageDenied { denial, location }
        })
}

pub fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::encode_b64(&rand::random::<[u8; 16]>())
        .map_err(|err| anyhow::anyhow!("salt generation failed: {err}"))?;
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|err| anyhow::anyhow!("password hashing failed: {err}"))?;
    Ok(hash.to_string())
}

pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    PasswordHash::new(stored_hash)
        .map(|parsed| {
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok()
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use platform_authz::{MemoryRoleStore, PermissionSet, RoleRecord, known};
    use std::sync::Arc;

    fn session(role_id: Uuid) -> Session {
        Session {
            session_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            role_id,
            org_id: Uuid::new_v4(),
            email: "desk@shiptrack.test".into(),
            name: None,
            phone: None,
        }
    }

    #[tokio::test]
    async fn unavailable_session_lookup_fails_closed() {
        let admin = RoleRecord::super_role(Uuid::new_v4(), "administrator");
        let gate = Gate::new(Arc::new(MemoryRoleStore::new().with_role(admin)));
        let denial = authorize(&gate, &SessionState::Unavailable, known::SHIPMENTS_READ)
            .await
            .unwrap_err();
        assert_eq!(denial.reason, DenyReason::StoreUnavailable);
    }

    #[tokio::test]
    async fn anonymous_is_unauthenticated() {
        let gate = Gate::new(Arc::new(MemoryRoleStore::new()));
        let denial = authorize(&gate, &SessionState::Anonymous, known::SHIPMENTS_READ)
            .await
            .unwrap_err();
        assert_eq!(denial.reason, DenyReason::Unauthenticated);
    }

    #[tokio::test]
    async fn authenticated_session_is_returned() {
        let role = RoleRecord::standard(
            Uuid::new_v4(),
            "viewer",
            PermissionSet::from_iter([known::SHIPMENTS_READ]),
        );
        let caller = session(role.id);
        let gate = Gate::new(Arc::new(MemoryRoleStore::new().with_role(role)));
        let state = SessionState::Authenticated(caller.clone());
        let granted = authorize(&gate, &state, known::SHIPMENTS_READ).await.unwrap();
        assert_eq!(granted, caller);
        let denial = authorize(&gate, &state, known::SHIPMENTS_DELETE).await.unwrap_err();
        assert_eq!(denial.reason, DenyReason::PermissionDenied);
    }

    #[tokio::test]
    async fn super_role_is_reported() {
        let admin = RoleRecord::super_role(Uuid::new_v4(), "administrator");
        let viewer = RoleRecord::standard(
            Uuid::new_v4(),
            "viewer",
            PermissionSet::from_iter([known::USERS_UPDATE]),
        );
        let root = SessionState::Authenticated(session(admin.id));
        let desk = SessionState::Authenticated(session(viewer.id));
        let gate = Gate::new(Arc::new(
            MemoryRoleStore::new().with_role(admin).with_role(viewer),
        ));
        let (_, via) = authorize_via(&gate, &root, known::USERS_UPDATE).await.unwrap();
        assert_eq!(via, AllowedVia::SuperRole);
        let (_, via) = authorize_via(&gate, &desk, known::USERS_UPDATE).await.unwrap();
        assert_eq!(via, AllowedVia::Permission);
    }

    #[test]
    fn password_round_trip() {
        let hash = hash_password("correct horse").unwrap();
        assert!(verify_password("correct horse", &hash));
        assert!(!verify_password("wrong horse", &hash));
        assert!(!verify_password("correct horse", "not-a-hash"));
    }
}
