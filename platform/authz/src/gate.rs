use std::{sync::Arc, time::Duration};

use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::{
    denial::{Denial, DenyReason},
    permission::Permission,
    role::{RoleGrant, RoleRecord},
    session::Session,
    store::{RoleStore, StoreError},
};

pub const DEFAULT_LOOKUP_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AllowedVia {
    /// Required permission found in the role's set.
    Permission,
    /// Super role, no set membership consulted.
    SuperRole,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Allowed {
    pub user_id: Uuid,
    pub role_id: Uuid,
    pub via: AllowedVia,
}

/// Authorization gate. Stateless apart from the store handle; every call
/// re-resolves the role.
#[derive(Clone)]
pub struct Gate {
    store: Arc<dyn RoleStore>,
    lookup_timeout: Duration,
}

impl Gate {
    pub fn new(store: Arc<dyn RoleStore>) -> Self {
        Self {
            store,
            lookup_timeout: DEFAULT_LOOKUP_TIMEOUT,
        }
    }

    pub fn with_lookup_timeout(mut self, timeout: Duration) -> Self {
        self.lookup_timeout = timeout;
        self
    }

    /// Check a raw permission string. Strings outside the vocabulary are only
    /// ever granted to the super role.
    pub async fn check(&self, session: Option<&Session>, required: &str) -> Result<Allowed, Denial> {
        self.decide(session, required, required.parse().ok()).await
    }

    pub async fn check_permission(
        &self,
        session: Option<&Session>,
        required: Permission,
    ) -> Result<Allowed, Denial> {
        self.decide(session, &required.to_string(), Some(required))
            .await
    }

    /// Like [`Gate::check_permission`] but hands back the session on success,
    /// which is what guarded handlers want to keep working with.
    pub async fn require<'s>(
        &self,
        session: Option<&'s Session>,
        required: Permission,
    ) -> Result<&'s Session, Denial> {
        self.check_permission(session, required).await?;
        session.ok_or_else(|| Denial::new(DenyReason::Unauthenticated, required.to_string()))
    }

    #[instrument(
        name = "authz.check",
        skip_all,
        fields(
            permission = %raw,
            user_id = tracing::field::Empty,
            role_id = tracing::field::Empty
        )
    )]
    async fn decide(
        &self,
        session: Option<&Session>,
        raw: &str,
        required: Option<Permission>,
    ) -> Result<Allowed, Denial> {
        let Some(session) = session else {
            debug!("no session");
            return Err(Denial::new(DenyReason::Unauthenticated, raw));
        };
        let span = tracing::Span::current();
        span.record("user_id", tracing::field::display(session.user_id));
        span.record("role_id", tracing::field::display(session.role_id));

        let role = self.resolve_role(session.role_id, raw).await?;

        match &role.grant {
            RoleGrant::Super => {
                info!(role = %role.machine_name, "super role bypass");
                Ok(Allowed {
                    user_id: session.user_id,
                    role_id: role.id,
                    via: AllowedVia::SuperRole,
                })
            }
            RoleGrant::Standard(set) => match required {
                Some(perm) if set.contains(&perm) => Ok(Allowed {
                    user_id: session.user_id,
                    role_id: role.id,
                    via: AllowedVia::Permission,
                }),
                Some(_) => {
                    debug!(role = %role.machine_name, "permission not granted");
                    Err(Denial::new(DenyReason::PermissionDenied, raw))
                }
                None => {
                    warn!("required permission is outside the known vocabulary");
                    Err(Denial::new(DenyReason::PermissionDenied, raw))
                }
            },
        }
    }

    async fn resolve_role(&self, role_id: Uuid, raw: &str) -> Result<RoleRecord, Denial> {
        let lookup = tokio::time::timeout(self.lookup_timeout, self.store.role_by_id(role_id))
            .await
            .unwrap_or_else(|_| Err(StoreError::Timeout(self.lookup_timeout.as_millis())));
        match lookup {
            Ok(Some(role)) if role.active => Ok(role),
            Ok(Some(role)) => {
                warn!(role = %role.machine_name, "role inactive");
                Err(Denial::new(DenyReason::RoleInvalid, raw))
            }
            Ok(None) => {
                warn!("role not found");
                Err(Denial::new(DenyReason::RoleInvalid, raw))
            }
            Err(err) => {
                error!(error = %err, "role lookup failed, denying");
                Err(Denial::new(DenyReason::StoreUnavailable, raw))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        permission::{PermissionSet, known},
        store::{MemoryRoleStore, StoreResult},
    };
    use async_trait::async_trait;

    struct FailingStore;

    #[async_trait]
    impl RoleStore for FailingStore {
        async fn role_by_id(&self, _role_id: Uuid) -> StoreResult<Option<RoleRecord>> {
            Err(StoreError::Unavailable("connection refused".into()))
        }
    }

    struct HangingStore;

    #[async_trait]
    impl RoleStore for HangingStore {
        async fn role_by_id(&self, _role_id: Uuid) -> StoreResult<Option<RoleRecord>> {
            std::future::pending().await
        }
    }

    fn session_for(role_id: Uuid) -> Session {
        Session {
            session_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            role_id,
            org_id: Uuid::new_v4(),
            email: "ops@shiptrack.test".into(),
            name: Some("Ops".into()),
            phone: None,
        }
    }

    fn editor() -> RoleRecord {
        RoleRecord::standard(
            Uuid::new_v4(),
            "editor",
            PermissionSet::parse_all(["shipments.read", "documents.create"]).unwrap(),
        )
    }

    fn gate_with(roles: impl IntoIterator<Item = RoleRecord>) -> Gate {
        let store = roles
            .into_iter()
            .fold(MemoryRoleStore::new(), MemoryRoleStore::with_role);
        Gate::new(Arc::new(store))
    }

    fn reason(result: Result<Allowed, Denial>) -> DenyReason {
        result.expect_err("expected denial").reason
    }

    #[tokio::test]
    async fn editor_reads_but_cannot_delete() {
        let role = editor();
        let session = session_for(role.id);
        let gate = gate_with([role]);

        let allowed = gate.check(Some(&session), "shipments.read").await.unwrap();
        assert_eq!(allowed.via, AllowedVia::Permission);
        assert_eq!(allowed.user_id, session.user_id);

        let denied = gate.check(Some(&session), "shipments.delete").await;
        assert_eq!(reason(denied), DenyReason::PermissionDenied);
    }

    #[tokio::test]
    async fn missing_session_is_unauthenticated_for_everything() {
        let gate = gate_with([editor()]);
        for perm in Permission::all() {
            let denied = gate.check_permission(None, perm).await;
            assert_eq!(reason(denied), DenyReason::Unauthenticated);
        }
        assert_eq!(
            reason(gate.check(None, "not.a.permission").await),
            DenyReason::Unauthenticated
        );
    }

    #[tokio::test]
    async fn standard_role_allows_exactly_its_set() {
        let role = editor();
        let session = session_for(role.id);
        let granted = match &role.grant {
            RoleGrant::Standard(set) => set.clone(),
            RoleGrant::Super => unreachable!(),
        };
        let gate = gate_with([role]);
        for perm in Permission::all() {
            let result = gate.check_permission(Some(&session), perm).await;
            assert_eq!(result.is_ok(), granted.contains(&perm), "{perm}");
        }
    }

    #[tokio::test]
    async fn super_role_allows_unknown_and_malformed_strings() {
        let admin = RoleRecord::super_role(Uuid::new_v4(), "administrator");
        let session = session_for(admin.id);
        let gate = gate_with([admin]);
        for raw in ["shipments.delete", "billing.export", "garbage", ""] {
            let allowed = gate.check(Some(&session), raw).await.unwrap();
            assert_eq!(allowed.via, AllowedVia::SuperRole, "{raw}");
        }
    }

    #[tokio::test]
    async fn unknown_string_never_matches_standard_role() {
        let role = editor();
        let session = session_for(role.id);
        let gate = gate_with([role]);
        let denied = gate.check(Some(&session), "shipments.reads").await;
        assert_eq!(reason(denied), DenyReason::PermissionDenied);
    }

    #[tokio::test]
    async fn deleted_role_is_invalid() {
        let role = editor();
        let session = session_for(role.id);
        let store = Arc::new(MemoryRoleStore::new().with_role(role.clone()));
        let gate = Gate::new(store.clone());
        assert!(gate.check(Some(&session), "shipments.read").await.is_ok());

        store.remove(role.id).await;
        let denied = gate.check(Some(&session), "shipments.read").await;
        assert_eq!(reason(denied), DenyReason::RoleInvalid);
    }

    #[tokio::test]
    async fn inactive_role_is_invalid_even_for_super() {
        let admin = RoleRecord::super_role(Uuid::new_v4(), "administrator").inactive();
        let session = session_for(admin.id);
        let gate = gate_with([admin]);
        let denied = gate.check(Some(&session), "shipments.read").await;
        assert_eq!(reason(denied), DenyReason::RoleInvalid);
    }

    #[tokio::test]
    async fn store_failure_fails_closed() {
        let gate = Gate::new(Arc::new(FailingStore));
        let session = session_for(Uuid::new_v4());
        let denied = gate.check(Some(&session), "shipments.read").await;
        assert_eq!(reason(denied), DenyReason::StoreUnavailable);
    }

    #[tokio::test]
    async fn store_timeout_fails_closed() {
        let gate =
            Gate::new(Arc::new(HangingStore)).with_lookup_timeout(Duration::from_millis(20));
        let session = session_for(Uuid::new_v4());
        let denied = gate.check_permission(Some(&session), known::SHIPMENTS_READ).await;
        assert_eq!(reason(denied), DenyReason::StoreUnavailable);
    }

    #[tokio::test]
    async fn repeated_checks_agree_until_role_changes() {
        let role = editor();
        let session = session_for(role.id);
        let store = Arc::new(MemoryRoleStore::new().with_role(role.clone()));
        let gate = Gate::new(store.clone());

        let first = gate.check(Some(&session), "documents.create").await;
        let second = gate.check(Some(&session), "documents.create").await;
        assert_eq!(first, second);

        let mut narrowed = role;
        narrowed.grant = RoleGrant::Standard(PermissionSet::from_iter([known::SHIPMENTS_READ]));
        store.upsert(narrowed).await;
        let third = gate.check(Some(&session), "documents.create").await;
        assert_eq!(reason(third), DenyReason::PermissionDenied);
    }

    #[tokio::test]
    async fn require_returns_the_session() {
        let role = editor();
        let session = session_for(role.id);
        let gate = gate_with([role]);
        let returned = gate
            .require(Some(&session), known::DOCUMENTS_CREATE)
            .await
            .unwrap();
        assert_eq!(returned, &session);
        let denied = gate.require(Some(&session), known::ROLES_UPDATE).await;
        assert_eq!(denied.unwrap_err().reason, DenyReason::PermissionDenied);
    }

    #[tokio::test]
    async fn default_super_role_check_reads_grant() {
        let admin = RoleRecord::super_role(Uuid::new_v4(), "administrator");
        let role = editor();
        let store = MemoryRoleStore::new()
            .with_role(admin.clone())
            .with_role(role.clone());
        assert!(store.is_super_role(admin.id).await.unwrap());
        assert!(!store.is_super_role(role.id).await.unwrap());
        assert!(!store.is_super_role(Uuid::new_v4()).await.unwrap());
    }
}
