use async_trait::async_trait;
use entity::roles;
use platform_authz::{Permission, PermissionSet, RoleGrant, RoleRecord, RoleStore, StoreError, StoreResult};
use sea_orm::EntityTrait;
use tracing::warn;
use uuid::Uuid;

use crate::SharedPool;

/// [`RoleStore`] over the `roles` table.
#[derive(Clone, Debug)]
pub struct SeaRoleStore {
    pool: SharedPool,
}

impl SeaRoleStore {
    pub fn new(pool: SharedPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RoleStore for SeaRoleStore {
    async fn role_by_id(&self, role_id: Uuid) -> StoreResult<Option<RoleRecord>> {
        let model = roles::Entity::find_by_id(role_id)
            .one(self.pool.as_ref())
            .await
            .map_err(|err| StoreError::Unavailable(err.to_string()))?;
        Ok(model.map(role_record))
    }
}

/// Map a stored role to what the gate consumes.
///
/// Strings outside the vocabulary are dropped with a warning; they could never
/// match a required permission anyway.
pub fn role_record(model: roles::Model) -> RoleRecord {
    let grant = if model.is_super {
        RoleGrant::Super
    } else {
        let mut set = PermissionSet::new();
        for raw in &model.permissions {
            match raw.parse::<Permission>() {
                Ok(perm) => {
                    set.insert(perm);
                }
                Err(err) => {
                    warn!(role = %model.machine_name, error = %err, "ignoring stored permission");
                }
            }
        }
        RoleGrant::Standard(set)
    };
    RoleRecord {
        id: model.id,
        name: model.name,
        machine_name: model.machine_name,
        active: model.is_active,
        grant,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use chrono::Utc;
    use platform_authz::known;
    use sea_orm::{DatabaseBackend, DbErr, MockDatabase};

    fn role_model(is_super: bool, permissions: &[&str]) -> roles::Model {
        let now = Utc::now().into();
        roles::Model {
            id: Uuid::new_v4(),
            org_id: Uuid::new_v4(),
            name: "Editor".into(),
            machine_name: "editor".into(),
            is_active: true,
            is_super,
            permissions: permissions.iter().map(|p| p.to_string()).collect(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn stored_typos_are_dropped() {
        let record = role_record(role_model(false, &["shipments.read", "shipmnets.delete"]));
        let RoleGrant::Standard(set) = record.grant else {
            panic!("expected standard role");
        };
        assert_eq!(set.len(), 1);
        assert!(set.contains(&known::SHIPMENTS_READ));
    }

    #[test]
    fn super_flag_wins_over_permission_list() {
        let record = role_record(role_model(true, &["shipments.read"]));
        assert_eq!(record.grant, RoleGrant::Super);
    }

    #[tokio::test]
    async fn loads_role_by_id() {
        let model = role_model(false, &["documents.create"]);
        let id = model.id;
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![model]])
            .into_connection();
        let store = SeaRoleStore::new(Arc::new(db));
        let record = store.role_by_id(id).await.unwrap().expect("role");
        assert_eq!(record.machine_name, "editor");
        assert!(record.active);
    }

    #[tokio::test]
    async fn clones_share_one_connection() {
        let model = role_model(false, &["shipments.read"]);
        let id = model.id;
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![model.clone()], vec![model]])
            .into_connection();
        let store = SeaRoleStore::new(Arc::new(db));
        let copy = store.clone();
        assert!(store.role_by_id(id).await.unwrap().is_some());
        assert!(copy.role_by_id(id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn missing_role_is_none() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([Vec::<roles::Model>::new()])
            .into_connection();
        let store = SeaRoleStore::new(Arc::new(db));
        assert!(store.role_by_id(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn query_failure_is_unavailable() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_errors([DbErr::Custom("connection reset".into())])
            .into_connection();
        let store = SeaRoleStore::new(Arc::new(db));
        let err = store.role_by_id(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(msg) if msg.contains("connection reset")));
    }
}
