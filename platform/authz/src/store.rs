use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::role::RoleRecord;

#[derive(Debug, Error, Clone)]
pub enum StoreError {
    #[error("role store unreachable: {0}")]
    Unavailable(String),
    #[error("role store lookup timed out after {0} ms")]
    Timeout(u128),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Read side of the role/permission store.
#[async_trait]
pub trait RoleStore: Send + Sync {
    /// `Ok(None)` when the role does not exist.
    async fn role_by_id(&self, role_id: Uuid) -> StoreResult<Option<RoleRecord>>;

    async fn is_super_role(&self, role_id: Uuid) -> StoreResult<bool> {
        Ok(self
            .role_by_id(role_id)
            .await?
            .is_some_and(|role| role.active && role.grant.is_super()))
    }
}

/// In-process store, used by tests and local tooling.
#[derive(Default, Debug)]
pub struct MemoryRoleStore {
    roles: RwLock<HashMap<Uuid, RoleRecord>>,
}

impl MemoryRoleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_role(mut self, role: RoleRecord) -> Self {
        self.roles.get_mut().insert(role.id, role);
        self
    }

    pub async fn upsert(&self, role: RoleRecord) {
        self.roles.write().await.insert(role.id, role);
    }

    pub async fn remove(&self, role_id: Uuid) -> Option<RoleRecord> {
        self.roles.write().await.remove(&role_id)
    }
}

#[async_trait]
impl RoleStore for MemoryRoleStore {
    async fn role_by_id(&self, role_id: Uuid) -> StoreResult<Option<RoleRecord>> {
        Ok(self.roles.read().await.get(&role_id).cloned())
    }
}
