use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::permission::PermissionSet;

/// What a role grants. `Super` skips the membership test entirely; the gate
/// matches on this in one place.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "permissions", rename_all = "snake_case")]
pub enum RoleGrant {
    Super,
    Standard(PermissionSet),
}

impl RoleGrant {
    pub fn is_super(&self) -> bool {
        matches!(self, RoleGrant::Super)
    }
}

/// A role as the gate sees it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleRecord {
    pub id: Uuid,
    pub name: String,
    pub machine_name: String,
    pub active: bool,
    pub grant: RoleGrant,
}

impl RoleRecord {
    pub fn standard(
        id: Uuid,
        machine_name: impl Into<String>,
        permissions: PermissionSet,
    ) -> Self {
        let machine_name = machine_name.into();
        Self {
            id,
            name: machine_name.clone(),
            machine_name,
            active: true,
            grant: RoleGrant::Standard(permissions),
        }
    }

    pub fn super_role(id: Uuid, machine_name: impl Into<String>) -> Self {
        let machine_name = machine_name.into();
        Self {
            id,
            name: machine_name.clone(),
            machine_name,
            active: true,
            grant: RoleGrant::Super,
        }
    }

    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }
}
