//! Closed permission vocabulary.
//!
//! Every permission is a `resource.action` pair where both halves come from a
//! fixed list. Parsing rejects anything else so a typo in a role definition is
//! caught when the role is written instead of silently denying forever.

use std::{collections::BTreeSet, fmt, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PermissionParseError {
    #[error("permission `{0}` is not of the form resource.action")]
    Malformed(String),
    #[error("unknown resource `{0}`")]
    UnknownResource(String),
    #[error("unknown action `{0}`")]
    UnknownAction(String),
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Resource {
    Shipments,
    Documents,
    AirFreight,
    SeaFreight,
    Users,
    Roles,
    Notifications,
}

impl Resource {
    pub const ALL: [Resource; 7] = [
        Resource::Shipments,
        Resource::Documents,
        Resource::AirFreight,
        Resource::SeaFreight,
        Resource::Users,
        Resource::Roles,
        Resource::Notifications,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Resource::Shipments => "shipments",
            Resource::Documents => "documents",
            Resource::AirFreight => "air_freight",
            Resource::SeaFreight => "sea_freight",
            Resource::Users => "users",
            Resource::Roles => "roles",
            Resource::Notifications => "notifications",
        }
    }
}

impl FromStr for Resource {
    type Err = PermissionParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Resource::ALL
            .into_iter()
            .find(|r| r.as_str() == value)
            .ok_or_else(|| PermissionParseError::UnknownResource(value.to_string()))
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Action {
    Read,
    Create,
    Update,
    Delete,
}

impl Action {
    pub const ALL: [Action; 4] = [Action::Read, Action::Create, Action::Update, Action::Delete];

    pub fn as_str(self) -> &'static str {
        match self {
            Action::Read => "read",
            Action::Create => "create",
            Action::Update => "update",
            Action::Delete => "delete",
        }
    }
}

impl FromStr for Action {
    type Err = PermissionParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Action::ALL
            .into_iter()
            .find(|a| a.as_str() == value)
            .ok_or_else(|| PermissionParseError::UnknownAction(value.to_string()))
    }
}

/// A single capability, e.g. `shipments.read`.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Permission {
    pub resource: Resource,
    pub action: Action,
}

impl Permission {
    pub const fn new(resource: Resource, action: Action) -> Self {
        Self { resource, action }
    }

    /// Every permission in the vocabulary.
    pub fn all() -> impl Iterator<Item = Permission> {
        Resource::ALL
            .into_iter()
            .flat_map(|r| Action::ALL.into_iter().map(move |a| Permission::new(r, a)))
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.resource.as_str(), self.action.as_str())
    }
}

impl FromStr for Permission {
    type Err = PermissionParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (resource, action) = value
            .split_once('.')
            .filter(|(r, a)| !r.is_empty() && !a.is_empty() && !a.contains('.'))
            .ok_or_else(|| PermissionParseError::Malformed(value.to_string()))?;
        Ok(Permission::new(resource.parse()?, action.parse()?))
    }
}

impl Serialize for Permission {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Permission {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

pub mod known {
    use super::{Action, Permission, Resource};

    pub const SHIPMENTS_READ: Permission = Permission::new(Resource::Shipments, Action::Read);
    pub const SHIPMENTS_CREATE: Permission = Permission::new(Resource::Shipments, Action::Create);
    pub const SHIPMENTS_UPDATE: Permission = Permission::new(Resource::Shipments, Action::Update);
    pub const SHIPMENTS_DELETE: Permission = Permission::new(Resource::Shipments, Action::Delete);
    pub const DOCUMENTS_READ: Permission = Permission::new(Resource::Documents, Action::Read);
    pub const DOCUMENTS_CREATE: Permission = Permission::new(Resource::Documents, Action::Create);
    pub const DOCUMENTS_DELETE: Permission = Permission::new(Resource::Documents, Action::Delete);
    pub const AIR_FREIGHT_READ: Permission = Permission::new(Resource::AirFreight, Action::Read);
    pub const SEA_FREIGHT_READ: Permission = Permission::new(Resource::SeaFreight, Action::Read);
    pub const USERS_READ: Permission = Permission::new(Resource::Users, Action::Read);
    pub const USERS_CREATE: Permission = Permission::new(Resource::Users, Action::Create);
    pub const USERS_UPDATE: Permission = Permission::new(Resource::Users, Action::Update);
    pub const ROLES_READ: Permission = Permission::new(Resource::Roles, Action::Read);
    pub const ROLES_CREATE: Permission = Permission::new(Resource::Roles, Action::Create);
    pub const ROLES_UPDATE: Permission = Permission::new(Resource::Roles, Action::Update);
    pub const ROLES_DELETE: Permission = Permission::new(Resource::Roles, Action::Delete);
    pub const NOTIFICATIONS_READ: Permission =
        Permission::new(Resource::Notifications, Action::Read);
    pub const NOTIFICATIONS_UPDATE: Permission =
        Permission::new(Resource::Notifications, Action::Update);
}

/// Permissions granted by a standard role.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionSet(BTreeSet<Permission>);

impl PermissionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a list of permission strings, failing on the first one outside the vocabulary.
    pub fn parse_all<I, S>(raw: I) -> Result<Self, PermissionParseError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        raw.into_iter()
            .map(|value| value.as_ref().trim().parse::<Permission>())
            .collect::<Result<BTreeSet<_>, _>>()
            .map(Self)
    }

    pub fn contains(&self, permission: &Permission) -> bool {
        self.0.contains(permission)
    }

    pub fn insert(&mut self, permission: Permission) -> bool {
        self.0.insert(permission)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Permission> {
        self.0.iter()
    }

    pub fn union(mut self, other: &PermissionSet) -> Self {
        self.0.extend(other.0.iter().copied());
        self
    }

    pub fn to_strings(&self) -> Vec<String> {
        self.0.iter().map(ToString::to_string).collect()
    }
}

impl FromIterator<Permission> for PermissionSet {
    fn from_iter<T: IntoIterator<Item = Permission>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}
