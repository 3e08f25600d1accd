//! Authorization gate for shipment dashboard pages and actions.
//!
//! Every guarded handler calls [`Gate`] with the one permission it needs before
//! touching data. Decisions fail closed: missing sessions, unknown or inactive
//! roles and store trouble all come back as a [`Denial`].

pub mod denial;
pub mod gate;
pub mod permission;
pub mod role;
pub mod session;
pub mod store;

pub use denial::{Denial, DenyReason, RedirectPaths};
pub use gate::{Allowed, AllowedVia, DEFAULT_LOOKUP_TIMEOUT, Gate};
pub use permission::{Action, Permission, PermissionParseError, PermissionSet, Resource, known};
pub use role::{RoleGrant, RoleRecord};
pub use session::Session;
pub use store::{MemoryRoleStore, RoleStore, StoreError, StoreResult};
