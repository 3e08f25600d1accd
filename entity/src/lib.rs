//! sea-orm entities for the shipment dashboard.

pub mod documents;
pub mod notifications;
pub mod orgs;
pub mod roles;
pub mod sessions;
pub mod shipments;
pub mod user_secrets;
pub mod users;
