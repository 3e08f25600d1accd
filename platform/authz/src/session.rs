use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An authenticated caller, as issued by the session provider.
///
/// One role per user: the session carries the single role id assigned to the
/// user at the time the session was loaded.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub session_id: Uuid,
    pub user_id: Uuid,
    pub role_id: Uuid,
    pub org_id: Uuid,
    pub email: String,
    pub name: Option<String>,
    pub phone: Option<String>,
}
