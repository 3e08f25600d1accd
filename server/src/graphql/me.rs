use async_graphql::{Context, ErrorExtensions, ID, Object, SimpleObject};
use entity::roles;
use platform_api::ApiError;
use platform_authz::{Denial, DenyReason, Session};
use sea_orm::EntityTrait;
use tracing::instrument;

use crate::auth::SessionState;
use crate::graphql::{db_error, graphql_data};

#[derive(Clone, Debug, SimpleObject)]
pub struct MePayload {
    pub id: ID,
    pub email: String,
    pub name: Option<String>,
    pub phone: Option<String>,
    #[graphql(name = "orgId")]
    pub org_id: ID,
    pub role: Option<RoleSummary>,
}

#[derive(Clone, Debug, SimpleObject)]
pub struct RoleSummary {
    pub id: ID,
    pub name: String,
    #[graphql(name = "machineName")]
    pub machine_name: String,
    #[graphql(name = "isSuper")]
    pub is_super: bool,
    pub permissions: Vec<String>,
}

impl From<roles::Model> for RoleSummary {
    fn from(model: roles::Model) -> Self {
        Self {
            id: ID::from(model.id.to_string()),
            name: model.name,
            machine_name: model.machine_name,
            is_super: model.is_super,
            permissions: model.permissions,
        }
    }
}

#[derive(Default)]
pub struct MeQuery;

#[Object]
impl MeQuery {
    /// The signed-in caller. Needs a session but no particular permission.
    #[instrument(name = "graphql.me", skip_all)]
    async fn me(&self, ctx: &Context<'_>) -> async_graphql::Result<MePayload> {
        let session = signed_in(ctx)?;
        let data = graphql_data(ctx)?;
        let role = roles::Entity::find_by_id(session.role_id)
            .one(data.pool.as_ref())
            .await
            .map_err(db_error)?
            .filter(|role| role.org_id == session.org_id)
            .map(RoleSummary::from);
        Ok(MePayload {
            id: ID::from(session.user_id.to_string()),
            email: session.email,
            name: session.name,
            phone: session.phone,
            org_id: ID::from(session.org_id.to_string()),
            role,
        })
    }
}

fn signed_in(ctx: &Context<'_>) -> async_graphql::Result<Session> {
    match ctx.data_opt::<SessionState>() {
        Some(SessionState::Authenticated(session)) => Ok(session.clone()),
        Some(SessionState::Unavailable) => {
            Err(ApiError::from(Denial::store_unavailable("session")).extend())
        }
        Some(SessionState::Anonymous) | None => {
            Err(ApiError::from(Denial::new(DenyReason::Unauthenticated, "session")).extend())
        }
    }
}
