//! GraphQL surface. Every resolver that touches data goes through
//! [`require`] first, so a denial surfaces as an error whose
//! `extensions.code` is the deny reason and nothing is read or written.

mod documents;
mod me;
mod notifications;
mod roles;
mod shipments;
mod users;

use anyhow::anyhow;
use async_graphql::{
    Context, EmptySubscription, Error, ErrorExtensions, ID, MergedObject, Object, Schema,
    SchemaBuilder, SimpleObject,
};
use platform_api::{ApiError, ApiResult, internal_error};
use platform_authz::{AllowedVia, Gate, Permission, Session};
use platform_db::SharedPool;
use sea_orm::DbErr;
use serde::Serialize;
use tracing::instrument;
use uuid::Uuid;

use crate::auth::{self, SessionState};

pub use shipments::{ShipmentFilter, ShipmentNode, find_shipment, list_shipments};

pub type SchemaType = Schema<QueryRoot, MutationRoot, EmptySubscription>;

/// Per-schema handles resolvers need.
#[derive(Clone)]
pub struct GraphqlData {
    pub pool: SharedPool,
    pub gate: Gate,
}

pub fn schema_builder() -> SchemaBuilder<QueryRoot, MutationRoot, EmptySubscription> {
    Schema::build(QueryRoot::default(), MutationRoot::default(), EmptySubscription)
}

pub fn build_schema(data: GraphqlData) -> SchemaType {
    schema_builder().data(data).finish()
}

#[derive(MergedObject, Default)]
pub struct QueryRoot(
    HealthQuery,
    me::MeQuery,
    shipments::ShipmentQuery,
    documents::DocumentQuery,
    roles::RoleQuery,
    users::UserQuery,
    notifications::NotificationQuery,
);

#[derive(MergedObject, Default)]
pub struct MutationRoot(
    shipments::ShipmentMutation,
    documents::DocumentMutation,
    roles::RoleMutation,
    users::UserMutation,
    notifications::NotificationMutation,
);

#[derive(Default)]
pub struct HealthQuery;

#[Object]
impl HealthQuery {
    #[instrument(name = "graphql.health", skip_all)]
    async fn health(&self) -> ApiResult<HealthPayload> {
        Ok(HealthPayload { ok: true })
    }

    #[instrument(name = "graphql.version", skip_all)]
    async fn version(&self) -> ApiResult<String> {
        Ok(env!("CARGO_PKG_VERSION").to_string())
    }
}

#[derive(Clone, Debug, SimpleObject, Serialize)]
pub struct HealthPayload {
    pub ok: bool,
}

pub(crate) fn graphql_data<'a>(ctx: &Context<'a>) -> async_graphql::Result<&'a GraphqlData> {
    ctx.data::<GraphqlData>()
        .map_err(|_| internal_error(anyhow!("missing graphql data")))
}

/// Check `permission` for the caller of this request.
pub(crate) async fn require(
    ctx: &Context<'_>,
    permission: Permission,
) -> async_graphql::Result<Session> {
    require_via(ctx, permission)
        .await
        .map(|(session, _)| session)
}

/// [`require`] for actions whose outcome depends on how the caller was let
/// through.
pub(crate) async fn require_via(
    ctx: &Context<'_>,
    permission: Permission,
) -> async_graphql::Result<(Session, AllowedVia)> {
    let data = graphql_data(ctx)?;
    let anonymous = SessionState::Anonymous;
    let state = ctx.data_opt::<SessionState>().unwrap_or(&anonymous);
    auth::authorize_via(&data.gate, state, permission)
        .await
        .map_err(|denial| ApiError::from(denial).extend())
}

pub(crate) fn db_error(err: DbErr) -> Error {
    internal_error(err)
}

pub(crate) fn not_found() -> Error {
    ApiError::NotFound.extend()
}

pub(crate) fn invalid(msg: impl Into<String>) -> Error {
    ApiError::invalid(msg).extend()
}

pub(crate) fn conflict(msg: impl Into<String>) -> Error {
    ApiError::Conflict(msg.into()).extend()
}

pub(crate) fn parse_id(id: &ID) -> async_graphql::Result<Uuid> {
    Uuid::parse_str(id.as_str()).map_err(|_| invalid("invalid id"))
}

pub(crate) fn clamp_page(first: Option<i32>, offset: Option<i32>) -> (u64, u64) {
    let limit = first.unwrap_or(50).clamp(1, 200) as u64;
    let skip = offset.unwrap_or(0).max(0) as u64;
    (limit, skip)
}

pub(crate) fn non_blank(field: &str, value: &str) -> async_graphql::Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(invalid(format!("{field} must not be blank")))
    } else {
        Ok(trimmed.to_string())
    }
}
