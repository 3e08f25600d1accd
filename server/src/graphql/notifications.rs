use async_graphql::{Context, ID, Object, SimpleObject};
use chrono::{DateTime, Utc};
use entity::notifications;
use platform_authz::known;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect,
};
use tracing::instrument;

use crate::graphql::{clamp_page, db_error, graphql_data, not_found, parse_id, require};

#[derive(Clone, Debug, SimpleObject)]
pub struct NotificationNode {
    pub id: ID,
    #[graphql(name = "shipmentId")]
    pub shipment_id: Option<ID>,
    pub message: String,
    #[graphql(name = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[graphql(name = "readAt")]
    pub read_at: Option<DateTime<Utc>>,
}

impl From<notifications::Model> for NotificationNode {
    fn from(model: notifications::Model) -> Self {
        Self {
            id: ID::from(model.id.to_string()),
            shipment_id: model.shipment_id.map(|id| ID::from(id.to_string())),
            message: model.message,
            created_at: model.created_at.with_timezone(&Utc),
            read_at: model.read_at.map(|at| at.with_timezone(&Utc)),
        }
    }
}

#[derive(Default)]
pub struct NotificationQuery;

#[Object]
impl NotificationQuery {
    /// The caller's own notifications, newest first.
    #[instrument(name = "graphql.notifications", skip_all)]
    async fn notifications(
        &self,
        ctx: &Context<'_>,
        #[graphql(name = "unreadOnly", default)] unread_only: bool,
        first: Option<i32>,
        offset: Option<i32>,
    ) -> async_graphql::Result<Vec<NotificationNode>> {
        let session = require(ctx, known::NOTIFICATIONS_READ).await?;
        let data = graphql_data(ctx)?;
        let (limit, skip) = clamp_page(first, offset);
        let mut query = notifications::Entity::find()
            .filter(notifications::Column::OrgId.eq(session.org_id))
            .filter(notifications::Column::UserId.eq(session.user_id));
        if unread_only {
            query = query.filter(notifications::Column::ReadAt.is_null());
        }
        let records = query
            .order_by_desc(notifications::Column::CreatedAt)
            .limit(limit)
            .offset(skip)
            .all(data.pool.as_ref())
            .await
            .map_err(db_error)?;
        Ok(records.into_iter().map(NotificationNode::from).collect())
    }
}

#[derive(Default)]
pub struct NotificationMutation;

#[Object]
impl NotificationMutation {
    #[instrument(name = "graphql.mark_notification_read", skip_all)]
    async fn mark_notification_read(
        &self,
        ctx: &Context<'_>,
        id: ID,
    ) -> async_graphql::Result<NotificationNode> {
        let session = require(ctx, known::NOTIFICATIONS_UPDATE).await?;
        let id = parse_id(&id)?;
        let data = graphql_data(ctx)?;
        let record = notifications::Entity::find_by_id(id)
            .filter(notifications::Column::UserId.eq(session.user_id))
            .one(data.pool.as_ref())
            .await
            .map_err(db_error)?
            .ok_or_else(not_found)?;
        if record.read_at.is_some() {
            return Ok(record.into());
        }
        let mut active: notifications::ActiveModel = record.into();
        active.read_at = Set(Some(Utc::now().into()));
        let model = active.update(data.pool.as_ref()).await.map_err(db_error)?;
        Ok(model.into())
    }
}
