use async_graphql::{Context, Enum, ID, InputObject, Object, SimpleObject};
use chrono::{DateTime, Utc};
use entity::shipments::{self, Mode, Status};
use platform_authz::known;
use platform_db::DbPool;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DbErr, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect,
};
use serde::Serialize;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::graphql::{
    clamp_page, conflict, db_error, graphql_data, non_blank, not_found, parse_id, require,
};

#[derive(Enum, Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FreightMode {
    Air,
    Sea,
}

impl From<Mode> for FreightMode {
    fn from(value: Mode) -> Self {
        match value {
            Mode::Air => FreightMode::Air,
            Mode::Sea => FreightMode::Sea,
        }
    }
}

impl From<FreightMode> for Mode {
    fn from(value: FreightMode) -> Self {
        match value {
            FreightMode::Air => Mode::Air,
            FreightMode::Sea => Mode::Sea,
        }
    }
}

#[derive(Enum, Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ShipmentStatus {
    Booked,
    InTransit,
    Customs,
    Delayed,
    Delivered,
    Cancelled,
}

impl From<Status> for ShipmentStatus {
    fn from(value: Status) -> Self {
        match value {
            Status::Booked => ShipmentStatus::Booked,
            Status::InTransit => ShipmentStatus::InTransit,
            Status::Customs => ShipmentStatus::Customs,
            Status::Delayed => ShipmentStatus::Delayed,
            Status::Delivered => ShipmentStatus::Delivered,
            Status::Cancelled => ShipmentStatus::Cancelled,
        }
    }
}

impl From<ShipmentStatus> for Status {
    fn from(value: ShipmentStatus) -> Self {
        match value {
            ShipmentStatus::Booked => Status::Booked,
            ShipmentStatus::InTransit => Status::InTransit,
            ShipmentStatus::Customs => Status::Customs,
            ShipmentStatus::Delayed => Status::Delayed,
            ShipmentStatus::Delivered => Status::Delivered,
            ShipmentStatus::Cancelled => Status::Cancelled,
        }
    }
}

#[derive(Clone, Debug, SimpleObject, Serialize)]
pub struct ShipmentNode {
    pub id: ID,
    pub reference: String,
    pub mode: FreightMode,
    pub status: ShipmentStatus,
    pub origin: String,
    pub destination: String,
    pub carrier: Option<String>,
    pub eta: Option<DateTime<Utc>>,
    #[graphql(name = "deliveredAt")]
    pub delivered_at: Option<DateTime<Utc>>,
    #[graphql(name = "createdBy")]
    pub created_by: ID,
    #[graphql(name = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[graphql(name = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

impl From<shipments::Model> for ShipmentNode {
    fn from(model: shipments::Model) -> Self {
        Self {
            id: ID::from(model.id.to_string()),
            reference: model.reference,
            mode: model.mode.into(),
            status: model.status.into(),
            origin: model.origin,
            destination: model.destination,
            carrier: model.carrier,
            eta: model.eta.map(|at| at.with_timezone(&Utc)),
            delivered_at: model.delivered_at.map(|at| at.with_timezone(&Utc)),
            created_by: ID::from(model.created_by.to_string()),
            created_at: model.created_at.with_timezone(&Utc),
            updated_at: model.updated_at.with_timezone(&Utc),
        }
    }
}

#[derive(InputObject)]
pub struct CreateShipmentInput {
    pub reference: String,
    pub mode: FreightMode,
    pub origin: String,
    pub destination: String,
    pub carrier: Option<String>,
    pub eta: Option<DateTime<Utc>>,
}

/// Filters shared by the GraphQL lists and the dashboard pages.
#[derive(Clone, Copy, Debug, Default)]
pub struct ShipmentFilter {
    pub mode: Option<Mode>,
    pub status: Option<Status>,
    pub limit: u64,
    pub skip: u64,
}

pub async fn list_shipments(
    pool: &DbPool,
    org_id: Uuid,
    filter: ShipmentFilter,
) -> Result<Vec<shipments::Model>, DbErr> {
    let mut query = shipments::Entity::find().filter(shipments::Column::OrgId.eq(org_id));
    if let Some(mode) = filter.mode {
        query = query.filter(shipments::Column::Mode.eq(mode));
    }
    if let Some(status) = filter.status {
        query = query.filter(shipments::Column::Status.eq(status));
    }
    query
        .order_by_desc(shipments::Column::CreatedAt)
        .limit(filter.limit)
        .offset(filter.skip)
        .all(pool)
        .await
}

pub async fn find_shipment(
    pool: &DbPool,
    org_id: Uuid,
    id: Uuid,
) -> Result<Option<shipments::Model>, DbErr> {
    shipments::Entity::find_by_id(id)
        .filter(shipments::Column::OrgId.eq(org_id))
        .one(pool)
        .await
}

#[derive(Default)]
pub struct ShipmentQuery;

#[Object]
impl ShipmentQuery {
    #[instrument(name = "graphql.shipments", skip_all)]
    async fn shipments(
        &self,
        ctx: &Context<'_>,
        status: Option<ShipmentStatus>,
        first: Option<i32>,
        offset: Option<i32>,
    ) -> async_graphql::Result<Vec<ShipmentNode>> {
        let session = require(ctx, known::SHIPMENTS_READ).await?;
        let (limit, skip) = clamp_page(first, offset);
        let filter = ShipmentFilter {
            status: status.map(Into::into),
            limit,
            skip,
            ..Default::default()
        };
        list_nodes(ctx, session.org_id, filter).await
    }

    #[instrument(name = "graphql.shipment", skip_all)]
    async fn shipment(
        &self,
        ctx: &Context<'_>,
        id: ID,
    ) -> async_graphql::Result<Option<ShipmentNode>> {
        let session = require(ctx, known::SHIPMENTS_READ).await?;
        let id = parse_id(&id)?;
        let data = graphql_data(ctx)?;
        Ok(find_shipment(data.pool.as_ref(), session.org_id, id)
            .await
            .map_err(db_error)?
            .map(ShipmentNode::from))
    }

    #[graphql(name = "airFreight")]
    #[instrument(name = "graphql.air_freight", skip_all)]
    async fn air_freight(
        &self,
        ctx: &Context<'_>,
        first: Option<i32>,
        offset: Option<i32>,
    ) -> async_graphql::Result<Vec<ShipmentNode>> {
        let session = require(ctx, known::AIR_FREIGHT_READ).await?;
        let (limit, skip) = clamp_page(first, offset);
        let filter = ShipmentFilter {
            mode: Some(Mode::Air),
            limit,
            skip,
            ..Default::default()
        };
        list_nodes(ctx, session.org_id, filter).await
    }

    #[graphql(name = "seaFreight")]
    #[instrument(name = "graphql.sea_freight", skip_all)]
    async fn sea_freight(
        &self,
        ctx: &Context<'_>,
        first: Option<i32>,
        offset: Option<i32>,
    ) -> async_graphql::Result<Vec<ShipmentNode>> {
        let session = require(ctx, known::SEA_FREIGHT_READ).await?;
        let (limit, skip) = clamp_page(first, offset);
        let filter = ShipmentFilter {
            mode: Some(Mode::Sea),
            limit,
            skip,
            ..Default::default()
        };
        list_nodes(ctx, session.org_id, filter).await
    }
}

async fn list_nodes(
    ctx: &Context<'_>,
    org_id: Uuid,
    filter: ShipmentFilter,
) -> async_graphql::Result<Vec<ShipmentNode>> {
    let data = graphql_data(ctx)?;
    Ok(list_shipments(data.pool.as_ref(), org_id, filter)
        .await
        .map_err(db_error)?
        .into_iter()
        .map(ShipmentNode::from)
        .collect())
}

#[derive(Default)]
pub struct ShipmentMutation;

#[Object]
impl ShipmentMutation {
    #[instrument(name = "graphql.create_shipment", skip_all)]
    async fn create_shipment(
        &self,
        ctx: &Context<'_>,
        input: CreateShipmentInput,
    ) -> async_graphql::Result<ShipmentNode> {
        let session = require(ctx, known::SHIPMENTS_CREATE).await?;
        let data = graphql_data(ctx)?;
        let reference = non_blank("reference", &input.reference)?;
        let origin = non_blank("origin", &input.origin)?;
        let destination = non_blank("destination", &input.destination)?;

        let existing = shipments::Entity::find()
            .filter(shipments::Column::OrgId.eq(session.org_id))
            .filter(shipments::Column::Reference.eq(reference.as_str()))
            .one(data.pool.as_ref())
            .await
            .map_err(db_error)?;
        if existing.is_some() {
            return Err(conflict(format!("shipment `{reference}` already exists")));
        }

        let now = Utc::now();
        let model = shipments::ActiveModel {
            id: Set(Uuid::new_v4()),
            org_id: Set(session.org_id),
            reference: Set(reference),
            mode: Set(input.mode.into()),
            status: Set(Status::Booked),
            origin: Set(origin),
            destination: Set(destination),
            carrier: Set(input
                .carrier
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty())),
            eta: Set(input.eta.map(Into::into)),
            delivered_at: Set(None),
            created_by: Set(session.user_id),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        }
        .insert(data.pool.as_ref())
        .await
        .map_err(db_error)?;
        info!(shipment_id = %model.id, user_id = %session.user_id, "shipment created");
        Ok(model.into())
    }

    #[instrument(name = "graphql.update_shipment_status", skip_all)]
    async fn update_shipment_status(
        &self,
        ctx: &Context<'_>,
        id: ID,
        status: ShipmentStatus,
    ) -> async_graphql::Result<ShipmentNode> {
        let session = require(ctx, known::SHIPMENTS_UPDATE).await?;
        let id = parse_id(&id)?;
        let data = graphql_data(ctx)?;
        let current = find_shipment(data.pool.as_ref(), session.org_id, id)
            .await
            .map_err(db_error)?
            .ok_or_else(not_found)?;

        let now = Utc::now();
        let status: Status = status.into();
        let mut active: shipments::ActiveModel = current.into();
        active.status = Set(status);
        if status == Status::Delivered {
            active.delivered_at = Set(Some(now.into()));
        }
        active.updated_at = Set(now.into());
        let model = active.update(data.pool.as_ref()).await.map_err(db_error)?;
        info!(shipment_id = %model.id, status = ?model.status, "shipment status changed");
        Ok(model.into())
    }

    #[instrument(name = "graphql.delete_shipment", skip_all)]
    async fn delete_shipment(&self, ctx: &Context<'_>, id: ID) -> async_graphql::Result<bool> {
        let session = require(ctx, known::SHIPMENTS_DELETE).await?;
        let id = parse_id(&id)?;
        let data = graphql_data(ctx)?;
        let result = shipments::Entity::delete_many()
            .filter(shipments::Column::Id.eq(id))
            .filter(shipments::Column::OrgId.eq(session.org_id))
            .exec(data.pool.as_ref())
            .await
            .map_err(db_error)?;
        if result.rows_affected == 0 {
            return Err(not_found());
        }
        info!(shipment_id = %id, user_id = %session.user_id, "shipment deleted");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::graphql::test_support::*;
    use platform_authz::Session;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};

    fn shipment(session: &Session, mode: Mode, status: Status) -> shipments::Model {
        let now = Utc::now().into();
        shipments::Model {
            id: Uuid::new_v4(),
            org_id: session.org_id,
            reference: "SHP-1001".into(),
            mode,
            status,
            origin: "Rotterdam".into(),
            destination: "Singapore".into(),
            carrier: Some("Maersk".into()),
            eta: None,
            delivered_at: None,
            created_by: session.user_id,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn reader_lists_shipments() {
        let sample = caller(Uuid::new_v4());
        let row = shipment(&sample, Mode::Sea, Status::InTransit);
        let pool = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![row]])
            .into_connection();
        let (schema, session) = schema_with_role(pool, &[known::SHIPMENTS_READ]);
        let response = run_as(&schema, &session, "{ shipments { reference mode status } }").await;
        assert!(response.errors.is_empty(), "{:?}", response.errors);
        let body = response.data.into_json().unwrap();
        assert_eq!(body["shipments"][0]["reference"], "SHP-1001");
        assert_eq!(body["shipments"][0]["mode"], "SEA");
        assert_eq!(body["shipments"][0]["status"], "IN_TRANSIT");
    }

    #[tokio::test]
    async fn delete_without_permission_writes_nothing() {
        let pool = Arc::new(MockDatabase::new(DatabaseBackend::Postgres).into_connection());
        let (schema, session) = schema_sharing(pool.clone(), &[known::SHIPMENTS_READ]);
        let query = format!(r#"mutation {{ deleteShipment(id: "{}") }}"#, Uuid::new_v4());
        let response = run_as(&schema, &session, &query).await;
        assert_eq!(error_code(&response).as_deref(), Some("PERMISSION_DENIED"));
        drop(schema);
        assert!(transaction_log(pool).is_empty());
    }

    #[tokio::test]
    async fn delete_of_missing_shipment_is_not_found() {
        let pool = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 0,
            }])
            .into_connection();
        let (schema, session) = schema_with_role(pool, &[known::SHIPMENTS_DELETE]);
        let query = format!(r#"mutation {{ deleteShipment(id: "{}") }}"#, Uuid::new_v4());
        let response = run_as(&schema, &session, &query).await;
        assert_eq!(error_code(&response).as_deref(), Some("NOT_FOUND"));
    }

    #[tokio::test]
    async fn duplicate_reference_is_a_conflict() {
        let sample = caller(Uuid::new_v4());
        let pool = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![shipment(&sample, Mode::Air, Status::Booked)]])
            .into_connection();
        let (schema, session) = schema_with_role(pool, &[known::SHIPMENTS_CREATE]);
        let response = run_as(
            &schema,
            &session,
            r#"mutation { createShipment(input: { reference: "SHP-1001", mode: AIR, origin: "AMS", destination: "JFK" }) { id } }"#,
        )
        .await;
        assert_eq!(error_code(&response).as_deref(), Some("CONFLICT"));
    }

    #[tokio::test]
    async fn blank_reference_is_rejected_before_any_query() {
        let pool = MockDatabase::new(DatabaseBackend::Postgres).into_connection();
        let (schema, session) = schema_with_role(pool, &[known::SHIPMENTS_CREATE]);
        let response = run_as(
            &schema,
            &session,
            r#"mutation { createShipment(input: { reference: "  ", mode: SEA, origin: "a", destination: "b" }) { id } }"#,
        )
        .await;
        assert_eq!(error_code(&response).as_deref(), Some("INVALID_INPUT"));
    }

    #[tokio::test]
    async fn air_freight_needs_its_own_permission() {
        let pool = MockDatabase::new(DatabaseBackend::Postgres).into_connection();
        let (schema, session) = schema_with_role(pool, &[known::SHIPMENTS_READ]);
        let response = run_as(&schema, &session, "{ airFreight { id } }").await;
        assert_eq!(error_code(&response).as_deref(), Some("PERMISSION_DENIED"));
    }

    #[test]
    fn status_conversions_agree() {
        for status in [
            Status::Booked,
            Status::InTransit,
            Status::Customs,
            Status::Delayed,
            Status::Delivered,
            Status::Cancelled,
        ] {
            assert_eq!(Status::from(ShipmentStatus::from(status)), status);
        }
    }
}
