use async_graphql::{Context, ID, InputObject, Object, SimpleObject};
use chrono::{DateTime, Utc};
use entity::documents;
use platform_authz::known;
use sea_orm::{ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, QueryFilter, QueryOrder};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::graphql::{
    db_error, graphql_data, invalid, non_blank, not_found, parse_id, require,
    shipments::find_shipment,
};

#[derive(Clone, Debug, SimpleObject)]
pub struct DocumentNode {
    pub id: ID,
    #[graphql(name = "shipmentId")]
    pub shipment_id: ID,
    pub kind: String,
    #[graphql(name = "fileName")]
    pub file_name: String,
    #[graphql(name = "storageUrl")]
    pub storage_url: String,
    #[graphql(name = "uploadedBy")]
    pub uploaded_by: ID,
    #[graphql(name = "createdAt")]
    pub created_at: DateTime<Utc>,
}

impl From<documents::Model> for DocumentNode {
    fn from(model: documents::Model) -> Self {
        Self {
            id: ID::from(model.id.to_string()),
            shipment_id: ID::from(model.shipment_id.to_string()),
            kind: model.kind,
            file_name: model.file_name,
            storage_url: model.storage_url,
            uploaded_by: ID::from(model.uploaded_by.to_string()),
            created_at: model.created_at.with_timezone(&Utc),
        }
    }
}

#[derive(InputObject)]
pub struct AttachDocumentInput {
    #[graphql(name = "shipmentId")]
    pub shipment_id: ID,
    pub kind: String,
    #[graphql(name = "fileName")]
    pub file_name: String,
    #[graphql(name = "storageUrl")]
    pub storage_url: String,
}

#[derive(Default)]
pub struct DocumentQuery;

#[Object]
impl DocumentQuery {
    #[instrument(name = "graphql.documents", skip_all)]
    async fn documents(
        &self,
        ctx: &Context<'_>,
        #[graphql(name = "shipmentId")] shipment_id: ID,
    ) -> async_graphql::Result<Vec<DocumentNode>> {
        let session = require(ctx, known::DOCUMENTS_READ).await?;
        let shipment_id = parse_id(&shipment_id)?;
        let data = graphql_data(ctx)?;
        let records = documents::Entity::find()
            .filter(documents::Column::OrgId.eq(session.org_id))
            .filter(documents::Column::ShipmentId.eq(shipment_id))
            .order_by_desc(documents::Column::CreatedAt)
            .all(data.pool.as_ref())
            .await
            .map_err(db_error)?;
        Ok(records.into_iter().map(DocumentNode::from).collect())
    }
}

#[derive(Default)]
pub struct DocumentMutation;

#[Object]
impl DocumentMutation {
    #[instrument(name = "graphql.attach_document", skip_all)]
    async fn attach_document(
        &self,
        ctx: &Context<'_>,
        input: AttachDocumentInput,
    ) -> async_graphql::Result<DocumentNode> {
        let session = require(ctx, known::DOCUMENTS_CREATE).await?;
        let shipment_id = parse_id(&input.shipment_id)?;
        let kind = non_blank("kind", &input.kind)?;
        let file_name = non_blank("fileName", &input.file_name)?;
        let storage_url = non_blank("storageUrl", &input.storage_url)?;
        if !storage_url.starts_with("https://") {
            return Err(invalid("storageUrl must be an https URL"));
        }
        let data = graphql_data(ctx)?;
        find_shipment(data.pool.as_ref(), session.org_id, shipment_id)
            .await
            .map_err(db_error)?
            .ok_or_else(not_found)?;

        let model = documents::ActiveModel {
            id: Set(Uuid::new_v4()),
            org_id: Set(session.org_id),
            shipment_id: Set(shipment_id),
            kind: Set(kind),
            file_name: Set(file_name),
            storage_url: Set(storage_url),
            uploaded_by: Set(session.user_id),
            created_at: Set(Utc::now().into()),
        }
        .insert(data.pool.as_ref())
        .await
        .map_err(db_error)?;
        info!(document_id = %model.id, %shipment_id, "document attached");
        Ok(model.into())
    }

    #[instrument(name = "graphql.delete_document", skip_all)]
    async fn delete_document(&self, ctx: &Context<'_>, id: ID) -> async_graphql::Result<bool> {
        let session = require(ctx, known::DOCUMENTS_DELETE).await?;
        let id = parse_id(&id)?;
        let data = graphql_data(ctx)?;
        let result = documents::Entity::delete_many()
            .filter(documents::Column::Id.eq(id))
            .filter(documents::Column::OrgId.eq(session.org_id))
            .exec(data.pool.as_ref())
            .await
            .map_err(db_error)?;
        if result.rows_affected == 0 {
            return Err(not_found());
        }
        info!(document_id = %id, "document deleted");
        Ok(true)
    }
}
