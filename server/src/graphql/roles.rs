use async_graphql::{Context, ID, InputObject, Object, SimpleObject};
use chrono::{DateTime, Utc};
use entity::{roles, users};
use platform_authz::{Permission, PermissionSet, known};
use platform_db::DbPool;
use sea_orm::{ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, QueryFilter, QueryOrder};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::graphql::{
    conflict, db_error, graphql_data, invalid, non_blank, not_found, parse_id, require,
};

#[derive(Clone, Debug, SimpleObject)]
pub struct RoleNode {
    pub id: ID,
    pub name: String,
    #[graphql(name = "machineName")]
    pub machine_name: String,
    #[graphql(name = "isActive")]
    pub is_active: bool,
    #[graphql(name = "isSuper")]
    pub is_super: bool,
    pub permissions: Vec<String>,
    #[graphql(name = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[graphql(name = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

impl From<roles::Model> for RoleNode {
    fn from(model: roles::Model) -> Self {
        Self {
            id: ID::from(model.id.to_string()),
            name: model.name,
            machine_name: model.machine_name,
            is_active: model.is_active,
            is_super: model.is_super,
            permissions: model.permissions,
            created_at: model.created_at.with_timezone(&Utc),
            updated_at: model.updated_at.with_timezone(&Utc),
        }
    }
}

#[derive(InputObject)]
pub struct CreateRoleInput {
    pub name: String,
    #[graphql(name = "machineName")]
    pub machine_name: String,
    pub permissions: Vec<String>,
}

/// Lowercase ascii, digits and underscores, starting with a letter.
fn valid_machine_name(raw: &str) -> bool {
    let mut chars = raw.chars();
    let starts_with_letter = chars.next().is_some_and(|c| c.is_ascii_lowercase());
    starts_with_letter
        && raw.len() <= 63
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

fn parse_permissions(raw: &[String]) -> async_graphql::Result<PermissionSet> {
    PermissionSet::parse_all(raw).map_err(|err| invalid(err.to_string()))
}

/// Load a role of this org that the API may edit.
async fn editable_role(
    pool: &DbPool,
    org_id: Uuid,
    id: Uuid,
) -> async_graphql::Result<roles::Model> {
    let role = roles::Entity::find_by_id(id)
        .filter(roles::Column::OrgId.eq(org_id))
        .one(pool)
        .await
        .map_err(db_error)?
        .ok_or_else(not_found)?;
    if role.is_super {
        return Err(invalid("super roles cannot be edited"));
    }
    Ok(role)
}

#[derive(Default)]
pub struct RoleQuery;

#[Object]
impl RoleQuery {
    #[instrument(name = "graphql.roles", skip_all)]
    async fn roles(&self, ctx: &Context<'_>) -> async_graphql::Result<Vec<RoleNode>> {
        let session = require(ctx, known::ROLES_READ).await?;
        let data = graphql_data(ctx)?;
        let records = roles::Entity::find()
            .filter(roles::Column::OrgId.eq(session.org_id))
            .order_by_asc(roles::Column::Name)
            .all(data.pool.as_ref())
            .await
            .map_err(db_error)?;
        Ok(records.into_iter().map(RoleNode::from).collect())
    }

    /// Every permission string a role can be granted.
    #[graphql(name = "permissionVocabulary")]
    #[instrument(name = "graphql.permission_vocabulary", skip_all)]
    async fn permission_vocabulary(&self, ctx: &Context<'_>) -> async_graphql::Result<Vec<String>> {
        require(ctx, known::ROLES_READ).await?;
        Ok(Permission::all().map(|p| p.to_string()).collect())
    }
}

#[derive(Default)]
pub struct RoleMutation;

#[Object]
impl RoleMutation {
    #[instrument(name = "graphql.create_role", skip_all)]
    async fn create_role(
        &self,
        ctx: &Context<'_>,
        input: CreateRoleInput,
    ) -> async_graphql::Result<RoleNode> {
        let session = require(ctx, known::ROLES_CREATE).await?;
        let name = non_blank("name", &input.name)?;
        let machine_name = input.machine_name.trim().to_string();
        if !valid_machine_name(&machine_name) {
            return Err(invalid("machineName must match [a-z][a-z0-9_]*"));
        }
        let permissions = parse_permissions(&input.permissions)?;
        let data = graphql_data(ctx)?;

        let existing = roles::Entity::find()
            .filter(roles::Column::OrgId.eq(session.org_id))
            .filter(roles::Column::MachineName.eq(machine_name.as_str()))
            .one(data.pool.as_ref())
            .await
            .map_err(db_error)?;
        if existing.is_some() {
            return Err(conflict(format!("role `{machine_name}` already exists")));
        }

        let now = Utc::now();
        let model = roles::ActiveModel {
            id: Set(Uuid::new_v4()),
            org_id: Set(session.org_id),
            name: Set(name),
            machine_name: Set(machine_name),
            is_active: Set(true),
            is_super: Set(false),
            permissions: Set(permissions.to_strings()),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        }
        .insert(data.pool.as_ref())
        .await
        .map_err(db_error)?;
        info!(role = %model.machine_name, granted = model.permissions.len(), "role created");
        Ok(model.into())
    }

    #[instrument(name = "graphql.update_role_permissions", skip_all)]
    async fn update_role_permissions(
        &self,
        ctx: &Context<'_>,
        id: ID,
        permissions: Vec<String>,
    ) -> async_graphql::Result<RoleNode> {
        let session = require(ctx, known::ROLES_UPDATE).await?;
        let id = parse_id(&id)?;
        let permissions = parse_permissions(&permissions)?;
        let data = graphql_data(ctx)?;
        let role = editable_role(data.pool.as_ref(), session.org_id, id).await?;

        let mut active: roles::ActiveModel = role.into();
        active.permissions = Set(permissions.to_strings());
        active.updated_at = Set(Utc::now().into());
        let model = active.update(data.pool.as_ref()).await.map_err(db_error)?;
        info!(role = %model.machine_name, granted = model.permissions.len(), "role permissions replaced");
        Ok(model.into())
    }

    #[instrument(name = "graphql.set_role_active", skip_all)]
    async fn set_role_active(
        &self,
        ctx: &Context<'_>,
        id: ID,
        active: bool,
    ) -> async_graphql::Result<RoleNode> {
        let session = require(ctx, known::ROLES_UPDATE).await?;
        let id = parse_id(&id)?;
        let data = graphql_data(ctx)?;
        let role = editable_role(data.pool.as_ref(), session.org_id, id).await?;

        let mut model: roles::ActiveModel = role.into();
        model.is_active = Set(active);
        model.updated_at = Set(Utc::now().into());
        let model = model.update(data.pool.as_ref()).await.map_err(db_error)?;
        info!(role = %model.machine_name, active, "role activation changed");
        Ok(model.into())
    }

    #[instrument(name = "graphql.delete_role", skip_all)]
    async fn delete_role(&self, ctx: &Context<'_>, id: ID) -> async_graphql::Result<bool> {
        let session = require(ctx, known::ROLES_DELETE).await?;
        let id = parse_id(&id)?;
        let data = graphql_data(ctx)?;
        let role = editable_role(data.pool.as_ref(), session.org_id, id).await?;

        let holder = users::Entity::find()
            .filter(users::Column::RoleId.eq(role.id))
            .one(data.pool.as_ref())
            .await
            .map_err(db_error)?;
        if holder.is_some() {
            return Err(conflict("role is still assigned to users"));
        }
        roles::Entity::delete_by_id(role.id)
            .exec(data.pool.as_ref())
            .await
            .map_err(db_error)?;
        info!(role = %role.machine_name, "role deleted");
        Ok(true)
    }
}
