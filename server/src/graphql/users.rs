use async_graphql::{Context, ErrorExtensions, ID, InputObject, Object, SimpleObject};
use chrono::{DateTime, Utc};
use entity::{roles, sessions, user_secrets, users};
use platform_api::{ApiError, internal_error};
use platform_authz::{AllowedVia, Denial, DenyReason, Permission, known};
use platform_db::DbPool;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, TransactionTrait,
};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::auth;
use crate::graphql::{
    clamp_page, conflict, db_error, graphql_data, invalid, not_found, parse_id, require,
    require_via,
};

const MIN_PASSWORD_LEN: usize = 12;

#[derive(Clone, Debug, SimpleObject)]
pub struct UserNode {
    pub id: ID,
    pub email: String,
    pub name: Option<String>,
    pub phone: Option<String>,
    #[graphql(name = "roleId")]
    pub role_id: ID,
    #[graphql(name = "isActive")]
    pub is_active: bool,
    #[graphql(name = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[graphql(name = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

impl From<users::Model> for UserNode {
    fn from(model: users::Model) -> Self {
        Self {
            id: ID::from(model.id.to_string()),
            email: model.email,
            name: model.name,
            phone: model.phone,
            role_id: ID::from(model.role_id.to_string()),
            is_active: model.is_active,
            created_at: model.created_at.with_timezone(&Utc),
            updated_at: model.updated_at.with_timezone(&Utc),
        }
    }
}

#[derive(InputObject)]
pub struct CreateUserInput {
    pub email: String,
    pub name: Option<String>,
    pub phone: Option<String>,
    #[graphql(name = "roleId")]
    pub role_id: ID,
    pub password: String,
}

fn normalize_email(raw: &str) -> async_graphql::Result<String> {
    let email = raw.trim().to_lowercase();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(email),
        _ => Err(invalid("email is not valid")),
    }
}

fn optional_text(raw: Option<String>) -> Option<String> {
    raw.map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

async fn org_role(pool: &DbPool, org_id: Uuid, role_id: Uuid) -> async_graphql::Result<roles::Model> {
    roles::Entity::find_by_id(role_id)
        .filter(roles::Column::OrgId.eq(org_id))
        .one(pool)
        .await
        .map_err(db_error)?
        .ok_or_else(|| invalid("role does not exist"))
}

/// Only a caller who is itself on the super role may hand the super role out.
fn grantable(
    role: roles::Model,
    via: AllowedVia,
    permission: Permission,
) -> async_graphql::Result<roles::Model> {
    if role.is_super && via != AllowedVia::SuperRole {
        return Err(
            ApiError::from(Denial::new(DenyReason::PermissionDenied, permission.to_string()))
                .extend(),
        );
    }
    Ok(role)
}

async fn org_user(pool: &DbPool, org_id: Uuid, user_id: Uuid) -> async_graphql::Result<users::Model> {
    users::Entity::find_by_id(user_id)
        .filter(users::Column::OrgId.eq(org_id))
        .one(pool)
        .await
        .map_err(db_error)?
        .ok_or_else(not_found)
}

#[derive(Default)]
pub struct UserQuery;

#[Object]
impl UserQuery {
    #[instrument(name = "graphql.users", skip_all)]
    async fn users(
        &self,
        ctx: &Context<'_>,
        first: Option<i32>,
        offset: Option<i32>,
    ) -> async_graphql::Result<Vec<UserNode>> {
        let session = require(ctx, known::USERS_READ).await?;
        let data = graphql_data(ctx)?;
        let (limit, skip) = clamp_page(first, offset);
        let records = users::Entity::find()
            .filter(users::Column::OrgId.eq(session.org_id))
            .order_by_asc(users::Column::Email)
            .limit(limit)
            .offset(skip)
            .all(data.pool.as_ref())
            .await
            .map_err(db_error)?;
        Ok(records.into_iter().map(UserNode::from).collect())
    }
}

#[derive(Default)]
pub struct UserMutation;

#[Object]
impl UserMutation {
    #[instrument(name = "graphql.create_user", skip_all)]
    async fn create_user(
        &self,
        ctx: &Context<'_>,
        input: CreateUserInput,
    ) -> async_graphql::Result<UserNode> {
        let (session, via) = require_via(ctx, known::USERS_CREATE).await?;
        let email = normalize_email(&input.email)?;
        if input.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(invalid(format!(
                "password must be at least {MIN_PASSWORD_LEN} characters"
            )));
        }
        let role_id = parse_id(&input.role_id)?;
        let data = graphql_data(ctx)?;
        let role = org_role(data.pool.as_ref(), session.org_id, role_id).await?;
        grantable(role, via, known::USERS_CREATE)?;

        let taken = users::Entity::find()
            .filter(users::Column::Email.eq(email.as_str()))
            .one(data.pool.as_ref())
            .await
            .map_err(db_error)?;
        if taken.is_some() {
            return Err(conflict("email already registered"));
        }

        let password_hash = auth::hash_password(&input.password).map_err(internal_error)?;
        let now = Utc::now();
        let txn = data.pool.begin().await.map_err(db_error)?;
        let user = users::ActiveModel {
            id: Set(Uuid::new_v4()),
            org_id: Set(session.org_id),
            role_id: Set(role_id),
            email: Set(email),
            name: Set(optional_text(input.name)),
            phone: Set(optional_text(input.phone)),
            is_active: Set(true),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        }
        .insert(&txn)
        .await
        .map_err(db_error)?;
        user_secrets::ActiveModel {
            user_id: Set(user.id),
            password_hash: Set(password_hash),
            updated_at: Set(now.into()),
        }
        .insert(&txn)
        .await
        .map_err(db_error)?;
        txn.commit().await.map_err(db_error)?;

        info!(user_id = %user.id, created_by = %session.user_id, "user created");
        Ok(user.into())
    }

    #[instrument(name = "graphql.assign_role", skip_all)]
    async fn assign_role(
        &self,
        ctx: &Context<'_>,
        #[graphql(name = "userId")] user_id: ID,
        #[graphql(name = "roleId")] role_id: ID,
    ) -> async_graphql::Result<UserNode> {
        let (session, via) = require_via(ctx, known::USERS_UPDATE).await?;
        let user_id = parse_id(&user_id)?;
        let role_id = parse_id(&role_id)?;
        let data = graphql_data(ctx)?;
        let user = org_user(data.pool.as_ref(), session.org_id, user_id).await?;
        let role = org_role(data.pool.as_ref(), session.org_id, role_id).await?;
        let role = grantable(role, via, known::USERS_UPDATE)?;

        let mut active: users::ActiveModel = user.into();
        active.role_id = Set(role.id);
        active.updated_at = Set(Utc::now().into());
        let model = active.update(data.pool.as_ref()).await.map_err(db_error)?;
        info!(user_id = %model.id, role = %role.machine_name, "role assigned");
        Ok(model.into())
    }

    /// Deactivating a user also ends their sessions.
    #[instrument(name = "graphql.set_user_active", skip_all)]
    async fn set_user_active(
        &self,
        ctx: &Context<'_>,
        #[graphql(name = "userId")] user_id: ID,
        active: bool,
    ) -> async_graphql::Result<UserNode> {
        let session = require(ctx, known::USERS_UPDATE).await?;
        let user_id = parse_id(&user_id)?;
        if user_id == session.user_id && !active {
            return Err(invalid("you cannot deactivate yourself"));
        }
        let data = graphql_data(ctx)?;
        let user = org_user(data.pool.as_ref(), session.org_id, user_id).await?;

        let mut model: users::ActiveModel = user.into();
        model.is_active = Set(active);
        model.updated_at = Set(Utc::now().into());
        let model = model.update(data.pool.as_ref()).await.map_err(db_error)?;
        if !active {
            sessions::Entity::delete_many()
                .filter(sessions::Column::UserId.eq(model.id))
                .exec(data.pool.as_ref())
                .await
                .map_err(db_error)?;
        }
        info!(user_id = %model.id, active, "user activation changed");
        Ok(model.into())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::graphql::test_support::*;
    use platform_authz::Session;
    use sea_orm::{DatabaseBackend, MockDatabase};

    fn role_row(org_id: Uuid, is_super: bool) -> roles::Model {
        let now = Utc::now().into();
        roles::Model {
            id: Uuid::new_v4(),
            org_id,
            name: "Administrator".into(),
            machine_name: "administrator".into(),
            is_active: true,
            is_super,
            permissions: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    fn user_row(session: &Session, role_id: Uuid) -> users::Model {
        let now = Utc::now().into();
        users::Model {
            id: session.user_id,
            org_id: session.org_id,
            role_id,
            email: session.email.clone(),
            name: session.name.clone(),
            phone: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    fn assign_query(user_id: Uuid, role_id: Uuid) -> String {
        format!(
            r#"mutation {{ assignRole(userId: "{user_id}", roleId: "{role_id}") {{ id roleId }} }}"#
        )
    }

    #[test]
    fn emails_are_normalized() {
        assert_eq!(normalize_email("  Ops@Example.COM ").unwrap(), "ops@example.com");
        assert!(normalize_email("ops").is_err());
        assert!(normalize_email("@example.com").is_err());
        assert!(normalize_email("ops@localhost").is_err());
    }

    #[tokio::test]
    async fn short_password_is_rejected() {
        let pool = MockDatabase::new(DatabaseBackend::Postgres).into_connection();
        let (schema, session) = schema_with_role(pool, &[known::USERS_CREATE]);
        let query = format!(
            r#"mutation {{ createUser(input: {{ email: "new@shiptrack.test", roleId: "{}", password: "short" }}) {{ id }} }}"#,
            Uuid::new_v4()
        );
        let response = run_as(&schema, &session, &query).await;
        assert_eq!(error_code(&response).as_deref(), Some("INVALID_INPUT"));
    }

    #[tokio::test]
    async fn self_deactivation_is_refused() {
        let pool = MockDatabase::new(DatabaseBackend::Postgres).into_connection();
        let (schema, session) = schema_with_role(pool, &[known::USERS_UPDATE]);
        let query = format!(
            r#"mutation {{ setUserActive(userId: "{}", active: false) {{ id }} }}"#,
            session.user_id
        );
        let response = run_as(&schema, &session, &query).await;
        assert_eq!(error_code(&response).as_deref(), Some("INVALID_INPUT"));
    }

    #[tokio::test]
    async fn standard_caller_cannot_assign_the_super_role() {
        let (_, sample) = schema_with_role(
            MockDatabase::new(DatabaseBackend::Postgres).into_connection(),
            &[],
        );
        let admin = role_row(sample.org_id, true);
        let pool = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([vec![user_row(&sample, Uuid::new_v4())]])
                .append_query_results([vec![admin.clone()]])
                .into_connection(),
        );
        let (schema, session) = schema_sharing(pool.clone(), &[known::USERS_UPDATE]);
        let session = Session {
            user_id: sample.user_id,
            org_id: sample.org_id,
            ..session
        };
        let response = run_as(&schema, &session, &assign_query(session.user_id, admin.id)).await;
        assert_eq!(error_code(&response).as_deref(), Some("PERMISSION_DENIED"));
        drop(schema);
        // the two lookups ran; no update followed
        assert_eq!(transaction_log(pool).len(), 2);
    }

    #[tokio::test]
    async fn super_caller_can_assign_the_super_role() {
        let (_, sample) = schema_with_super(
            MockDatabase::new(DatabaseBackend::Postgres).into_connection(),
        );
        let admin = role_row(sample.org_id, true);
        let target = Uuid::new_v4();
        let before = users::Model {
            id: target,
            ..user_row(&sample, Uuid::new_v4())
        };
        let after = users::Model {
            role_id: admin.id,
            ..before.clone()
        };
        let pool = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![before]])
            .append_query_results([vec![admin.clone()]])
            .append_query_results([vec![after]])
            .into_connection();
        let (schema, session) = schema_with_super(pool);
        let session = Session {
            org_id: sample.org_id,
            ..session
        };
        let response = run_as(&schema, &session, &assign_query(target, admin.id)).await;
        assert!(response.errors.is_empty(), "{:?}", response.errors);
        let body = response.data.into_json().unwrap();
        assert_eq!(body["assignRole"]["roleId"], admin.id.to_string());
    }

    #[tokio::test]
    async fn standard_caller_cannot_create_a_super_role_user() {
        let (_, sample) = schema_with_role(
            MockDatabase::new(DatabaseBackend::Postgres).into_connection(),
            &[],
        );
        let admin = role_row(sample.org_id, true);
        let pool = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([vec![admin.clone()]])
                .into_connection(),
        );
        let (schema, session) = schema_sharing(pool.clone(), &[known::USERS_CREATE]);
        let session = Session {
            org_id: sample.org_id,
            ..session
        };
        let query = format!(
            r#"mutation {{ createUser(input: {{ email: "root@shiptrack.test", roleId: "{}", password: "long enough secret" }}) {{ id }} }}"#,
            admin.id
        );
        let response = run_as(&schema, &session, &query).await;
        assert_eq!(error_code(&response).as_deref(), Some("PERMISSION_DENIED"));
        assert_eq!(
            response.errors[0]
                .extensions
                .as_ref()
                .and_then(|ext| ext.get("permission"))
                .cloned(),
            Some(async_graphql::Value::String("users.create".into()))
        );
        drop(schema);
        assert_eq!(transaction_log(pool).len(), 1);
    }

    #[tokio::test]
    async fn listing_users_needs_users_read() {
        let pool = MockDatabase::new(DatabaseBackend::Postgres).into_connection();
        let (schema, session) = schema_with_role(pool, &[known::SHIPMENTS_READ]);
        let response = run_as(&schema, &session, "{ users { id } }").await;
        assert_eq!(error_code(&response).as_deref(), Some("PERMISSION_DENIED"));
    }
}
