//! Bootstrap data: the default org, the stock roles and one administrator.

use anyhow::Result;
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::Utc;
use entity::{roles, user_secrets, users};
use platform_authz::{PermissionSet, known};
use platform_db::DbPool;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, QueryFilter, TransactionTrait,
};
use tracing::info;
use uuid::Uuid;

use crate::auth;

pub const SUPER_ROLE: &str = "administrator";

pub struct SeedReport {
    pub org_id: Uuid,
    pub admin_email: String,
    /// Only set when the admin user was created by this run.
    pub generated_password: Option<String>,
}

struct StockRole {
    machine_name: &'static str,
    name: &'static str,
    is_super: bool,
    permissions: PermissionSet,
}

fn stock_roles() -> Vec<StockRole> {
    let viewer = PermissionSet::from_iter([
        known::SHIPMENTS_READ,
        known::DOCUMENTS_READ,
        known::AIR_FREIGHT_READ,
        known::SEA_FREIGHT_READ,
        known::NOTIFICATIONS_READ,
        known::NOTIFICATIONS_UPDATE,
    ]);
    let editor = viewer.clone().union(&PermissionSet::from_iter([
        known::SHIPMENTS_CREATE,
        known::SHIPMENTS_UPDATE,
        known::SHIPMENTS_DELETE,
        known::DOCUMENTS_CREATE,
        known::DOCUMENTS_DELETE,
    ]));
    vec![
        StockRole {
            machine_name: SUPER_ROLE,
            name: "Administrator",
            is_super: true,
            permissions: PermissionSet::new(),
        },
        StockRole {
            machine_name: "editor",
            name: "Editor",
            is_super: false,
            permissions: editor,
        },
        StockRole {
            machine_name: "viewer",
            name: "Viewer",
            is_super: false,
            permissions: viewer,
        },
    ]
}

/// Idempotent: existing roles and users are left untouched.
pub async fn run(pool: &DbPool, org_slug: &str, org_name: &str, admin_email: &str) -> Result<SeedReport> {
    let org_id = platform_db::ensure_default_org(pool, org_slug, org_name).await?;

    let mut super_role_id = None;
    for stock in stock_roles() {
        let id = ensure_role(pool, org_id, &stock).await?;
        if stock.is_super {
            super_role_id = Some(id);
        }
    }
    let super_role_id =
        super_role_id.ok_or_else(|| anyhow::anyhow!("stock roles lack a super role"))?;

    let admin_email = admin_email.trim().to_lowercase();
    let existing = users::Entity::find()
        .filter(users::Column::Email.eq(admin_email.as_str()))
        .one(pool)
        .await?;
    if existing.is_some() {
        info!(email = %admin_email, "admin user already present");
        return Ok(SeedReport {
            org_id,
            admin_email,
            generated_password: None,
        });
    }

    let password = URL_SAFE_NO_PAD.encode(rand::random::<[u8; 18]>());
    let password_hash = auth::hash_password(&password)?;
    let now = Utc::now();
    let txn = pool.begin().await?;
    let user = users::ActiveModel {
        id: Set(Uuid::new_v4()),
        org_id: Set(org_id),
        role_id: Set(super_role_id),
        email: Set(admin_email.clone()),
        name: Set(Some("Administrator".to_string())),
        phone: Set(None),
        is_active: Set(true),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
    }
    .insert(&txn)
    .await?;
    user_secrets::ActiveModel {
        user_id: Set(user.id),
        password_hash: Set(password_hash),
        updated_at: Set(now.into()),
    }
    .insert(&txn)
    .await?;
    txn.commit().await?;
    info!(user_id = %user.id, email = %admin_email, "admin user created");

    Ok(SeedReport {
        org_id,
        admin_email,
        generated_password: Some(password),
    })
}

async fn ensure_role(pool: &DbPool, org_id: Uuid, stock: &StockRole) -> Result<Uuid> {
    if let Some(existing) = roles::Entity::find()
        .filter(roles::Column::OrgId.eq(org_id))
        .filter(roles::Column::MachineName.eq(stock.machine_name))
        .one(pool)
        .await?
    {
        return Ok(existing.id);
    }
    let now = Utc::now();
    let model = roles::ActiveModel {
        id: Set(Uuid::new_v4()),
        org_id: Set(org_id),
        name: Set(stock.name.to_string()),
        machine_name: Set(stock.machine_name.to_string()),
        is_active: Set(true),
        is_super: Set(stock.is_super),
        permissions: Set(stock.permissions.to_strings()),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
    }
    .insert(pool)
    .await?;
    info!(role = stock.machine_name, "role seeded");
    Ok(model.id)
}
