//! Database primitives shared by the server and the role store.

mod roles;
mod sessions;

use std::{sync::Arc, time::Duration};

use chrono::Utc;
use entity::orgs;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectOptions, Database, DatabaseConnection, DbErr,
    EntityTrait, QueryFilter, Set,
};
use serde::Deserialize;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

pub use roles::{SeaRoleStore, role_record};
pub use sessions::{NewSession, create_session, delete_session, load_session};

/// sea-orm connection handle.
pub type DbPool = DatabaseConnection;

/// Connection handle held by long-lived state (role store, router, schema).
pub type SharedPool = Arc<DbPool>;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("database url missing (set {0})")]
    MissingUrl(String),
    #[error("database error: {0}")]
    Query(#[from] DbErr),
}

pub type DbResult<T> = Result<T, DbError>;

/// Environment-driven connection settings.
#[derive(Clone, Debug, Deserialize)]
pub struct DatabaseSettings {
    #[serde(default = "default_url_key")]
    env_key: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_acquire_timeout_ms")]
    pub acquire_timeout_ms: u64,
}

fn default_url_key() -> String {
    "DATABASE_URL".to_string()
}

fn default_max_connections() -> u32 {
    10
}

fn default_acquire_timeout_ms() -> u64 {
    3_000
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self::new(default_url_key())
    }
}

impl DatabaseSettings {
    pub fn new(env_key: impl Into<String>) -> Self {
        Self {
            env_key: env_key.into(),
            max_connections: default_max_connections(),
            acquire_timeout_ms: default_acquire_timeout_ms(),
        }
    }

    pub fn from_env() -> Self {
        let mut settings = Self::default();
        if let Some(max) = std::env::var("DATABASE_MAX_CONNECTIONS")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            settings.max_connections = max;
        }
        if let Some(ms) = std::env::var("DATABASE_ACQUIRE_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            settings.acquire_timeout_ms = ms;
        }
        settings
    }

    pub fn database_url(&self) -> DbResult<String> {
        std::env::var(&self.env_key).map_err(|_| DbError::MissingUrl(self.env_key.clone()))
    }
}

pub async fn connect(settings: &DatabaseSettings) -> DbResult<DbPool> {
    let url = settings.database_url()?;
    let mut options = ConnectOptions::new(url);
    options
        .max_connections(settings.max_connections)
        .acquire_timeout(Duration::from_millis(settings.acquire_timeout_ms))
        .sqlx_logging(false);
    Ok(Database::connect(options).await?)
}

/// Return the id of the org with `slug`, creating it on first boot.
pub async fn ensure_default_org(pool: &DbPool, slug: &str, name: &str) -> DbResult<Uuid> {
    if let Some(existing) = orgs::Entity::find()
        .filter(orgs::Column::Slug.eq(slug))
        .one(pool)
        .await?
    {
        return Ok(existing.id);
    }
    let id = Uuid::new_v4();
    orgs::ActiveModel {
        id: Set(id),
        slug: Set(slug.to_string()),
        name: Set(name.to_string()),
        created_at: Set(Utc::now().into()),
    }
    .insert(pool)
    .await?;
    info!(%id, slug, "default org created");
    Ok(id)
}
