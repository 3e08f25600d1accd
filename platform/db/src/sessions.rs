use chrono::{DateTime, Duration, Utc};
use entity::{sessions, users};
use platform_authz::Session;
use sea_orm::{ActiveModelTrait, EntityTrait, Set};
use tracing::debug;
use uuid::Uuid;

use crate::{DbPool, DbResult};

pub struct NewSession<'a> {
    pub user_id: Uuid,
    pub ttl: Duration,
    pub user_agent: Option<&'a str>,
}

pub async fn create_session(pool: &DbPool, new: NewSession<'_>) -> DbResult<sessions::Model> {
    let now = Utc::now();
    let model = sessions::ActiveModel {
        id: Set(Uuid::new_v4()),
        user_id: Set(new.user_id),
        created_at: Set(now.into()),
        expires_at: Set((now + new.ttl).into()),
        user_agent: Set(new.user_agent.map(str::to_string)),
    }
    .insert(pool)
    .await?;
    Ok(model)
}

/// Resolve a session id into the caller the gate will see.
///
/// Expired sessions are purged and come back as `None`, as do sessions of
/// deactivated users.
pub async fn load_session(
    pool: &DbPool,
    session_id: Uuid,
    now: DateTime<Utc>,
) -> DbResult<Option<Session>> {
    let Some(session) = sessions::Entity::find_by_id(session_id).one(pool).await? else {
        return Ok(None);
    };
    if session.expires_at.with_timezone(&Utc) <= now {
        debug!(%session_id, "session expired");
        delete_session(pool, session_id).await?;
        return Ok(None);
    }
    let Some(user) = users::Entity::find_by_id(session.user_id).one(pool).await? else {
        return Ok(None);
    };
    if !user.is_active {
        debug!(user_id = %user.id, "session belongs to inactive user");
        return Ok(None);
    }
    Ok(Some(Session {
        session_id,
        user_id: user.id,
        role_id: user.role_id,
        org_id: user.org_id,
        email: user.email,
        name: user.name,
        phone: user.phone,
    }))
}

pub async fn delete_session(pool: &DbPool, session_id: Uuid) -> DbResult<()> {
    sessions::Entity::delete_by_id(session_id).exec(pool).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};

    fn user(role_id: Uuid, active: bool) -> users::Model {
        let now = Utc::now().into();
        users::Model {
            id: Uuid::new_v4(),
            org_id: Uuid::new_v4(),
            role_id,
            email: "clerk@shiptrack.test".into(),
            name: Some("Clerk".into()),
            phone: Some("+31 20 555 0100".into()),
            is_active: active,
            created_at: now,
            updated_at: now,
        }
    }

    fn session_row(user_id: Uuid, expires_in: Duration) -> sessions::Model {
        let now = Utc::now();
        sessions::Model {
            id: Uuid::new_v4(),
            user_id,
            created_at: now.into(),
            expires_at: (now + expires_in).into(),
            user_agent: None,
        }
    }

    #[tokio::test]
    async fn live_session_carries_user_role_and_org() {
        let role_id = Uuid::new_v4();
        let user = user(role_id, true);
        let row = session_row(user.id, Duration::hours(1));
        let session_id = row.id;
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![row]])
            .append_query_results([vec![user.clone()]])
            .into_connection();

        let session = load_session(&db, session_id, Utc::now())
            .await
            .unwrap()
            .expect("session");
        assert_eq!(session.role_id, role_id);
        assert_eq!(session.org_id, user.org_id);
        assert_eq!(session.phone.as_deref(), Some("+31 20 555 0100"));
    }

    #[tokio::test]
    async fn expired_session_is_purged() {
        let row = session_row(Uuid::new_v4(), Duration::minutes(-5));
        let session_id = row.id;
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![row]])
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 1,
            }])
            .into_connection();

        assert!(load_session(&db, session_id, Utc::now()).await.unwrap().is_none());
        let log = db.into_transaction_log();
        assert_eq!(log.len(), 2);
    }

    #[tokio::test]
    async fn inactive_user_has_no_session() {
        let user = user(Uuid::new_v4(), false);
        let row = session_row(user.id, Duration::hours(1));
        let session_id = row.id;
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![row]])
            .append_query_results([vec![user]])
            .into_connection();
        assert!(load_session(&db, session_id, Utc::now()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unknown_session_id_is_none() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([Vec::<sessions::Model>::new()])
            .into_connection();
        assert!(load_session(&db, Uuid::new_v4(), Utc::now()).await.unwrap().is_none());
    }
}
