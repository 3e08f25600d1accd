use std::{
    net::{IpAddr, SocketAddr},
    sync::Arc,
};

use anyhow::Context;
use async_graphql_axum::{GraphQLRequest, GraphQLResponse};
use axum::{
    Json, Router,
    extract::{FromRef, State},
    http::{self, HeaderMap, HeaderName, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use axum_extra::extract::cookie::{Cookie, Key, PrivateCookieJar, SameSite};
use chrono::Utc;
use entity::{user_secrets, users};
use platform_authz::Gate;
use platform_db::{NewSession, SharedPool};
use sea_orm::{ColumnTrait, ConnectionTrait, DatabaseBackend, EntityTrait, QueryFilter, Statement};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use time::Duration as TimeDuration;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    auth::{self, SESSION_COOKIE},
    config::AppConfig,
    delay_check::{self, DelayReport},
    graphql::SchemaType,
    pages,
};

#[derive(Clone)]
pub struct AppState {
    pub pool: SharedPool,
    pub schema: SchemaType,
    pub config: Arc<AppConfig>,
    pub gate: Gate,
    pub cookie_key: Key,
}

impl FromRef<AppState> for Key {
    fn from_ref(state: &AppState) -> Self {
        state.cookie_key.clone()
    }
}

#[derive(Clone, Debug)]
pub struct ServeConfig {
    addr: SocketAddr,
}

impl ServeConfig {
    pub fn new(host: IpAddr, port: u16) -> Self {
        Self {
            addr: SocketAddr::from((host, port)),
        }
    }
}

pub async fn serve(config: ServeConfig, state: AppState) -> anyhow::Result<()> {
    let router = build_router(state);
    let listener = tokio::net::TcpListener::bind(config.addr)
        .await
        .with_context(|| format!("failed to bind {}", config.addr))?;

    info!(%config.addr, "shiptrack server listening");
    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;
    Ok(())
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed = origins
        .iter()
        .filter_map(|origin| origin.parse::<HeaderValue>().ok())
        .collect::<Vec<_>>();
    let layer = CorsLayer::new()
        .allow_headers([http::header::CONTENT_TYPE])
        .allow_methods([Method::POST, Method::GET]);
    if allowed.is_empty() {
        layer.allow_origin(AllowOrigin::any())
    } else {
        layer
            .allow_credentials(true)
            .allow_origin(AllowOrigin::list(allowed))
    }
}

pub fn build_router(state: AppState) -> Router {
    let request_id = MakeRequestUuid;
    let header_name = HeaderName::from_static("x-request-id");
    Router::new()
        .route("/health", get(health_handler))
        .route("/login", get(login_page_handler).post(login_handler))
        .route("/logout", post(logout_handler))
        .route("/unauthorized", get(unauthorized_handler))
        .route("/graphql", post(graphql_handler))
        .route("/api/cron/delay-check", get(delay_check_handler))
        .merge(pages::routes())
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(header_name.clone(), request_id))
                .layer(PropagateRequestIdLayer::new(header_name))
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer(&state.config.cors_allowed_origins)),
        )
        .with_state(state)
}

#[derive(Deserialize)]
struct LoginRequest {
    email: String,
    password: String,
}

#[derive(Serialize)]
struct LoginResponse {
    user_id: Uuid,
    name: Option<String>,
}

async fn login_page_handler() -> impl IntoResponse {
    (
        StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({ "login_required": true })),
    )
}

async fn unauthorized_handler() -> impl IntoResponse {
    (
        StatusCode::FORBIDDEN,
        Json(serde_json::json!({ "error": "not authorized" })),
    )
}

async fn login_handler(
    State(state): State<AppState>,
    jar: PrivateCookieJar,
    headers: HeaderMap,
    Json(body): Json<LoginRequest>,
) -> HttpResult<(PrivateCookieJar, Json<LoginResponse>)> {
    let email = body.email.trim().to_lowercase();
    let user = users::Entity::find()
        .filter(users::Column::Email.eq(email.as_str()))
        .one(state.pool.as_ref())
        .await
        .map_err(|err| HttpError::internal(err.into()))?
        .filter(|user| user.is_active);
    let Some(user) = user else {
        return Err(HttpError::invalid_credentials());
    };
    let secret = user_secrets::Entity::find_by_id(user.id)
        .one(state.pool.as_ref())
        .await
        .map_err(|err| HttpError::internal(err.into()))?;
    let verified = secret
        .as_ref()
        .is_some_and(|secret| auth::verify_password(&body.password, &secret.password_hash));
    if !verified {
        warn!(user_id = %user.id, "login rejected");
        return Err(HttpError::invalid_credentials());
    }

    let user_agent = headers
        .get(http::header::USER_AGENT)
        .and_then(|value| value.to_str().ok());
    let session = platform_db::create_session(
        state.pool.as_ref(),
        NewSession {
            user_id: user.id,
            ttl: state.config.session_ttl,
            user_agent,
        },
    )
    .await
    .map_err(|err| HttpError::internal(err.into()))?;

    let cookie = Cookie::build((SESSION_COOKIE, session.id.to_string()))
        .path("/")
        .http_only(true)
        .secure(true)
        .same_site(SameSite::Lax)
        .max_age(TimeDuration::seconds(state.config.session_ttl.num_seconds()))
        .build();
    info!(user_id = %user.id, "session created");
    Ok((
        jar.add(cookie),
        Json(LoginResponse {
            user_id: user.id,
            name: user.name,
        }),
    ))
}

async fn logout_handler(
    State(state): State<AppState>,
    jar: PrivateCookieJar,
) -> HttpResult<(PrivateCookieJar, StatusCode)> {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        if let Ok(session_id) = Uuid::parse_str(cookie.value()) {
            platform_db::delete_session(state.pool.as_ref(), session_id)
                .await
                .map_err(|err| HttpError::internal(err.into()))?;
        }
    }
    let jar = jar.remove(Cookie::build((SESSION_COOKIE, "")).path("/").build());
    Ok((jar, StatusCode::NO_CONTENT))
}

async fn graphql_handler(
    State(state): State<AppState>,
    jar: PrivateCookieJar,
    request: GraphQLRequest,
) -> GraphQLResponse {
    let session = auth::current_session(state.pool.as_ref(), &jar).await;
    let req = request.into_inner().data(session);
    state.schema.execute(req).await.into()
}

async fn delay_check_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> HttpResult<Json<DelayReport>> {
    if !cron_authorized(state.config.cron_secret.as_deref(), &headers) {
        warn!("delay check trigger rejected");
        return Err(HttpError::new(StatusCode::UNAUTHORIZED, "invalid cron secret"));
    }
    let report = delay_check::run(state.pool.as_ref(), Utc::now())
        .await
        .map_err(|err| HttpError::internal(err.into()))?;
    Ok(Json(report))
}

/// No configured secret means the trigger is disabled.
fn cron_authorized(secret: Option<&str>, headers: &HeaderMap) -> bool {
    let Some(secret) = secret else {
        return false;
    };
    headers
        .get(http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .is_some_and(|token| token.trim().as_bytes().ct_eq(secret.as_bytes()).into())
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let db_ok = state
        .pool
        .execute(Statement::from_string(
            DatabaseBackend::Postgres,
            "SELECT 1".to_string(),
        ))
        .await
        .is_ok();
    Json(HealthResponse {
        ok: db_ok,
        db_ok,
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Serialize)]
struct HealthResponse {
    ok: bool,
    db_ok: bool,
    version: &'static str,
}

pub(crate) type HttpResult<T> = Result<T, HttpError>;

#[derive(Debug)]
pub(crate) struct HttpError {
    status: StatusCode,
    message: String,
}

impl HttpError {
    pub(crate) fn new(status: StatusCode, msg: &str) -> Self {
        Self {
            status,
            message: msg.to_string(),
        }
    }

    fn invalid_credentials() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "invalid credentials")
    }

    pub(crate) fn internal(err: anyhow::Error) -> Self {
        tracing::error!(error = %err, "request failed");
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: "internal server error".to_string(),
        }
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        (self.status, self.message).into_response()
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install CTRL+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        signal(SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    ctrl_c.await;

    #[cfg(unix)]
    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    };
}
