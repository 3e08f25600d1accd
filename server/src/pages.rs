//! Dashboard page data. Each handler resolves its guard before loading
//! anything; a denial redirects to the login or unauthorized page.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use axum_extra::extract::cookie::PrivateCookieJar;
use entity::shipments::Mode;
use platform_authz::{Permission, known};
use serde::Serialize;
use uuid::Uuid;

use crate::{
    auth::{PageDenied, require_page},
    graphql::{ShipmentFilter, ShipmentNode, find_shipment, list_shipments},
    http::{AppState, HttpError},
};

const PAGE_SIZE: u64 = 100;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/dashboard/shipments", get(shipments_page))
        .route("/dashboard/shipments/{id}", get(shipment_page))
        .route("/dashboard/freight/air", get(air_freight_page))
        .route("/dashboard/freight/sea", get(sea_freight_page))
}

#[derive(Debug)]
pub(crate) enum PageError {
    Denied(PageDenied),
    Failed(HttpError),
}

impl From<PageDenied> for PageError {
    fn from(value: PageDenied) -> Self {
        Self::Denied(value)
    }
}

impl From<HttpError> for PageError {
    fn from(value: HttpError) -> Self {
        Self::Failed(value)
    }
}

impl IntoResponse for PageError {
    fn into_response(self) -> Response {
        match self {
            PageError::Denied(denied) => denied.into_response(),
            PageError::Failed(err) => err.into_response(),
        }
    }
}

#[derive(Serialize)]
struct ShipmentListPage {
    title: &'static str,
    shipments: Vec<ShipmentNode>,
}

#[derive(Serialize)]
struct ShipmentPage {
    shipment: ShipmentNode,
}

async fn shipments_page(
    State(state): State<AppState>,
    jar: PrivateCookieJar,
) -> Result<Json<ShipmentListPage>, PageError> {
    list_page(&state, &jar, known::SHIPMENTS_READ, None, "Shipments").await
}

async fn air_freight_page(
    State(state): State<AppState>,
    jar: PrivateCookieJar,
) -> Result<Json<ShipmentListPage>, PageError> {
    list_page(&state, &jar, known::AIR_FREIGHT_READ, Some(Mode::Air), "Air freight").await
}

async fn sea_freight_page(
    State(state): State<AppState>,
    jar: PrivateCookieJar,
) -> Result<Json<ShipmentListPage>, PageError> {
    list_page(&state, &jar, known::SEA_FREIGHT_READ, Some(Mode::Sea), "Sea freight").await
}

async fn list_page(
    state: &AppState,
    jar: &PrivateCookieJar,
    permission: Permission,
    mode: Option<Mode>,
    title: &'static str,
) -> Result<Json<ShipmentListPage>, PageError> {
    let session = require_page(state, jar, permission).await?;
    let filter = ShipmentFilter {
        mode,
        limit: PAGE_SIZE,
        ..Default::default()
    };
    let shipments = list_shipments(state.pool.as_ref(), session.org_id, filter)
        .await
        .map_err(|err| HttpError::internal(err.into()))?;
    Ok(Json(ShipmentListPage {
        title,
        shipments: shipments.into_iter().map(ShipmentNode::from).collect(),
    }))
}

async fn shipment_page(
    State(state): State<AppState>,
    jar: PrivateCookieJar,
    Path(id): Path<Uuid>,
) -> Result<Json<ShipmentPage>, PageError> {
    let session = require_page(&state, &jar, known::SHIPMENTS_READ).await?;
    let shipment = find_shipment(state.pool.as_ref(), session.org_id, id)
        .await
        .map_err(|err| HttpError::internal(err.into()))?
        .ok_or_else(|| HttpError::new(StatusCode::NOT_FOUND, "shipment not found"))?;
    Ok(Json(ShipmentPage {
        shipment: shipment.into(),
    }))
}
