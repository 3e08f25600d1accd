//! Marks shipments that missed their ETA as delayed and tells whoever booked them.

use chrono::{DateTime, Utc};
use entity::{
    notifications,
    shipments::{self, Status},
};
use platform_db::DbPool;
use sea_orm::{
    ActiveValue::Set, ColumnTrait, DbErr, EntityTrait, QueryFilter, QuerySelect,
    TransactionTrait,
};
use serde::Serialize;
use tracing::{info, instrument};
use uuid::Uuid;

#[derive(Clone, Debug, Serialize)]
pub struct DelayReport {
    pub checked_at: DateTime<Utc>,
    pub delayed: Vec<DelayedShipment>,
}

#[derive(Clone, Debug, Serialize)]
pub struct DelayedShipment {
    pub id: Uuid,
    pub reference: String,
    pub eta: Option<DateTime<Utc>>,
}

/// One pass over every org. Status changes and notifications commit together.
#[instrument(name = "jobs.delay_check", skip(pool))]
pub async fn run(pool: &DbPool, now: DateTime<Utc>) -> Result<DelayReport, DbErr> {
    let txn = pool.begin().await?;
    let overdue = shipments::Entity::find()
        .filter(shipments::Column::Status.is_in([Status::Booked, Status::InTransit]))
        .filter(shipments::Column::Eta.lt(now))
        .lock_exclusive()
        .all(&txn)
        .await?;
    let overdue: Vec<_> = overdue
        .into_iter()
        .filter(|shipment| shipment.status.is_moving())
        .collect();

    if overdue.is_empty() {
        txn.commit().await?;
        return Ok(DelayReport {
            checked_at: now,
            delayed: Vec::new(),
        });
    }

    let ids: Vec<Uuid> = overdue.iter().map(|shipment| shipment.id).collect();
    shipments::Entity::update_many()
        .set(shipments::ActiveModel {
            status: Set(Status::Delayed),
            updated_at: Set(now.into()),
            ..Default::default()
        })
        .filter(shipments::Column::Id.is_in(ids))
        .exec(&txn)
        .await?;

    let notices = overdue.iter().map(|shipment| notifications::ActiveModel {
        id: Set(Uuid::new_v4()),
        org_id: Set(shipment.org_id),
        user_id: Set(shipment.created_by),
        shipment_id: Set(Some(shipment.id)),
        message: Set(format!(
            "Shipment {} from {} to {} is past its ETA and is now marked delayed",
            shipment.reference, shipment.origin, shipment.destination
        )),
        created_at: Set(now.into()),
        read_at: Set(None),
    });
    notifications::Entity::insert_many(notices)
        .exec_without_returning(&txn)
        .await?;
    txn.commit().await?;

    let delayed: Vec<DelayedShipment> = overdue
        .into_iter()
        .map(|shipment| DelayedShipment {
            id: shipment.id,
            reference: shipment.reference,
            eta: shipment.eta.map(|at| at.with_timezone(&Utc)),
        })
        .collect();
    info!(count = delayed.len(), "shipments marked delayed");
    Ok(DelayReport {
        checked_at: now,
        delayed,
    })
}
