use sea_orm_migration::sea_orm::ConnectionTrait;
use sea_orm_migration::prelude::*;

const UP_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS shipments (
    id uuid PRIMARY KEY DEFAULT gen_random_uuid(),
    org_id uuid NOT NULL REFERENCES orgs(id) ON DELETE CASCADE,
    reference text NOT NULL,
    mode varchar(16) NOT NULL CHECK (mode IN ('air', 'sea')),
    status varchar(16) NOT NULL DEFAULT 'booked'
        CHECK (status IN ('booked', 'in_transit', 'customs', 'delayed', 'delivered', 'cancelled')),
    origin text NOT NULL,
    destination text NOT NULL,
    carrier text NULL,
    eta timestamptz NULL,
    delivered_at timestamptz NULL,
    created_by uuid NOT NULL REFERENCES users(id),
    created_at timestamptz NOT NULL DEFAULT now(),
    updated_at timestamptz NOT NULL DEFAULT now(),
    UNIQUE (org_id, reference)
);

CREATE INDEX IF NOT EXISTS idx_shipments_status_eta ON shipments (status, eta);

CREATE TABLE IF NOT EXISTS documents (
    id uuid PRIMARY KEY DEFAULT gen_random_uuid(),
    org_id uuid NOT NULL REFERENCES orgs(id) ON DELETE CASCADE,
    shipment_id uuid NOT NULL REFERENCES shipments(id) ON DELETE CASCADE,
    kind text NOT NULL,
    file_name text NOT NULL,
    storage_url text NOT NULL,
    uploaded_by uuid NOT NULL REFERENCES users(id),
    created_at timestamptz NOT NULL DEFAULT now()
);

CREATE TABLE IF NOT EXISTS notifications (
    id uuid PRIMARY KEY DEFAULT gen_random_uuid(),
    org_id uuid NOT NULL REFERENCES orgs(id) ON DELETE CASCADE,
    user_id uuid NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    shipment_id uuid NULL REFERENCES shipments(id) ON DELETE SET NULL,
    message text NOT NULL,
    created_at timestamptz NOT NULL DEFAULT now(),
    read_at timestamptz NULL
);

CREATE INDEX IF NOT EXISTS idx_notifications_user ON notifications (user_id, read_at);
"#;

const DOWN_SQL: &str = r#"
DROP TABLE IF EXISTS notifications CASCADE;
DROP TABLE IF EXISTS documents CASCADE;
DROP TABLE IF EXISTS shipments CASCADE;
"#;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared(UP_SQL)
            .await
            .map(|_| ())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared(DOWN_SQL)
            .await
            .map(|_| ())
    }
}
