//! PostgreSQL schema for users, balance records and slot orders

use sqlx::PgPool;

pub const CREATE_USERS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS users_tb (
    user_id     BIGSERIAL PRIMARY KEY,
    available   NUMERIC(30, 8) NOT NULL DEFAULT 0 CHECK (available >= 0),
    frozen      NUMERIC(30, 8) NOT NULL DEFAULT 0 CHECK (frozen >= 0),
    version     BIGINT NOT NULL DEFAULT 0,
    created_at  TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at  TIMESTAMPTZ NOT NULL DEFAULT NOW()
)
"#;

pub const CREATE_BALANCE_RECORDS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS balance_records_tb (
    id                BIGSERIAL PRIMARY KEY,
    user_id           BIGINT NOT NULL REFERENCES users_tb (user_id),
    kind              SMALLINT NOT NULL,
    amount            NUMERIC(30, 8) NOT NULL CHECK (amount > 0),
    before_available  NUMERIC(30, 8) NOT NULL,
    after_available   NUMERIC(30, 8) NOT NULL CHECK (after_available >= 0),
    before_frozen     NUMERIC(30, 8) NOT NULL,
    after_frozen      NUMERIC(30, 8) NOT NULL CHECK (after_frozen >= 0),
    description       TEXT NOT NULL DEFAULT '',
    operator          VARCHAR(64) NOT NULL,
    reference_id      VARCHAR(64),
    remark            JSONB,
    created_at        TIMESTAMPTZ NOT NULL DEFAULT NOW()
)
"#;

pub const CREATE_BALANCE_RECORDS_USER_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS balance_records_tb_user_id_idx ON balance_records_tb (user_id, id)
"#;

pub const CREATE_SLOT_ORDERS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS slot_orders_tb (
    id                  BIGINT PRIMARY KEY,
    order_no            VARCHAR(40) NOT NULL UNIQUE,
    user_id             BIGINT NOT NULL REFERENCES users_tb (user_id),
    order_type          SMALLINT NOT NULL,
    status              SMALLINT NOT NULL,
    bet_amount          NUMERIC(30, 8) NOT NULL CHECK (bet_amount > 0),
    win_amount          NUMERIC(30, 8) NOT NULL DEFAULT 0 CHECK (win_amount >= 0),
    game_result         JSONB,
    balance_record_ids  BIGINT[] NOT NULL DEFAULT '{}',
    reference_id        VARCHAR(64),
    created_at          TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at          TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    completed_at        TIMESTAMPTZ,
    remark              TEXT,
    UNIQUE (user_id, reference_id)
)
"#;

/// Create all tables if missing
pub async fn init_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    tracing::info!("Initializing settlement schema...");

    for ddl in [
        CREATE_USERS_TABLE,
        CREATE_BALANCE_RECORDS_TABLE,
        CREATE_BALANCE_RECORDS_USER_INDEX,
        CREATE_SLOT_ORDERS_TABLE,
    ] {
        sqlx::query(ddl).execute(pool).await?;
    }

    tracing::info!("Settlement schema ready");
    Ok(())
}
