use sea_orm::DbErr;
use sea_orm::{ConnectionTrait, DatabaseConnection, Schema, Statement};

use crate::entities::{apps, balance_history, trades};

pub async fn run_migrations(db: &DatabaseConnection) -> Result<(), DbErr> {
    let backend = db.get_database_backend();
    let schema = Schema::new(backend);

    let mut apps_stmt = schema.create_table_from_entity(apps::Entity);
    apps_stmt.if_not_exists();
    db.execute(backend.build(&apps_stmt)).await?;

    let mut trades_stmt = schema.create_table_from_entity(trades::Entity);
    trades_stmt.if_not_exists();
    db.execute(backend.build(&trades_stmt)).await?;

    let mut balance_stmt = schema.create_table_from_entity(balance_history::Entity);
    balance_stmt.if_not_exists();
    db.execute(backend.build(&balance_stmt)).await?;

    create_indexes(db).await?;

    Ok(())
}

async fn create_indexes(db: &DatabaseConnection) -> Result<(), DbErr> {
    let backend = db.get_database_backend();

    // The idempotency rail for close/reinvest accounting.
    let balance_unique_idx = r#"
        CREATE UNIQUE INDEX IF NOT EXISTS uq_balance_history_trade_action
        ON balance_history (app_id, trade_id, action);
    "#;
    db.execute(Statement::from_string(backend, balance_unique_idx.to_string()))
        .await?;

    let balance_app_idx = r#"
        CREATE INDEX IF NOT EXISTS idx_balance_history_app
        ON balance_history (app_id);
    "#;
    db.execute(Statement::from_string(backend, balance_app_idx.to_string()))
        .await?;

    let trades_app_status_idx = r#"
        CREATE INDEX IF NOT EXISTS idx_trades_app_status
        ON trades (app_id, status);
    "#;
    db.execute(Statement::from_string(
        backend,
        trades_app_status_idx.to_string(),
    ))
    .await?;

    Ok(())
}
