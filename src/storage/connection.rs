use crate::storage::entity;
use log::info;
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbErr, Schema};
use std::time::Duration;

pub async fn establish_connection(db_url: &str) -> Result<DatabaseConnection, DbErr> {
    let mut opt = ConnectOptions::new(db_url.to_owned());
    opt.max_connections(10)
        .min_connections(2)
        .connect_timeout(Duration::from_secs(8))
        .acquire_timeout(Duration::from_secs(8))
        .idle_timeout(Duration::from_secs(8))
        .max_lifetime(Duration::from_secs(8))
        .sqlx_logging(true)
        .sqlx_logging_level(log::LevelFilter::Info);

    let db = Database::connect(opt).await?;

    // 启用 WAL 模式
    let _ = sea_orm::ConnectionTrait::execute(
        &db,
        sea_orm::Statement::from_string(
            sea_orm::DatabaseBackend::Sqlite,
            "PRAGMA journal_mode=WAL;".to_string(),
        ),
    )
    .await?;

    // 创建表（如果不存在）
    let builder = db.get_database_backend();
    let schema = Schema::new(builder);

    // Collections table
    let stmt = builder.build(
        schema
            .create_table_from_entity(entity::collection::Entity)
            .if_not_exists(),
    );
    db.execute(stmt).await?;

    // Fields table
    let stmt = builder.build(
        schema
            .create_table_from_entity(entity::field::Entity)
            .if_not_exists(),
    );
    db.execute(stmt).await?;

    // Spike Schedules table
    let stmt = builder.build(
        schema
            .create_table_from_entity(entity::spike_schedule::Entity)
            .if_not_exists(),
    );
    db.execute(stmt).await?;

    // Spike Schedule Fields table
    let stmt = builder.build(
        schema
            .create_table_from_entity(entity::spike_schedule_field::Entity)
            .if_not_exists(),
    );
    db.execute(stmt).await?;

    // 唯一索引：同一集合同一分区内字段名不重复
    let _ = sea_orm::ConnectionTrait::execute(
        &db,
        sea_orm::Statement::from_string(
            sea_orm::DatabaseBackend::Sqlite,
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_fields_unique ON fields(collection_id, collection_type, field_name);".to_string(),
        ),
    )
    .await?;

    // 唯一索引：一个调度内每个字段至多一条覆盖
    let _ = sea_orm::ConnectionTrait::execute(
        &db,
        sea_orm::Statement::from_string(
            sea_orm::DatabaseBackend::Sqlite,
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_spike_fields_unique ON spike_schedule_fields(spike_schedule_id, original_field_id);".to_string(),
        ),
    )
    .await?;

    info!("Database connection established with WAL mode and table initialized.");

    Ok(db)
}
