use std::path::Path;

use sea_orm::{ConnectOptions, Database, DatabaseConnection, DbErr};

use crate::config::DatabaseConfig;

pub async fn connect(config: &DatabaseConfig) -> Result<DatabaseConnection, DbErr> {
    let abs_path = std::fs::canonicalize(&config.path)
        .unwrap_or_else(|_| std::path::PathBuf::from(&config.path));
    tracing::info!("Database absolute path: {:?}", abs_path);

    // Ensure parent directory exists
    if let Some(parent) = Path::new(&config.path).parent() {
        tokio::fs::create_dir_all(parent).await.ok();
    }

    let mut options = ConnectOptions::new(format!("sqlite:{}?mode=rwc", config.path));
    options
        .max_connections(config.max_connections)
        .sqlx_logging(false);

    let db = Database::connect(options).await?;
    run_migrations(&db).await?;

    Ok(db)
}

async fn run_migrations(db: &DatabaseConnection) -> Result<(), DbErr> {
    sqlx::migrate!("./migrations")
        .run(db.get_sqlite_connection_pool())
        .await
        .map_err(|e| {
            tracing::error!("Database migration failed: {}", e);
            DbErr::Migration(e.to_string())
        })?;

    tracing::info!("Database migrations applied successfully");
    Ok(())
}
