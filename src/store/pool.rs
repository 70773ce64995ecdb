use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use crate::config::Config;

#[tracing::instrument(skip(cfg), fields(max_connections = cfg.db_max_connections), err)]
pub async fn connect(cfg: &Config) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(cfg.db_max_connections)
        .acquire_timeout(cfg.db_acquire_timeout)
        .connect(&cfg.database_url)
        .await?;

    tracing::info!("connected to postgres");

    sqlx::migrate!().run(&pool).await?;
    tracing::info!("migrations applied");

    Ok(pool)
}
