use anyhow::Result;
use diesel_migrations::{EmbeddedMigrations, embed_migrations};
use medbook_hospitalservice::{
    app,
    app_state::AppState,
    auth::token::TokenKeys,
    bootstrap::{self, bootstrap},
    config, db,
};

/// Migrations embedded into the binary which helps with streamlining image building process
const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

#[tokio::main]
async fn main() -> Result<()> {
    bootstrap::init_tracing();
    bootstrap::init_env();

    let config = config::load()?;

    tracing::info!("Running migrations...");
    let migrations_count = db::run_migrations_blocking(MIGRATIONS, &config.database.url).await?;
    tracing::info!("Run {} new migrations successfully", migrations_count);

    let db_pool = db::connect(&config.database).await?;
    let state = AppState::new(db_pool, TokenKeys::from_config(&config.auth));
    let app = app::build_router(state, &config.cors)?;

    tracing::info!("Bootstrapping...");
    bootstrap("HospitalService", app, &config.server).await?;
    Ok(())
}
