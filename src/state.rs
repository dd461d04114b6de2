use deadpool_postgres::Pool;

use crate::config::Config;
use crate::error::Result;
use crate::registry::RoomRegistry;
use crate::sessions::SessionStore;

/// The application's state.
#[derive(Clone)]
pub struct AppState {
    /// The database connection pool.
    pub db: Pool,
    /// The application's configuration.
    pub config: Config,
    /// The in-process session store.
    pub sessions: SessionStore,
    /// The live-connection room registry.
    pub rooms: RoomRegistry,
}

impl AppState {
    /// Creates a new `AppState`, initializing the pool and the schema.
    pub async fn new(config: &Config) -> Result<Self> {
        let db = crate::db::create_pool(&config.database_url)?;
        crate::db::init_schema(&db).await?;
        tracing::info!("PostgreSQL pool initialized, schema ensured");

        Ok(AppState {
            db,
            config: config.clone(),
            sessions: SessionStore::new(),
            rooms: RoomRegistry::new(),
        })
    }
}
