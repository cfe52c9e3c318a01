use std::sync::Arc;

use anyhow::Context;

use crate::{
    auth::repo::{PgUserStore, UserStore},
    config::AppConfig,
    memory::MemoryStore,
    posts::repo::{PgPostStore, PostStore},
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub users: Arc<dyn UserStore>,
    pub posts: Arc<dyn PostStore>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let Some(database_url) = config.database_url.clone() else {
            tracing::warn!("DATABASE_URL not set; using in-memory store, data is lost on exit");
            return Ok(Self::with_memory_store(config));
        };

        let db = sqlx::postgres::PgPoolOptions::new()
            .max_connections(10)
            .connect(&database_url)
            .await
            .context("connect to database")?;

        // every store needs the tables, so a failed migration aborts startup
        sqlx::migrate!("./migrations")
            .run(&db)
            .await
            .context("run migrations")?;
        tracing::info!("migrations applied");

        Ok(Self {
            config,
            users: Arc::new(PgUserStore::new(db.clone())) as Arc<dyn UserStore>,
            posts: Arc::new(PgPostStore::new(db)) as Arc<dyn PostStore>,
        })
    }

    pub fn with_memory_store(config: Arc<AppConfig>) -> Self {
        let store = Arc::new(MemoryStore::new());
        Self {
            config,
            users: store.clone() as Arc<dyn UserStore>,
            posts: store as Arc<dyn PostStore>,
        }
    }

    /// Fresh in-memory state with test JWT settings.
    #[cfg(test)]
    pub fn in_memory() -> Self {
        Self::with_memory_store(Arc::new(AppConfig::for_tests()))
    }
}
