use crate::config::Config;
use crate::db::connection::{DbPool, init_db};
use crate::error::StartupError;
use crate::realtime::{ConnectionHub, EventBus, InMemoryBus, NatsBus};
use std::sync::Arc;
use tokio::time::{Duration, interval};
use tracing::{error, info};

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub bus: Arc<dyn EventBus>,
    pub hub: Arc<ConnectionHub>,
    pub config: Arc<Config>,
}

impl AppState {
    pub async fn new(config: Config) -> Result<Self, StartupError> {
        let db = init_db(&config.database_url).await?;

        let bus: Arc<dyn EventBus> = match &config.nats_url {
            Some(url) => {
                info!("backing the event bus with NATS");
                Arc::new(NatsBus::connect(url).await?)
            }
            None => {
                info!("backing the event bus with in-process dispatch");
                Arc::new(InMemoryBus::new())
            }
        };

        let hub = Arc::new(ConnectionHub::new());

        let db_clone = db.clone();
        tokio::spawn(async move {
            let mut interval = interval(Duration::from_secs(60));
            loop {
                interval.tick().await;
                match db_clone.acquire().await {
                    Ok(conn) => {
                        drop(conn);
                    }
                    Err(e) => {
                        error!("Database connection health check failed: {}", e);
                    }
                }
            }
        });

        Ok(AppState {
            db,
            bus,
            hub,
            config: Arc::new(config),
        })
    }
}
