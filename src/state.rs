use std::sync::Arc;

use redis::aio::ConnectionManager;

use crate::{
    config::Config,
    database::{ensure_admin, init_redis},
};

pub struct AppState {
    pub config: Config,
    pub redis: ConnectionManager,
}

impl AppState {
    pub async fn new() -> Arc<Self> {
        let config = Config::load();

        let mut redis = init_redis(&config.redis_url).await;
        ensure_admin(&mut redis, &config)
            .await
            .expect("Failed to seed admin credentials");

        Arc::new(Self { config, redis })
    }
}
