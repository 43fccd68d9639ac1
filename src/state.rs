use std::sync::Arc;

use sea_orm::DatabaseConnection;

use crate::{
    clock::{Clock, SystemClock},
    config::AppConfig,
    gateways::GatewayRegistry,
};

#[derive(Clone)]
pub struct AppState {
    pub orm: DatabaseConnection,
    pub clock: Arc<dyn Clock>,
    pub gateways: Arc<GatewayRegistry>,
    pub jwt_secret: Arc<str>,
}

impl AppState {
    pub fn new(orm: DatabaseConnection, config: &AppConfig) -> anyhow::Result<Self> {
        let gateways = GatewayRegistry::from_config(&config.public_base_url, &config.gateways)?;
        Ok(Self {
            orm,
            clock: Arc::new(SystemClock),
            gateways: Arc::new(gateways),
            jwt_secret: Arc::from(config.jwt_secret.as_str()),
        })
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }
}
