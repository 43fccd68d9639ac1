use std::env;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub jwt_secret: String,
    /// Externally reachable base URL used to build gateway callback URLs.
    pub public_base_url: String,
    pub gateways: GatewayConfig,
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub zarinpal_merchant_id: String,
    pub payir_api_key: String,
    pub idpay_api_key: String,
    pub sandbox: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            zarinpal_merchant_id: "sandbox-merchant".to_string(),
            payir_api_key: "test".to_string(),
            idpay_api_key: "sandbox-api-key".to_string(),
            sandbox: true,
        }
    }
}

impl GatewayConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            zarinpal_merchant_id: env::var("ZARINPAL_MERCHANT_ID")
                .unwrap_or(defaults.zarinpal_merchant_id),
            payir_api_key: env::var("PAYIR_API_KEY").unwrap_or(defaults.payir_api_key),
            idpay_api_key: env::var("IDPAY_API_KEY").unwrap_or(defaults.idpay_api_key),
            sandbox: env::var("PAYMENT_SANDBOX")
                .ok()
                .and_then(|v| v.parse::<bool>().ok())
                .unwrap_or(defaults.sandbox),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = env::var("DATABASE_URL")?;
        let jwt_secret = env::var("JWT_SECRET")?;
        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .ok()
            .and_then(|p| p.parse::<u16>().ok())
            .unwrap_or(3000);
        let public_base_url = env::var("PUBLIC_BASE_URL")
            .unwrap_or_else(|_| format!("http://{host}:{port}"));
        Ok(Self {
            port,
            database_url,
            host,
            jwt_secret,
            public_base_url,
            gateways: GatewayConfig::from_env(),
        })
    }
}
