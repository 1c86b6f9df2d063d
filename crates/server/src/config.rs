use std::env;

#[derive(Clone)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub jwt_secret: String,
    pub webhook_secret: String,
    /// When true (the default), checkout simulates a successful payment and
    /// paid enrollments are recorded as `completed` immediately. When false,
    /// paid enrollments stay `pending` until a payment-confirmation step is
    /// wired up, and a pending enrollment does not unlock course content.
    pub checkout_auto_complete: bool,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            port: env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(3000),
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:./data/academy.db?mode=rwc".to_string()),
            jwt_secret: env::var("JWT_SECRET")
                .unwrap_or_else(|_| "development-secret-change-in-production".to_string()),
            webhook_secret: env::var("WEBHOOK_SECRET")
                .unwrap_or_else(|_| "whsec_ZGV2ZWxvcG1lbnQtd2ViaG9vay1zZWNyZXQ=".to_string()),
            checkout_auto_complete: env::var("CHECKOUT_AUTO_COMPLETE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(true),
        }
    }
}
