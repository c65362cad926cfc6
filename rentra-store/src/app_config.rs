use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub auth: AuthConfig,
    pub gateway: GatewayConfig,
    pub rules: BookingRules,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RedisConfig {
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GatewayConfig {
    pub secret_key: String,
    pub webhook_secret: String,
    pub base_url: String,
    pub success_url: String,
    pub cancel_url: String,
}

/// Tunables for the booking subsystem.
///
/// `grace_window_seconds` is read by both the availability predicate and the
/// expiry reaper. It must stay a single value: if the oracle stopped
/// treating a pending reservation as blocking before the reaper expired it,
/// that window could be double-booked.
#[derive(Debug, Deserialize, Clone)]
pub struct BookingRules {
    pub grace_window_seconds: u64,
    pub lock_ttl_seconds: u64,
    pub idempotency_ttl_seconds: u64,
    pub reaper_interval_seconds: u64,
    pub verify_poll_attempts: u32,
    pub verify_poll_delay_ms: u64,
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Local overrides, not checked in.
            .add_source(config::File::with_name("config/local").required(false))
            // Eg. `RENTRA__SERVER__PORT=9000` overrides `server.port`.
            .add_source(config::Environment::with_prefix("RENTRA").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
