use anyhow::Result;
use dotenvy::dotenv;
use serde::Deserialize;
use std::env;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub log_level: String,
    pub kafka_bootstrap_servers: String,
    pub kafka_topic: String,
    pub kafka_group_id: String,
    pub kafka_auto_offset_reset: String,
    pub kafka_sasl_mechanism: String,
    pub kafka_username: String,
    pub kafka_password: String,
    pub kafka_security_protocol: String,
    pub kafka_max_retries: u32,
    pub kafka_circuit_breaker_cooldown: u64,
    pub gps_fix_max_age_secs: u64,
    pub sample_interval_secs: u64,
    pub alert_feed_limit: usize,
    pub allow_restart_after_end: bool,
    pub weather_api_url: String,
    pub weather_api_key: String,
}

fn var_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parsed_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        dotenv().ok();

        let db_host = var_or("DB_HOST", "localhost");
        let db_port = var_or("DB_PORT", "5432");
        let db_name = var_or("DB_DATABASE", "shuttle_tracker");
        let db_user = var_or("DB_USER", "shuttle");
        let db_pwd = var_or("DB_PWD", "shuttle");

        let database_url = format!(
            "postgres://{}:{}@{}:{}/{}",
            db_user, db_pwd, db_host, db_port, db_name
        );

        Ok(Self {
            database_url,
            log_level: var_or("LOG_LEVEL", "info"),
            kafka_bootstrap_servers: var_or("KAFKA_BOOTSTRAP_SERVERS", "localhost:9092"),
            kafka_topic: var_or("KAFKA_TOPIC", "shuttle-gps"),
            kafka_group_id: var_or("KAFKA_GROUP_ID", "shuttle-tracker-driver"),
            kafka_auto_offset_reset: var_or("KAFKA_AUTO_OFFSET_RESET", "latest"),
            kafka_sasl_mechanism: var_or("KAFKA_SASL_MECHANISM", "SCRAM-SHA-256"),
            kafka_username: env::var("KAFKA_USERNAME").unwrap_or_default(),
            kafka_password: env::var("KAFKA_PASSWORD").unwrap_or_default(),
            kafka_security_protocol: var_or("KAFKA_SECURITY_PROTOCOL", "SASL_PLAINTEXT"),
            kafka_max_retries: parsed_or("KAFKA_MAX_RETRIES", 5),
            kafka_circuit_breaker_cooldown: parsed_or("KAFKA_CIRCUIT_BREAKER_COOLDOWN", 300),
            gps_fix_max_age_secs: parsed_or("GPS_FIX_MAX_AGE_SECS", 30),
            sample_interval_secs: parsed_or::<u64>("SAMPLE_INTERVAL_SECS", 5).max(1),
            alert_feed_limit: parsed_or::<usize>("ALERT_FEED_LIMIT", 5).max(1),
            allow_restart_after_end: parsed_or("ALLOW_RESTART_AFTER_END", false),
            weather_api_url: var_or(
                "WEATHER_API_URL",
                "https://api.openweathermap.org/data/2.5/weather",
            ),
            weather_api_key: env::var("WEATHER_API_KEY").unwrap_or_default(),
        })
    }

    pub fn sample_interval(&self) -> Duration {
        Duration::from_secs(self.sample_interval_secs)
    }
}
