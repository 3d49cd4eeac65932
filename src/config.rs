use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub webhook: WebhookConfig,
    pub worker: WorkerConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub environment: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookConfig {
    /// Shared secret used to verify processor webhook signatures.
    pub signing_secret: String,
    /// Maximum accepted clock skew for signed timestamps, in seconds.
    pub tolerance_secs: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
    pub reconcile_interval_secs: u64,
    pub reconcile_stale_after_secs: i64,
    pub reconcile_batch_size: i64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let server = ServerConfig {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("PORT")
                .context("PORT not set")?
                .parse()
                .context("PORT must be a valid number")?,
            environment: env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
        };

        let database = DatabaseConfig {
            url: env::var("DATABASE_URL").context("DATABASE_URL not set")?,
            max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "20".to_string())
                .parse()
                .context("DATABASE_MAX_CONNECTIONS must be a valid number")?,
        };

        let redis = RedisConfig {
            url: env::var("REDIS_URL").context("REDIS_URL not set")?,
        };

        let webhook = WebhookConfig {
            signing_secret: env::var("STRIPE_WEBHOOK_SECRET")
                .context("STRIPE_WEBHOOK_SECRET not set")?,
            tolerance_secs: env::var("WEBHOOK_TOLERANCE_SECS")
                .unwrap_or_else(|_| "300".to_string())
                .parse()
                .context("WEBHOOK_TOLERANCE_SECS must be a valid number")?,
        };

        let worker = WorkerConfig {
            reconcile_interval_secs: env::var("RECONCILE_INTERVAL_SECS")
                .unwrap_or_else(|_| "3600".to_string())
                .parse()
                .context("RECONCILE_INTERVAL_SECS must be a valid number")?,
            reconcile_stale_after_secs: env::var("RECONCILE_STALE_AFTER_SECS")
                .unwrap_or_else(|_| "1800".to_string())
                .parse()
                .context("RECONCILE_STALE_AFTER_SECS must be a valid number")?,
            reconcile_batch_size: env::var("RECONCILE_BATCH_SIZE")
                .unwrap_or_else(|_| "100".to_string())
                .parse()
                .context("RECONCILE_BATCH_SIZE must be a valid number")?,
        };

        let config = Config {
            server,
            database,
            redis,
            webhook,
            worker,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        // Validate port range
        if self.server.port < 1024 {
            return Err(anyhow!(
                "Port must be at least 1024, got {}",
                self.server.port
            ));
        }

        // Validate environment
        let valid_environments = ["development", "staging", "production"];
        if !valid_environments.contains(&self.server.environment.as_str()) {
            return Err(anyhow!(
                "Environment must be one of: {:?}, got {}",
                valid_environments,
                self.server.environment
            ));
        }

        // Validate URLs are not empty
        if self.database.url.trim().is_empty() {
            return Err(anyhow!("DATABASE_URL cannot be empty"));
        }

        if self.redis.url.trim().is_empty() {
            return Err(anyhow!("REDIS_URL cannot be empty"));
        }

        if self.webhook.signing_secret.trim().is_empty() {
            return Err(anyhow!("STRIPE_WEBHOOK_SECRET cannot be empty"));
        }

        if self.webhook.tolerance_secs <= 0 {
            return Err(anyhow!("WEBHOOK_TOLERANCE_SECS must be greater than 0"));
        }

        // Validate database max connections
        if self.database.max_connections == 0 {
            return Err(anyhow!("DATABASE_MAX_CONNECTIONS must be greater than 0"));
        }

        // Validate worker settings
        if self.worker.reconcile_batch_size <= 0 {
            return Err(anyhow!("RECONCILE_BATCH_SIZE must be greater than 0"));
        }

        if self.worker.reconcile_stale_after_secs <= 0 {
            return Err(anyhow!("RECONCILE_STALE_AFTER_SECS must be greater than 0"));
        }

        Ok(())
    }
}
