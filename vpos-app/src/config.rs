//! Configuration loading from environment.

use std::env;
use std::time::Duration;

/// Application configuration.
pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub public_key: String,
    pub private_key: String,
    /// Provider staging environment when true.
    pub test_mode: bool,
    /// Overrides the provider base URL entirely (local mocks, proxies).
    pub base_url_override: Option<String>,
    pub gateway_timeout: Duration,
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        let port = env::var("PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()?;

        let database_url = env::var("DATABASE_URL")
            .map_err(|_| anyhow::anyhow!("DATABASE_URL environment variable is required"))?;

        let public_key = env::var("VPOS_PUBLIC_KEY")
            .map_err(|_| anyhow::anyhow!("VPOS_PUBLIC_KEY environment variable is required"))?;
        let private_key = env::var("VPOS_PRIVATE_KEY")
            .map_err(|_| anyhow::anyhow!("VPOS_PRIVATE_KEY environment variable is required"))?;

        let test_mode = env::var("VPOS_TEST_MODE")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(true);
        let base_url_override = env::var("VPOS_BASE_URL").ok();

        let gateway_timeout = Duration::from_secs(
            env::var("VPOS_TIMEOUT_SECS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()?,
        );

        Ok(Self {
            port,
            database_url,
            public_key,
            private_key,
            test_mode,
            base_url_override,
            gateway_timeout,
        })
    }
}
