//! API server configuration

use freezealert_billing::StripeConfig;
use freezealert_shared::{config, ConfigError, TwilioConfig};

const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8080";
const DEFAULT_PUBLIC_BASE_URL: &str = "http://localhost:8080";
const DEFAULT_ZIP_DATA_PATH: &str = "data/zip-timezones.json";

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_address: String,
    /// Externally visible origin; Twilio signs the URL it was configured with
    pub public_base_url: String,
    pub zip_data_path: String,
    pub run_migrations: bool,
    pub twilio: TwilioConfig,
    pub stripe: StripeConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            database_url: config::required("DATABASE_URL")?,
            bind_address: config::or_default("BIND_ADDRESS", DEFAULT_BIND_ADDRESS),
            public_base_url: config::trim_base_url(&config::or_default(
                "PUBLIC_BASE_URL",
                DEFAULT_PUBLIC_BASE_URL,
            )),
            zip_data_path: config::or_default("ZIP_DATA_PATH", DEFAULT_ZIP_DATA_PATH),
            run_migrations: config::parsed_or("RUN_MIGRATIONS", true)?,
            twilio: TwilioConfig::from_env()?,
            stripe: StripeConfig::from_env()?,
        })
    }
}
