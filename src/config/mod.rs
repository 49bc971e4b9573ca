use std::str::FromStr;

use anyhow::Result;
use dotenvy::dotenv;
use serde::Deserialize;
use sqlx::postgres::PgConnectOptions;

use crate::error::DirectoryError;

/// Configuration for the application
#[derive(Debug, Deserialize)]
pub struct Config {
    /// Full connection URL; when set it wins over the individual fields
    #[serde(default)]
    pub database_url: Option<String>,
    #[serde(default = "default_host")]
    pub db_host: String,
    #[serde(default = "default_port")]
    pub db_port: u16,
    #[serde(default = "default_name")]
    pub db_name: String,
    #[serde(default = "default_user")]
    pub db_user: String,
    #[serde(default)]
    pub db_password: Option<String>,
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    5432
}

fn default_name() -> String {
    "clients_db".to_string()
}

fn default_user() -> String {
    "postgres".to_string()
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// This function will:
    /// 1. Load variables from .env file if it exists
    /// 2. Deserialize environment variables into Config struct
    pub fn load() -> Result<Self> {
        dotenv().ok();

        let config = envy::from_env::<Config>()?;

        Ok(config)
    }

    /// Replace the connection URL, e.g. from a command line flag
    pub fn with_database_url(mut self, url: Option<String>) -> Self {
        if url.is_some() {
            self.database_url = url;
        }
        self
    }

    /// Build connection options for the single directory connection
    pub fn connect_options(&self) -> Result<PgConnectOptions, DirectoryError> {
        if let Some(url) = &self.database_url {
            return PgConnectOptions::from_str(url)
                .map_err(|e| DirectoryError::Config(format!("invalid DATABASE_URL: {}", e)));
        }

        let mut options = PgConnectOptions::new()
            .host(&self.db_host)
            .port(self.db_port)
            .database(&self.db_name)
            .username(&self.db_user);

        if let Some(password) = &self.db_password {
            options = options.password(password);
        }

        Ok(options)
    }
}

/// Initialize environment variables and load configuration
pub fn init() -> Result<Config> {
    dotenv().ok();

    let config = Config::load()?;

    Ok(config)
}
