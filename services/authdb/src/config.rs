use anyhow::{Context, Result, bail};
use carebridge_crypto::EncryptionKey;
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_DB_PATH: &str = "carebridge-auth.redb";
const DEFAULT_SYNC_TIMEOUT_MS: u64 = 5_000;

// Authorization store configuration sourced from environment variables.
#[derive(Debug, Clone)]
pub struct AuthDbConfig {
    pub db_path: PathBuf,
    pub db_key: EncryptionKey,
    pub read_only: bool,
    pub bcrypt_cost: u32,
    pub sync_url: Option<String>,
    pub sync_timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct AuthDbConfigOverride {
    db_path: Option<PathBuf>,
    db_key: Option<String>,
    read_only: Option<bool>,
    bcrypt_cost: Option<u32>,
    sync_url: Option<String>,
    sync_timeout_ms: Option<u64>,
}

impl AuthDbConfig {
    pub fn from_env() -> Result<Self> {
        let db_path = std::env::var("CAREBRIDGE_DB_PATH")
            .unwrap_or_else(|_| DEFAULT_DB_PATH.to_string())
            .into();
        let db_key = std::env::var("CAREBRIDGE_DB_KEY").with_context(|| "CAREBRIDGE_DB_KEY is required")?;
        let db_key = EncryptionKey::from_base64(&db_key).with_context(|| "parse CAREBRIDGE_DB_KEY")?;
        let read_only = match std::env::var("CAREBRIDGE_DB_READ_ONLY") {
            Ok(value) => parse_bool(&value).with_context(|| "parse CAREBRIDGE_DB_READ_ONLY")?,
            Err(_) => false,
        };
        let bcrypt_cost = match std::env::var("CAREBRIDGE_BCRYPT_COST") {
            Ok(value) => value.parse().with_context(|| "parse CAREBRIDGE_BCRYPT_COST")?,
            Err(_) => bcrypt::DEFAULT_COST,
        };
        let sync_url = std::env::var("CAREBRIDGE_SYNC_URL")
            .ok()
            .filter(|url| !url.trim().is_empty());
        let sync_timeout_ms = match std::env::var("CAREBRIDGE_SYNC_TIMEOUT_MS") {
            Ok(value) => value.parse().with_context(|| "parse CAREBRIDGE_SYNC_TIMEOUT_MS")?,
            Err(_) => DEFAULT_SYNC_TIMEOUT_MS,
        };
        let config = Self {
            db_path,
            db_key,
            read_only,
            bcrypt_cost,
            sync_url,
            sync_timeout: Duration::from_millis(sync_timeout_ms),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_env_or_yaml() -> Result<Self> {
        let mut config = Self::from_env()?;
        if let Ok(path) = std::env::var("CAREBRIDGE_CONFIG") {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("read CAREBRIDGE_CONFIG: {path}"))?;
            let override_cfg: AuthDbConfigOverride = serde_yaml::from_str(&contents)
                .with_context(|| "parse authdb config yaml")?;
            if let Some(value) = override_cfg.db_path {
                config.db_path = value;
            }
            if let Some(value) = override_cfg.db_key {
                config.db_key = EncryptionKey::from_base64(&value).with_context(|| "parse db_key")?;
            }
            if let Some(value) = override_cfg.read_only {
                config.read_only = value;
            }
            if let Some(value) = override_cfg.bcrypt_cost {
                config.bcrypt_cost = value;
            }
            if let Some(value) = override_cfg.sync_url {
                config.sync_url = Some(value).filter(|url| !url.trim().is_empty());
            }
            if let Some(value) = override_cfg.sync_timeout_ms {
                config.sync_timeout = Duration::from_millis(value);
            }
            config.validate()?;
        }
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if !(4..=31).contains(&self.bcrypt_cost) {
            bail!("bcrypt cost must be between 4 and 31, got {}", self.bcrypt_cost);
        }
        if self.sync_timeout.is_zero() {
            bail!("sync timeout must be positive");
        }
        Ok(())
    }
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => bail!("expected a boolean, got {other:?}"),
    }
}
