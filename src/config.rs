use crate::error::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub billing: BillingConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub payments: PaymentsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default = "default_bcrypt_cost")]
    pub bcrypt_cost: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillingConfig {
    #[serde(default = "default_expiring_window_days")]
    pub expiring_window_days: i64,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    #[serde(default = "default_currency")]
    pub currency: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    #[serde(default = "default_true")]
    pub seed_on_startup: bool,
}

/// Callback bases the mocked gateways redirect to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentsConfig {
    #[serde(default = "default_esewa_callback")]
    pub esewa_callback: String,
    #[serde(default = "default_khalti_callback")]
    pub khalti_callback: String,
    #[serde(default = "default_imepay_callback")]
    pub imepay_callback: String,
    #[serde(default = "default_stripe_callback")]
    pub stripe_callback: String,
    #[serde(default = "default_card_callback")]
    pub card_callback: String,
}

fn default_max_connections() -> u32 {
    10
}
fn default_bcrypt_cost() -> u32 {
    bcrypt::DEFAULT_COST
}
fn default_expiring_window_days() -> i64 {
    7
}
fn default_sweep_interval_secs() -> u64 {
    3600
}
fn default_currency() -> String {
    "USD".to_string()
}
fn default_true() -> bool {
    true
}
fn default_esewa_callback() -> String {
    "http://localhost:3000/payments/esewa/callback".to_string()
}
fn default_khalti_callback() -> String {
    "http://localhost:3000/payments/khalti/callback".to_string()
}
fn default_imepay_callback() -> String {
    "http://localhost:3000/payments/imepay/callback".to_string()
}
fn default_stripe_callback() -> String {
    "http://localhost:3000/payments/stripe/callback".to_string()
}
fn default_card_callback() -> String {
    "http://localhost:3000/payments/card/callback".to_string()
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            bcrypt_cost: default_bcrypt_cost(),
        }
    }
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            expiring_window_days: default_expiring_window_days(),
            sweep_interval_secs: default_sweep_interval_secs(),
            currency: default_currency(),
        }
    }
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            seed_on_startup: true,
        }
    }
}

impl Default for PaymentsConfig {
    fn default() -> Self {
        Self {
            esewa_callback: default_esewa_callback(),
            khalti_callback: default_khalti_callback(),
            imepay_callback: default_imepay_callback(),
            stripe_callback: default_stripe_callback(),
            card_callback: default_card_callback(),
        }
    }
}

fn get_env(name: &str) -> Option<String> {
    env::var(name).ok()
}

fn get_env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.parse::<T>().ok())
}

impl Config {
    /// Load `CONFIG_PATH` (default `config.toml`); without a file the
    /// configuration is built from environment variables. Environment
    /// variables override file values either way.
    pub fn from_toml() -> AppResult<Self> {
        use std::io::ErrorKind;

        let config_path = env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());

        let mut config = match std::fs::read_to_string(&config_path) {
            Ok(config_str) => Self::from_toml_str(&config_str)?,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                let database_url = get_env("DATABASE_URL").ok_or_else(|| {
                    AppError::ConfigError(
                        "DATABASE_URL is not set and no config.toml was found".to_string(),
                    )
                })?;
                Config {
                    database: DatabaseConfig {
                        url: database_url,
                        max_connections: default_max_connections(),
                    },
                    auth: AuthConfig::default(),
                    billing: BillingConfig::default(),
                    catalog: CatalogConfig::default(),
                    payments: PaymentsConfig::default(),
                }
            }
            Err(e) => {
                return Err(AppError::ConfigError(format!(
                    "Cannot read config file {config_path}: {e}"
                )));
            }
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(s: &str) -> AppResult<Self> {
        toml::from_str(s).map_err(|e| AppError::ConfigError(format!("Invalid config file: {e}")))
    }

    fn apply_env_overrides(&mut self) {
        if let Some(v) = get_env("DATABASE_URL") {
            self.database.url = v;
        }
        if let Some(v) = get_env_parse("DB_MAX_CONNECTIONS") {
            self.database.max_connections = v;
        }
        if let Some(v) = get_env_parse("BCRYPT_COST") {
            self.auth.bcrypt_cost = v;
        }
        if let Some(v) = get_env_parse("EXPIRING_WINDOW_DAYS") {
            self.billing.expiring_window_days = v;
        }
        if let Some(v) = get_env_parse("SWEEP_INTERVAL_SECS") {
            self.billing.sweep_interval_secs = v;
        }
        if let Some(v) = get_env("BILLING_CURRENCY") {
            self.billing.currency = v;
        }
        if let Some(v) = get_env_parse("SEED_CATALOG") {
            self.catalog.seed_on_startup = v;
        }
        if let Some(v) = get_env("ESEWA_CALLBACK") {
            self.payments.esewa_callback = v;
        }
        if let Some(v) = get_env("KHALTI_CALLBACK") {
            self.payments.khalti_callback = v;
        }
        if let Some(v) = get_env("IMEPAY_CALLBACK") {
            self.payments.imepay_callback = v;
        }
        if let Some(v) = get_env("STRIPE_CALLBACK") {
            self.payments.stripe_callback = v;
        }
        if let Some(v) = get_env("CARD_CALLBACK") {
            self.payments.card_callback = v;
        }
    }

    pub fn validate(&self) -> AppResult<()> {
        if !(4..=31).contains(&self.auth.bcrypt_cost) {
            return Err(AppError::ConfigError(
                "auth.bcrypt_cost must be between 4 and 31".to_string(),
            ));
        }
        if self.billing.expiring_window_days < 0 {
            return Err(AppError::ConfigError(
                "billing.expiring_window_days must not be negative".to_string(),
            ));
        }
        if self.billing.sweep_interval_secs == 0 {
            return Err(AppError::ConfigError(
                "billing.sweep_interval_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
