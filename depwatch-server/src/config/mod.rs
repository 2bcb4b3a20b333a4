//! Configuration module for depwatch-server.
//!
//! Handles loading configuration from TOML files, CLI arguments,
//! and environment variables. Also handles admin secret hashing.

pub mod file;

use crate::config::file::{BackoffKind, FileConfig, PayoutConfig, StartConfig};
use depwatch_core::config::{AdminConfig, ChainConfig, TokenConfig, WebhookConfig};
use depwatch_core::payout::LocalSigner;
use depwatch_core::registry::{AddressRegistry, RegistryError};
use depwatch_core::utils::backoff::{BackoffPolicy, ExponentialBackoff, FixedBackoff};
use depwatch_core::utils::units::MAX_DECIMALS;
use depwatch_core::watcher::{StartPosition, WatcherConfig};
use depwatch_sdk::objects::{Address, PrivateKey};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),

    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("user registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("password hashing error: {0}")]
    HashError(String),

    #[error("DATABASE_URL environment variable not set")]
    MissingDatabaseUrl,
}

/// Who signs payouts.
pub enum PayoutSigner {
    /// An account unlocked on the ledger node.
    Node(Address),
    /// A key held in this process.
    Local(PrivateKey),
}

/// Loaded configuration result containing all parts.
pub struct LoadedConfig {
    pub listen: SocketAddr,
    pub admin: AdminConfig,
    pub rpc_url: Url,
    pub chain: ChainConfig,
    pub watcher: WatcherConfig,
    pub backoff: Box<dyn BackoffPolicy>,
    pub webhook: Option<WebhookConfig>,
    pub payout: Option<PayoutSigner>,
    pub registry: AddressRegistry,
}

/// Configuration loader that handles the complete loading process.
pub struct ConfigLoader {
    config_path: std::path::PathBuf,
    listen_override: Option<SocketAddr>,
}

impl ConfigLoader {
    /// Create a new config loader.
    pub fn new(config_path: impl AsRef<Path>, listen_override: Option<SocketAddr>) -> Self {
        Self {
            config_path: config_path.as_ref().to_path_buf(),
            listen_override,
        }
    }

    /// Load and process the configuration.
    ///
    /// This will:
    /// 1. Read the TOML file
    /// 2. Validate the configuration
    /// 3. Hash the admin secret if it's plaintext (and rewrite the file)
    /// 4. Apply CLI overrides
    /// 5. Build the registry and runtime configuration
    pub fn load(&self) -> Result<LoadedConfig, ConfigError> {
        let config_content = std::fs::read_to_string(&self.config_path)?;
        let mut file_config: FileConfig = toml::from_str(&config_content)?;

        validate(&file_config)?;

        let secret_hash = if file_config.is_admin_secret_hashed() {
            file_config.admin.secret.clone()
        } else {
            let hash = hash_secret(&file_config.admin.secret)?;
            file_config.admin.secret = hash.clone();
            self.rewrite_config(&file_config)?;
            tracing::info!("Admin secret hashed and config file updated");
            hash
        };

        // The override is applied after the rewrite so it never lands in the file.
        if let Some(listen) = self.listen_override {
            file_config.server.listen = listen;
        }

        build_loaded_config(file_config, secret_hash)
    }

    fn rewrite_config(&self, config: &FileConfig) -> Result<(), ConfigError> {
        let toml_string = toml::to_string_pretty(config)?;

        // Write atomically: write to temp file, then rename
        let temp_path = self.config_path.with_extension("toml.tmp");
        std::fs::write(&temp_path, toml_string)?;
        std::fs::rename(&temp_path, &self.config_path)?;

        Ok(())
    }
}

fn validate(config: &FileConfig) -> Result<(), ConfigError> {
    if !matches!(config.ledger.rpc_url.scheme(), "http" | "https") {
        return Err(ConfigError::ValidationError(format!(
            "ledger rpc_url must be http or https, got {}",
            config.ledger.rpc_url
        )));
    }
    if config.watcher.poll_interval_secs == 0 {
        return Err(ConfigError::ValidationError(
            "watcher poll_interval_secs must be positive".to_string(),
        ));
    }
    if config.watcher.id.trim().is_empty() {
        return Err(ConfigError::ValidationError(
            "watcher id must not be empty".to_string(),
        ));
    }
    if config.ledger.native_decimals > MAX_DECIMALS {
        return Err(ConfigError::ValidationError(format!(
            "ledger native_decimals {} exceeds the supported maximum of {MAX_DECIMALS}",
            config.ledger.native_decimals
        )));
    }
    if let Some(token) = &config.token {
        if !Address::normalize(&token.contract).is_well_formed() {
            return Err(ConfigError::ValidationError(format!(
                "token contract {} is not a valid address",
                token.contract
            )));
        }
        if token.decimals > MAX_DECIMALS {
            return Err(ConfigError::ValidationError(format!(
                "token {} decimals {} exceed the supported maximum of {MAX_DECIMALS}",
                token.symbol, token.decimals
            )));
        }
    }
    match &config.payout {
        Some(PayoutConfig::Node { custodial_address }) => {
            if !Address::normalize(custodial_address).is_well_formed() {
                return Err(ConfigError::ValidationError(format!(
                    "custodial address {custodial_address} is not a valid address"
                )));
            }
        }
        Some(PayoutConfig::Local { private_key }) => {
            // The error text never echoes the key.
            if LocalSigner::from_private_key(&PrivateKey::new(private_key.as_str())).is_err() {
                return Err(ConfigError::ValidationError(
                    "payout private_key is not a valid secp256k1 key".to_string(),
                ));
            }
        }
        None => {}
    }
    Ok(())
}

fn hash_secret(plaintext: &str) -> Result<String, ConfigError> {
    use argon2::{
        Argon2, PasswordHasher,
        password_hash::{SaltString, rand_core::OsRng},
    };

    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(plaintext.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| ConfigError::HashError(e.to_string()))
}

fn build_loaded_config(
    file_config: FileConfig,
    secret_hash: String,
) -> Result<LoadedConfig, ConfigError> {
    let registry = AddressRegistry::new(
        file_config
            .users
            .into_iter()
            .map(|user| (user.id, user.address)),
    )?;

    let chain = ChainConfig {
        chain_id: file_config.ledger.chain_id,
        native_symbol: file_config.ledger.native_symbol,
        native_decimals: file_config.ledger.native_decimals,
        token: file_config.token.map(|t| TokenConfig {
            contract: Address::normalize(&t.contract),
            symbol: t.symbol,
            decimals: t.decimals,
        }),
    };

    let watcher = &file_config.watcher;
    let poll_interval = Duration::from_secs(watcher.poll_interval_secs);
    let backoff: Box<dyn BackoffPolicy> = match watcher.backoff {
        BackoffKind::Fixed => Box::new(FixedBackoff(poll_interval)),
        BackoffKind::Exponential => Box::new(ExponentialBackoff {
            base: Duration::from_secs(1),
            max: Duration::from_secs(watcher.max_backoff_secs),
        }),
    };
    let watcher = WatcherConfig {
        watcher_id: watcher.id.clone(),
        poll_interval,
        yield_delay: Duration::from_millis(watcher.yield_delay_ms),
        start: match watcher.start {
            StartConfig::Keyword(_) => StartPosition::Head,
            StartConfig::Height(height) => StartPosition::Height(height),
        },
        sink_timeout: watcher.sink_timeout_secs.map(Duration::from_secs),
    };

    Ok(LoadedConfig {
        listen: file_config.server.listen,
        admin: AdminConfig::new(secret_hash),
        rpc_url: file_config.ledger.rpc_url,
        chain,
        watcher,
        backoff,
        webhook: file_config
            .webhook
            .map(|w| WebhookConfig::new(w.url, w.secret.into_bytes().into_boxed_slice())),
        payout: file_config.payout.map(|p| match p {
            PayoutConfig::Node { custodial_address } => {
                PayoutSigner::Node(Address::normalize(&custodial_address))
            }
            PayoutConfig::Local { private_key } => PayoutSigner::Local(PrivateKey::new(private_key)),
        }),
        registry,
    })
}

/// Get the database URL from the environment.
pub fn get_database_url() -> Result<String, ConfigError> {
    std::env::var("DATABASE_URL").map_err(|_| ConfigError::MissingDatabaseUrl)
}
