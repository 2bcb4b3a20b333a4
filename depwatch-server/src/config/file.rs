//! TOML file configuration structures.
//!
//! These structs directly map to the `depwatch.toml` file format.

use depwatch_sdk::objects::{UserId, Wallet};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use url::Url;

/// Root configuration structure as read from the TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileConfig {
    pub server: ServerConfig,
    pub admin: AdminConfig,
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub token: Option<TokenConfig>,
    #[serde(default)]
    pub watcher: WatcherConfig,
    #[serde(default)]
    pub webhook: Option<WebhookConfig>,
    #[serde(default)]
    pub payout: Option<PayoutConfig>,
    #[serde(default)]
    pub users: Vec<UserConfig>,
}

/// Server configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// The address and port to listen on (e.g., "0.0.0.0:8080").
    #[serde(default = "default_listen_addr")]
    pub listen: SocketAddr,
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

/// Admin configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminConfig {
    /// The admin secret. If this is plaintext (doesn't start with `$argon2`),
    /// it will be hashed and the config file will be rewritten.
    pub secret: String,
}

/// The ledger node and its native asset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    pub rpc_url: Url,
    pub chain_id: u64,
    #[serde(default = "default_native_symbol")]
    pub native_symbol: String,
    #[serde(default = "default_native_decimals")]
    pub native_decimals: u32,
}

fn default_native_symbol() -> String {
    "ETH".to_string()
}

fn default_native_decimals() -> u32 {
    18
}

/// The single fungible token watched next to the native asset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenConfig {
    pub contract: String,
    pub symbol: String,
    pub decimals: u32,
}

/// `start = "head"` or `start = <height>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StartConfig {
    Keyword(StartKeyword),
    Height(u64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StartKeyword {
    Head,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffKind {
    #[default]
    Fixed,
    Exponential,
}

/// Deposit watcher tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatcherConfig {
    /// Key of the persisted cursor.
    #[serde(default = "default_watcher_id")]
    pub id: String,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_yield_delay_ms")]
    pub yield_delay_ms: u64,
    #[serde(default = "default_start")]
    pub start: StartConfig,
    #[serde(default)]
    pub backoff: BackoffKind,
    /// Upper bound of the exponential backoff.
    #[serde(default = "default_max_backoff_secs")]
    pub max_backoff_secs: u64,
    #[serde(default)]
    pub sink_timeout_secs: Option<u64>,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            id: default_watcher_id(),
            poll_interval_secs: default_poll_interval_secs(),
            yield_delay_ms: default_yield_delay_ms(),
            start: default_start(),
            backoff: BackoffKind::default(),
            max_backoff_secs: default_max_backoff_secs(),
            sink_timeout_secs: None,
        }
    }
}

fn default_watcher_id() -> String {
    "default".to_string()
}

fn default_poll_interval_secs() -> u64 {
    10
}

fn default_yield_delay_ms() -> u64 {
    100
}

fn default_start() -> StartConfig {
    StartConfig::Keyword(StartKeyword::Head)
}

fn default_max_backoff_secs() -> u64 {
    600
}

/// Where deposit notifications are posted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    pub url: Url,
    /// Secret key for signing webhook bodies.
    pub secret: String,
}

/// Enables the payout endpoint and picks who signs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "signer", rename_all = "lowercase")]
pub enum PayoutConfig {
    /// Account unlocked on the ledger node, signed with `eth_signTransaction`.
    Node { custodial_address: String },
    /// Custodial key held by this process; works against public RPC nodes.
    Local { private_key: String },
}

/// One deposit address owned by a user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserConfig {
    pub id: UserId,
    pub address: String,
}

impl From<&Wallet> for UserConfig {
    fn from(wallet: &Wallet) -> Self {
        Self {
            id: wallet.user_id.clone(),
            address: wallet.address.as_str().to_string(),
        }
    }
}

/// Render `[[users]]` entries ready to append to `depwatch.toml`.
pub fn users_snippet(users: Vec<UserConfig>) -> Result<String, toml::ser::Error> {
    #[derive(Serialize)]
    struct Users {
        users: Vec<UserConfig>,
    }
    toml::to_string(&Users { users })
}

impl FileConfig {
    /// Check if the admin secret is already hashed (argon2 format).
    pub fn is_admin_secret_hashed(&self) -> bool {
        self.admin.secret.starts_with("$argon2")
    }
}
