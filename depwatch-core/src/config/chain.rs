//! Ledger and token parameters.

use depwatch_sdk::objects::Address;

/// The fungible token whose `Transfer` logs are watched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenConfig {
    /// Normalized contract address.
    pub contract: Address,
    pub symbol: String,
    /// Decimal exponent declared by the token contract.
    pub decimals: u32,
}

/// Static facts about the watched ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainConfig {
    pub chain_id: u64,
    pub native_symbol: String,
    /// Decimal exponent of the native asset's smallest unit, 18 on EVM chains.
    pub native_decimals: u32,
    /// `None` disables the token path entirely.
    pub token: Option<TokenConfig>,
}
