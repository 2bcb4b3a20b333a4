//! Deposit and payout records.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::primitives::{Address, AssetKind, TxHash, UserId};

/// A detected incoming transfer attributed to a known user.
///
/// Handed to the event sink exactly once per block pass. `log_index` is
/// only set for token transfers; together with `tx_hash` it forms the
/// idempotency key of the event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositEvent {
    pub user_id: UserId,
    pub asset_kind: AssetKind,
    /// Human-scaled amount (smallest units divided by the asset's decimals).
    pub amount: Decimal,
    pub tx_hash: TxHash,
    /// Normalized recipient address.
    pub address: Address,
    pub block_height: u64,
    pub log_index: Option<u64>,
}

/// Outcome of a payout accepted by the ledger node.
///
/// Produced after broadcast, not after finality.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferResult {
    pub to_address: Address,
    pub asset_kind: AssetKind,
    pub amount: Decimal,
    pub tx_hash: TxHash,
}

/// A user-owned keypair as produced by an external key generator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wallet {
    pub user_id: UserId,
    pub address: Address,
    pub private_key: PrivateKey,
}

/// Hex-encoded private key. Never printed by `Debug`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrivateKey(String);

impl PrivateKey {
    pub fn new(hex_key: impl Into<String>) -> Self {
        Self(hex_key.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("PrivateKey(<redacted>)")
    }
}
