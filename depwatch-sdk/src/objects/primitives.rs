//! Ledger vocabulary shared by every crate: users, addresses, hashes and
//! the two asset kinds the watcher understands.

use alloy_primitives::{Address as EvmAddress, B256};
use compact_str::CompactString;
use serde::{Deserialize, Serialize};

/// Identifier of a user owning a deposit address.
///
/// Callers may key their users by integer or by string; both forms are
/// accepted and round-trip through JSON unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UserId {
    Int(i64),
    Text(CompactString),
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UserId::Int(id) => write!(f, "{id}"),
            UserId::Text(id) => f.write_str(id),
        }
    }
}

impl From<i64> for UserId {
    fn from(value: i64) -> Self {
        UserId::Int(value)
    }
}

impl From<&str> for UserId {
    fn from(value: &str) -> Self {
        UserId::Text(value.into())
    }
}

impl From<String> for UserId {
    fn from(value: String) -> Self {
        UserId::Text(value.into())
    }
}

/// A ledger address in canonical (trimmed, lower-case) form.
///
/// Every constructor normalizes, so two `Address` values compare equal
/// exactly when they denote the same account regardless of checksum casing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Address(CompactString);

impl Address {
    /// Canonicalize a raw address string.
    pub fn normalize(raw: &str) -> Self {
        Self(raw.trim().to_lowercase().into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this is a `0x`-prefixed, 20-byte hex address.
    pub fn is_well_formed(&self) -> bool {
        self.to_evm().is_some()
    }

    /// Parse into the fixed-width EVM address, if well formed.
    pub fn to_evm(&self) -> Option<EvmAddress> {
        if !self.0.starts_with("0x") {
            return None;
        }
        self.0.parse().ok()
    }
}

impl From<EvmAddress> for Address {
    fn from(value: EvmAddress) -> Self {
        Address::normalize(&value.to_string())
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = CompactString::deserialize(deserializer)?;
        Ok(Address::normalize(&raw))
    }
}

/// A transaction hash in canonical lower-case hex form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct TxHash(CompactString);

impl TxHash {
    pub fn normalize(raw: &str) -> Self {
        Self(raw.trim().to_lowercase().into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parse into the 32-byte hash, if well formed.
    pub fn to_b256(&self) -> Option<B256> {
        self.0.parse().ok()
    }
}

impl From<B256> for TxHash {
    fn from(value: B256) -> Self {
        TxHash::normalize(&value.to_string())
    }
}

impl std::fmt::Display for TxHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for TxHash {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = CompactString::deserialize(deserializer)?;
        Ok(TxHash::normalize(&raw))
    }
}

/// The two transfer kinds observed on the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetKind {
    /// The chain's base currency, moved by a plain value transaction.
    Native,
    /// The configured fungible token, moved by a `Transfer` log.
    Token,
}

impl std::fmt::Display for AssetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AssetKind::Native => write!(f, "native"),
            AssetKind::Token => write!(f, "token"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_normalization() {
        let a = Address::normalize("  0xAbCdEF0000000000000000000000000000000001 ");
        let b = Address::normalize("0xabcdef0000000000000000000000000000000001");
        assert_eq!(a, b);
        assert!(a.is_well_formed());
        assert_eq!(Address::from(a.to_evm().unwrap()), b);
    }

    #[test]
    fn test_tx_hash_from_b256() {
        let hash = B256::repeat_byte(0xab);
        let tx_hash = TxHash::from(hash);
        assert_eq!(tx_hash.as_str(), format!("0x{}", "ab".repeat(32)));
        assert_eq!(tx_hash.to_b256(), Some(hash));
        assert_eq!(TxHash::normalize("0x01").to_b256(), None);
    }

    #[test]
    fn test_malformed_address() {
        assert!(!Address::normalize("0xABC").is_well_formed());
        assert!(!Address::normalize("abcdef0000000000000000000000000000000001").is_well_formed());
        assert!(!Address::normalize("0xzz00000000000000000000000000000000000001").is_well_formed());
    }

    #[test]
    fn test_user_id_untagged_json() {
        let ids: Vec<UserId> = serde_json::from_str(r#"[7, "alice"]"#).unwrap();
        assert_eq!(ids, vec![UserId::Int(7), UserId::from("alice")]);
        assert_eq!(ids[0].to_string(), "7");
        assert_eq!(serde_json::to_string(&ids).unwrap(), r#"[7,"alice"]"#);
    }
}
