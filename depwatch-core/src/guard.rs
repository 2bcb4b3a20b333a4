//! Deduplication and attribution of classifier candidates.

use std::collections::HashSet;

use depwatch_sdk::objects::{AssetKind, DepositEvent, TxHash};
use tracing::{debug, warn};

use crate::classifier::Candidate;
use crate::registry::AddressRegistry;

/// Identity of one logical transfer.
///
/// A transaction carries at most one native value transfer, so native
/// transfers are keyed by hash alone.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DedupKey {
    Native(TxHash),
    Token(TxHash, u64),
}

impl DedupKey {
    pub fn of(candidate: &Candidate) -> Self {
        match (candidate.asset_kind, candidate.log_index) {
            (AssetKind::Token, Some(index)) => DedupKey::Token(candidate.tx_hash.clone(), index),
            _ => DedupKey::Native(candidate.tx_hash.clone()),
        }
    }
}

/// Guard for a single block pass. Create a fresh one per block.
pub struct AttributionGuard<'r> {
    registry: &'r AddressRegistry,
    seen: HashSet<DedupKey>,
}

impl<'r> AttributionGuard<'r> {
    pub fn new(registry: &'r AddressRegistry) -> Self {
        Self {
            registry,
            seen: HashSet::new(),
        }
    }

    /// Turn a candidate into an event, or drop it if it was already admitted
    /// in this pass or its recipient cannot be attributed.
    pub fn admit(&mut self, candidate: Candidate, block_height: u64) -> Option<DepositEvent> {
        let key = DedupKey::of(&candidate);
        if self.seen.contains(&key) {
            debug!(key = ?key, "Duplicate candidate dropped");
            return None;
        }
        let Some(user_id) = self.registry.resolve_user(&candidate.recipient) else {
            warn!(
                address = %candidate.recipient,
                tx_hash = %candidate.tx_hash,
                "Recipient could not be attributed, candidate dropped"
            );
            return None;
        };
        self.seen.insert(key);
        Some(DepositEvent {
            user_id: user_id.clone(),
            asset_kind: candidate.asset_kind,
            amount: candidate.amount,
            tx_hash: candidate.tx_hash,
            address: candidate.recipient,
            block_height,
            log_index: candidate.log_index,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use depwatch_sdk::objects::{Address, UserId};
    use rust_decimal::Decimal;

    fn candidate(to: &str, tx: &str, log_index: Option<u64>) -> Candidate {
        Candidate {
            asset_kind: if log_index.is_some() {
                AssetKind::Token
            } else {
                AssetKind::Native
            },
            recipient: Address::normalize(to),
            raw_amount: alloy::primitives::U256::from(1u8),
            amount: Decimal::ONE,
            tx_hash: TxHash::normalize(tx),
            log_index,
        }
    }

    #[test]
    fn test_same_log_admitted_once() {
        let registry = AddressRegistry::new([("alice", "0xa1")]).unwrap();
        let mut guard = AttributionGuard::new(&registry);
        assert!(guard.admit(candidate("0xa1", "0x01", Some(3)), 5).is_some());
        assert!(guard.admit(candidate("0xa1", "0x01", Some(3)), 5).is_none());
        assert!(guard.admit(candidate("0xa1", "0x01", Some(4)), 5).is_some());
    }

    #[test]
    fn test_native_and_token_in_one_tx_are_distinct() {
        let registry = AddressRegistry::new([("alice", "0xa1")]).unwrap();
        let mut guard = AttributionGuard::new(&registry);
        assert!(guard.admit(candidate("0xa1", "0x01", None), 5).is_some());
        assert!(guard.admit(candidate("0xa1", "0x01", Some(0)), 5).is_some());
        assert!(guard.admit(candidate("0xA1", "0x01", None), 5).is_none());
    }

    #[test]
    fn test_unattributable_candidate_is_dropped() {
        let registry = AddressRegistry::new([("alice", "0xa1")]).unwrap();
        let mut guard = AttributionGuard::new(&registry);
        assert!(guard.admit(candidate("0xb2", "0x01", None), 5).is_none());
    }

    #[test]
    fn test_event_fields() {
        let registry = AddressRegistry::new([(42i64, "0xa1")]).unwrap();
        let mut guard = AttributionGuard::new(&registry);
        let event = guard.admit(candidate("0xa1", "0xFF", Some(9)), 77).unwrap();
        assert_eq!(event.user_id, UserId::Int(42));
        assert_eq!(event.tx_hash.as_str(), "0xff");
        assert_eq!(event.block_height, 77);
        assert_eq!(event.log_index, Some(9));
        assert_eq!(event.asset_kind, AssetKind::Token);
    }
}
