//! Transfer classification: turns one block into deposit candidates.
//!
//! Native transfers are read straight from transaction values. Token
//! transfers need the receipt of every transaction sent to the token
//! contract, whose `Transfer` logs are then decoded.

use alloy::primitives::U256;
use depwatch_sdk::objects::{Address, AssetKind, TxHash};
use rust_decimal::Decimal;
use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::abi::decode_transfer_log;
use crate::config::{ChainConfig, TokenConfig};
use crate::ledger::{Block, LedgerError, LedgerPort, Receipt, Transaction};
use crate::registry::AddressRegistry;
use crate::utils::units::{UnitError, check_decimals, scale_down};

/// A detected transfer to a registered address, not yet attributed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub asset_kind: AssetKind,
    pub recipient: Address,
    pub raw_amount: U256,
    pub amount: Decimal,
    pub tx_hash: TxHash,
    /// Set for token transfers only.
    pub log_index: Option<u64>,
}

#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// An asset declares more decimals than amounts can be scaled by.
    #[error("{symbol} cannot be classified: {source}")]
    UnsupportedDecimals {
        symbol: String,
        #[source]
        source: UnitError,
    },
}

/// Extracts native and token candidates from a block.
#[derive(Debug, Clone)]
pub struct TransferClassifier {
    chain: ChainConfig,
}

impl TransferClassifier {
    /// Fails when the native asset or the token declares decimals beyond
    /// [`MAX_DECIMALS`](crate::utils::units::MAX_DECIMALS).
    pub fn new(chain: ChainConfig) -> Result<Self, ClassifyError> {
        let assets = std::iter::once((&chain.native_symbol, chain.native_decimals))
            .chain(chain.token.iter().map(|t| (&t.symbol, t.decimals)));
        for (symbol, decimals) in assets {
            check_decimals(decimals).map_err(|source| ClassifyError::UnsupportedDecimals {
                symbol: symbol.clone(),
                source,
            })?;
        }
        Ok(Self { chain })
    }

    /// Classify every transaction of `block`.
    ///
    /// All candidates of the block are collected before returning, so a
    /// failing receipt fetch yields an error and no partial result.
    /// Candidates come out in transaction order; within a transaction the
    /// native candidate precedes token candidates, which follow log order.
    pub async fn classify<L>(
        &self,
        ledger: &L,
        registry: &AddressRegistry,
        block: &Block,
    ) -> Result<Vec<Candidate>, ClassifyError>
    where
        L: LedgerPort + ?Sized,
    {
        let mut candidates = Vec::new();
        for tx in &block.transactions {
            let Some(to) = tx.to.as_ref() else {
                continue;
            };

            if registry.contains(to) {
                candidates.extend(self.native_candidate(tx, to));
            }

            if let Some(token) = self.chain.token.as_ref().filter(|t| &t.contract == to) {
                let receipt = ledger
                    .get_transaction_receipt(&tx.hash)
                    .await?
                    .ok_or_else(|| LedgerError::MissingReceipt(tx.hash.clone()))?;
                Self::token_candidates(token, registry, &tx.hash, &receipt, &mut candidates);
            }
        }
        debug!(
            height = block.number,
            transactions = block.transactions.len(),
            candidates = candidates.len(),
            "Block classified"
        );
        Ok(candidates)
    }

    /// Only values sent to registered addresses are narrowed; one that does
    /// not fit a `Decimal` is logged and skipped.
    fn native_candidate(&self, tx: &Transaction, to: &Address) -> Option<Candidate> {
        match scale_down(tx.value, self.chain.native_decimals) {
            Ok(amount) => Some(Candidate {
                asset_kind: AssetKind::Native,
                recipient: to.clone(),
                raw_amount: tx.value,
                amount,
                tx_hash: tx.hash.clone(),
                log_index: None,
            }),
            Err(e) => {
                warn!(
                    tx_hash = %tx.hash,
                    raw = %tx.value,
                    error = %e,
                    "Native transfer value cannot be scaled, skipped"
                );
                None
            }
        }
    }

    fn token_candidates(
        token: &TokenConfig,
        registry: &AddressRegistry,
        tx_hash: &TxHash,
        receipt: &Receipt,
        out: &mut Vec<Candidate>,
    ) {
        if !receipt.status {
            trace!(tx_hash = %tx_hash, "Reverted token transaction skipped");
            return;
        }
        for log in &receipt.logs {
            if log.address != token.contract {
                trace!(tx_hash = %tx_hash, log_index = log.log_index, "Log from another contract");
                continue;
            }
            let transfer = match decode_transfer_log(&log.data) {
                Ok(transfer) => transfer,
                Err(e) => {
                    trace!(tx_hash = %tx_hash, log_index = log.log_index, reason = %e, "Log skipped");
                    continue;
                }
            };
            if !registry.contains(&transfer.to) {
                continue;
            }
            match scale_down(transfer.value, token.decimals) {
                Ok(amount) => out.push(Candidate {
                    asset_kind: AssetKind::Token,
                    recipient: transfer.to,
                    raw_amount: transfer.value,
                    amount,
                    tx_hash: tx_hash.clone(),
                    log_index: Some(log.log_index),
                }),
                Err(e) => warn!(
                    tx_hash = %tx_hash,
                    log_index = log.log_index,
                    raw = %transfer.value,
                    error = %e,
                    "Token transfer value cannot be scaled, skipped"
                ),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{
        MockLedger, TOKEN, block, chain_config, native_tx, native_tx_value, receipt, token_tx,
        transfer_log,
    };
    use alloy::primitives::LogData;

    const ALICE: &str = "0x00000000000000000000000000000000000a11ce";
    const BOB: &str = "0x0000000000000000000000000000000000000b0b";
    const STRANGER: &str = "0x00000000000000000000000000000000005a4e12";

    fn registry() -> AddressRegistry {
        AddressRegistry::new([("alice", ALICE), ("bob", BOB)]).unwrap()
    }

    #[tokio::test]
    async fn test_native_amount_conversion() {
        let ledger = MockLedger::default();
        let classifier = TransferClassifier::new(chain_config()).unwrap();
        let b = block(10, vec![native_tx("0x01", ALICE, 1_500_000_000_000_000_000)]);

        let candidates = classifier.classify(&ledger, &registry(), &b).await.unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].asset_kind, AssetKind::Native);
        assert_eq!(candidates[0].amount, Decimal::new(15, 1));
        assert_eq!(candidates[0].log_index, None);
    }

    #[tokio::test]
    async fn test_token_amount_conversion() {
        let ledger = MockLedger::default();
        ledger.add_receipt(receipt("0x02", vec![transfer_log(TOKEN, STRANGER, BOB, 2_500_000, 4)]));
        let classifier = TransferClassifier::new(chain_config()).unwrap();
        let b = block(10, vec![token_tx("0x02")]);

        let candidates = classifier.classify(&ledger, &registry(), &b).await.unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].asset_kind, AssetKind::Token);
        assert_eq!(candidates[0].amount, Decimal::new(25, 1));
        assert_eq!(candidates[0].recipient, Address::normalize(BOB));
        assert_eq!(candidates[0].log_index, Some(4));
    }

    #[tokio::test]
    async fn test_unregistered_recipient_is_ignored() {
        let ledger = MockLedger::default();
        ledger.add_receipt(receipt("0x02", vec![transfer_log(TOKEN, ALICE, STRANGER, 7, 0)]));
        let classifier = TransferClassifier::new(chain_config()).unwrap();
        let b = block(
            10,
            vec![native_tx("0x01", STRANGER, 1_000), token_tx("0x02")],
        );

        let candidates = classifier.classify(&ledger, &registry(), &b).await.unwrap();
        assert!(candidates.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_log_is_skipped() {
        let ledger = MockLedger::default();
        let mut broken = transfer_log(TOKEN, STRANGER, ALICE, 1_000_000, 1);
        let topics = broken.data.topics()[..2].to_vec();
        broken.data = LogData::new_unchecked(topics, broken.data.data.clone());
        ledger.add_receipt(receipt(
            "0x02",
            vec![broken, transfer_log(TOKEN, STRANGER, ALICE, 3_000_000, 2)],
        ));
        let classifier = TransferClassifier::new(chain_config()).unwrap();
        let b = block(10, vec![token_tx("0x02")]);

        let candidates = classifier.classify(&ledger, &registry(), &b).await.unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].amount, Decimal::new(3, 0));
        assert_eq!(candidates[0].log_index, Some(2));
    }

    #[tokio::test]
    async fn test_logs_from_other_contracts_are_ignored() {
        let ledger = MockLedger::default();
        ledger.add_receipt(receipt(
            "0x02",
            vec![transfer_log(STRANGER, STRANGER, ALICE, 1_000_000, 0)],
        ));
        let classifier = TransferClassifier::new(chain_config()).unwrap();
        let b = block(10, vec![token_tx("0x02")]);

        assert!(classifier.classify(&ledger, &registry(), &b).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_receipt_is_retryable_error() {
        let ledger = MockLedger::default();
        let classifier = TransferClassifier::new(chain_config()).unwrap();
        let b = block(10, vec![native_tx("0x01", ALICE, 1), token_tx("0x02")]);

        let err = classifier.classify(&ledger, &registry(), &b).await.unwrap_err();
        assert!(matches!(
            err,
            ClassifyError::Ledger(LedgerError::MissingReceipt(ref hash)) if hash.as_str() == "0x02"
        ));
    }

    #[tokio::test]
    async fn test_candidate_ordering() {
        let ledger = MockLedger::default();
        ledger.add_receipt(receipt(
            "0x02",
            vec![
                transfer_log(TOKEN, STRANGER, BOB, 1_000_000, 0),
                transfer_log(TOKEN, STRANGER, ALICE, 2_000_000, 1),
            ],
        ));
        let classifier = TransferClassifier::new(chain_config()).unwrap();
        let b = block(
            10,
            vec![
                native_tx("0x01", BOB, 1),
                token_tx("0x02"),
                native_tx("0x03", ALICE, 2),
            ],
        );

        let order: Vec<(String, Option<u64>)> = classifier
            .classify(&ledger, &registry(), &b)
            .await
            .unwrap()
            .into_iter()
            .map(|c| (c.tx_hash.to_string(), c.log_index))
            .collect();
        assert_eq!(
            order,
            vec![
                ("0x01".to_string(), None),
                ("0x02".to_string(), Some(0)),
                ("0x02".to_string(), Some(1)),
                ("0x03".to_string(), None),
            ]
        );
    }

    #[tokio::test]
    async fn test_token_path_disabled_without_token() {
        let ledger = MockLedger::default();
        let mut chain = chain_config();
        chain.token = None;
        let classifier = TransferClassifier::new(chain).unwrap();
        let b = block(10, vec![token_tx("0x02")]);

        assert!(classifier.classify(&ledger, &registry(), &b).await.unwrap().is_empty());
        assert_eq!(ledger.receipt_calls(), 0);
    }

    #[tokio::test]
    async fn test_oversized_value_to_stranger_does_not_fail_block() {
        let ledger = MockLedger::default();
        let classifier = TransferClassifier::new(chain_config()).unwrap();
        let b = block(
            10,
            vec![
                native_tx_value("0x01", STRANGER, U256::from(1u8) << 200),
                native_tx("0x02", ALICE, 1_000),
            ],
        );

        let candidates = classifier.classify(&ledger, &registry(), &b).await.unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].tx_hash.as_str(), "0x02");
    }

    #[tokio::test]
    async fn test_unscalable_value_to_registered_address_is_skipped() {
        let ledger = MockLedger::default();
        ledger.add_receipt(receipt(
            "0x02",
            vec![transfer_log(TOKEN, STRANGER, BOB, u128::MAX, 0)],
        ));
        let classifier = TransferClassifier::new(chain_config()).unwrap();
        let b = block(
            10,
            vec![
                native_tx_value("0x01", ALICE, U256::MAX),
                token_tx("0x02"),
                native_tx("0x03", BOB, 5),
            ],
        );

        let candidates = classifier.classify(&ledger, &registry(), &b).await.unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].tx_hash.as_str(), "0x03");
    }

    #[test]
    fn test_excess_decimals_are_rejected_at_construction() {
        let mut chain = chain_config();
        chain.native_decimals = 30;
        assert!(matches!(
            TransferClassifier::new(chain),
            Err(ClassifyError::UnsupportedDecimals { ref symbol, source: UnitError::DecimalsTooLarge(30) })
                if symbol == "BNB"
        ));

        let mut chain = chain_config();
        if let Some(token) = chain.token.as_mut() {
            token.decimals = 29;
        }
        assert!(matches!(
            TransferClassifier::new(chain),
            Err(ClassifyError::UnsupportedDecimals { source: UnitError::DecimalsTooLarge(29), .. })
        ));
    }
}
