//! Signing through an unlocked account on the ledger node.

use std::sync::Arc;

use alloy::primitives::{Address as EvmAddress, Bytes};
use alloy::providers::Provider;
use async_trait::async_trait;
use serde::Deserialize;

use super::{SignerError, TransactionSigner, UnsignedTransaction};
use crate::ledger::{JsonRpcLedger, LedgerError};

/// Asks the node to sign with `eth_signTransaction`. The custodial key never
/// enters this process, but public RPC endpoints do not offer the method.
pub struct NodeSigner {
    ledger: Arc<JsonRpcLedger>,
    address: EvmAddress,
}

/// Nodes answer either with the raw bytes or with `{ raw, tx }`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SignResponse {
    Raw(Bytes),
    Envelope { raw: Bytes },
}

impl SignResponse {
    fn into_raw(self) -> Bytes {
        match self {
            SignResponse::Raw(raw) | SignResponse::Envelope { raw } => raw,
        }
    }
}

impl NodeSigner {
    pub fn new(ledger: Arc<JsonRpcLedger>, address: EvmAddress) -> Self {
        Self { ledger, address }
    }
}

#[async_trait]
impl TransactionSigner for NodeSigner {
    fn address(&self) -> EvmAddress {
        self.address
    }

    async fn sign(&self, tx: &UnsignedTransaction) -> Result<Vec<u8>, SignerError> {
        let response: Option<SignResponse> = self
            .ledger
            .provider()
            .raw_request("eth_signTransaction".into(), (tx.to_request(),))
            .await
            .map_err(LedgerError::from)?;
        let raw = response
            .ok_or_else(|| SignerError::Refused("node returned no signature".into()))?
            .into_raw();
        Ok(raw.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sign_response_shapes() {
        let raw: SignResponse = serde_json::from_value(json!("0xf86b")).unwrap();
        assert_eq!(raw.into_raw().as_ref(), &[0xf8, 0x6b]);

        let envelope: SignResponse =
            serde_json::from_value(json!({ "raw": "0xf86c", "tx": { "nonce": "0x1" } })).unwrap();
        assert_eq!(envelope.into_raw().as_ref(), &[0xf8, 0x6c]);

        assert!(serde_json::from_value::<SignResponse>(json!({ "tx": {} })).is_err());
    }

    #[tokio::test]
    async fn test_unreachable_node_is_a_ledger_error() {
        let ledger = Arc::new(JsonRpcLedger::new("http://127.0.0.1:1".parse().unwrap()));
        let signer = NodeSigner::new(ledger, EvmAddress::repeat_byte(0xa1));
        let tx = UnsignedTransaction {
            from: signer.address(),
            to: EvmAddress::repeat_byte(0xb2),
            value: alloy::primitives::U256::from(1u8),
            data: Bytes::new(),
            nonce: 0,
            gas: 21_000,
            gas_price: 1,
            chain_id: 56,
        };
        assert!(matches!(
            signer.sign(&tx).await,
            Err(SignerError::Ledger(LedgerError::Transport(_)))
        ));
    }
}
