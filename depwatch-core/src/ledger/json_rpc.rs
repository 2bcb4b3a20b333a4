//! JSON-RPC implementation of the ledger ports over an alloy provider.

use std::time::Duration;

use alloy::eips::BlockNumberOrTag;
use alloy::network::{TransactionBuilder, TransactionResponse};
use alloy::primitives::{Address as EvmAddress, Bytes, U256};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::rpc::client::RpcClient;
use alloy::rpc::types::{BlockTransactions, TransactionReceipt, TransactionRequest};
use alloy::transports::http::{reqwest, Http};
use async_trait::async_trait;
use depwatch_sdk::objects::{Address, TxHash};
use url::Url;

use super::{Block, CallRequest, LedgerError, LedgerPort, Log, PayoutLedger, Receipt, Transaction};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// A ledger node reached over HTTP JSON-RPC.
pub struct JsonRpcLedger {
    provider: DynProvider,
}

impl JsonRpcLedger {
    pub fn new(endpoint: Url) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        let client = RpcClient::new(Http::with_client(http_client, endpoint), false);
        Self {
            provider: ProviderBuilder::new().connect_client(client).erased(),
        }
    }

    /// The underlying provider, for calls outside the ledger ports.
    pub fn provider(&self) -> &DynProvider {
        &self.provider
    }
}

fn call_request(request: &CallRequest) -> TransactionRequest {
    let tx = TransactionRequest::default()
        .with_to(request.to)
        .with_value(request.value)
        .with_input(request.data.clone());
    match request.from {
        Some(from) => tx.with_from(from),
        None => tx,
    }
}

fn block_from_rpc(block: alloy::rpc::types::Block) -> Result<Block, LedgerError> {
    let number = block.header.number;
    let transactions = match &block.transactions {
        BlockTransactions::Full(txs) => txs.iter().map(transaction_from_rpc).collect(),
        BlockTransactions::Hashes(hashes) if hashes.is_empty() => Vec::new(),
        other => {
            return Err(LedgerError::MalformedResponse(format!(
                "block {number} came back with {} transactions but no bodies",
                other.len()
            )));
        }
    };
    Ok(Block {
        number,
        transactions,
    })
}

fn transaction_from_rpc(tx: &alloy::rpc::types::Transaction) -> Transaction {
    Transaction {
        hash: TransactionResponse::tx_hash(tx).into(),
        to: alloy::consensus::Transaction::to(tx).map(Address::from),
        value: alloy::consensus::Transaction::value(tx),
    }
}

fn receipt_from_rpc(receipt: TransactionReceipt) -> Receipt {
    let logs = receipt
        .inner
        .logs()
        .iter()
        .enumerate()
        .map(|(position, log)| Log {
            address: log.inner.address.into(),
            data: log.inner.data.clone(),
            log_index: log.log_index.unwrap_or(position as u64),
        })
        .collect();
    Receipt {
        transaction_hash: receipt.transaction_hash.into(),
        status: receipt.inner.status(),
        logs,
    }
}

#[async_trait]
impl LedgerPort for JsonRpcLedger {
    async fn current_height(&self) -> Result<u64, LedgerError> {
        Ok(self.provider.get_block_number().await?)
    }

    async fn get_block(&self, height: u64) -> Result<Option<Block>, LedgerError> {
        let block = self
            .provider
            .get_block_by_number(BlockNumberOrTag::Number(height))
            .full()
            .await?;
        block.map(block_from_rpc).transpose()
    }

    async fn get_transaction_receipt(
        &self,
        tx_hash: &TxHash,
    ) -> Result<Option<Receipt>, LedgerError> {
        let hash = tx_hash.to_b256().ok_or_else(|| {
            LedgerError::MalformedResponse(format!("transaction hash {tx_hash} is not 32 bytes"))
        })?;
        let receipt = self.provider.get_transaction_receipt(hash).await?;
        Ok(receipt.map(receipt_from_rpc))
    }
}

#[async_trait]
impl PayoutLedger for JsonRpcLedger {
    async fn transaction_count(&self, address: EvmAddress) -> Result<u64, LedgerError> {
        Ok(self.provider.get_transaction_count(address).pending().await?)
    }

    async fn gas_price(&self) -> Result<u128, LedgerError> {
        Ok(self.provider.get_gas_price().await?)
    }

    async fn estimate_gas(&self, request: &CallRequest) -> Result<u64, LedgerError> {
        Ok(self.provider.estimate_gas(call_request(request)).await?)
    }

    async fn balance(&self, address: EvmAddress) -> Result<U256, LedgerError> {
        Ok(self.provider.get_balance(address).await?)
    }

    async fn call(&self, request: &CallRequest) -> Result<Bytes, LedgerError> {
        Ok(self.provider.call(call_request(request)).await?)
    }

    async fn send_raw_transaction(&self, raw: &[u8]) -> Result<TxHash, LedgerError> {
        let pending = self.provider.send_raw_transaction(raw).await?;
        Ok((*pending.tx_hash()).into())
    }
}
