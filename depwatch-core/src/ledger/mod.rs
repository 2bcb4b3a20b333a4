//! Ledger access port.
//!
//! The watcher and the payout dispatcher only talk to the chain through the
//! [`LedgerPort`] and [`PayoutLedger`] traits. [`JsonRpcLedger`] implements
//! both over an alloy HTTP provider.

pub mod json_rpc;

use alloy::primitives::{Address as EvmAddress, Bytes, LogData, U256};
use alloy::transports::TransportError;
use async_trait::async_trait;
use depwatch_sdk::objects::{Address, TxHash};
use thiserror::Error;

pub use json_rpc::JsonRpcLedger;

/// Errors raised by ledger access.
///
/// From the watcher's point of view every variant is transient: it backs off
/// and retries the same height.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Transport failure or a JSON-RPC error object from the node.
    #[error("rpc error: {0}")]
    Transport(#[from] TransportError),

    /// The node answered with something that is not the expected shape.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// A transaction included in a block has no receipt yet.
    #[error("receipt for {0} is not available")]
    MissingReceipt(TxHash),
}

/// A block with its transaction bodies reduced to what classification reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub number: u64,
    pub transactions: Vec<Transaction>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub hash: TxHash,
    /// `None` for contract creation.
    pub to: Option<Address>,
    /// Value in the native asset's smallest unit, full 256-bit width.
    pub value: U256,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub transaction_hash: TxHash,
    /// `false` when the transaction reverted.
    pub status: bool,
    pub logs: Vec<Log>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Log {
    /// Emitting contract.
    pub address: Address,
    pub data: LogData,
    pub log_index: u64,
}

/// A read-only call or gas estimation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRequest {
    pub from: Option<EvmAddress>,
    pub to: EvmAddress,
    pub value: U256,
    pub data: Bytes,
}

/// Read access used by the deposit watcher.
#[async_trait]
pub trait LedgerPort: Send + Sync {
    /// Height of the current chain head.
    async fn current_height(&self) -> Result<u64, LedgerError>;

    /// Fetch a block with full transactions, `None` if it does not exist yet.
    async fn get_block(&self, height: u64) -> Result<Option<Block>, LedgerError>;

    /// Fetch a transaction receipt, `None` if the node does not know it.
    async fn get_transaction_receipt(
        &self,
        tx_hash: &TxHash,
    ) -> Result<Option<Receipt>, LedgerError>;
}

/// Account state and broadcast access used by the payout dispatcher.
#[async_trait]
pub trait PayoutLedger: Send + Sync {
    /// Next nonce for `address`, counting pending transactions.
    async fn transaction_count(&self, address: EvmAddress) -> Result<u64, LedgerError>;

    async fn gas_price(&self) -> Result<u128, LedgerError>;

    async fn estimate_gas(&self, request: &CallRequest) -> Result<u64, LedgerError>;

    /// Native balance in smallest units.
    async fn balance(&self, address: EvmAddress) -> Result<U256, LedgerError>;

    /// Execute a read-only contract call and return the raw return data.
    async fn call(&self, request: &CallRequest) -> Result<Bytes, LedgerError>;

    /// Broadcast a signed transaction and return its hash.
    async fn send_raw_transaction(&self, raw: &[u8]) -> Result<TxHash, LedgerError>;
}
