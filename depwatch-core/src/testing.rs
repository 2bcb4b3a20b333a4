//! In-memory doubles of the ledger, sink and cursor store, plus block
//! builders, shared by the unit tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;

use alloy::primitives::U256;
use alloy::sol_types::SolEvent;
use async_trait::async_trait;
use depwatch_sdk::objects::{Address, DepositEvent, TxHash};

use crate::abi::Transfer;
use crate::config::{ChainConfig, TokenConfig};
use crate::ledger::{Block, LedgerError, LedgerPort, Log, Receipt, Transaction};
use crate::sink::{EventSink, SinkError};
use crate::watcher::cursor::{Cursor, CursorError, CursorStore, MemoryCursorStore};

pub const TOKEN: &str = "0x55d398326f99059ff775485246999027b3197955";

pub fn chain_config() -> ChainConfig {
    ChainConfig {
        chain_id: 56,
        native_symbol: "BNB".to_string(),
        native_decimals: 18,
        token: Some(TokenConfig {
            contract: Address::normalize(TOKEN),
            symbol: "USDT".to_string(),
            decimals: 6,
        }),
    }
}

pub fn block(number: u64, transactions: Vec<Transaction>) -> Block {
    Block {
        number,
        transactions,
    }
}

pub fn native_tx(hash: &str, to: &str, value: u128) -> Transaction {
    native_tx_value(hash, to, U256::from(value))
}

pub fn native_tx_value(hash: &str, to: &str, value: U256) -> Transaction {
    Transaction {
        hash: TxHash::normalize(hash),
        to: Some(Address::normalize(to)),
        value,
    }
}

/// A zero-value call to the token contract.
pub fn token_tx(hash: &str) -> Transaction {
    native_tx(hash, TOKEN, 0)
}

pub fn receipt(hash: &str, logs: Vec<Log>) -> Receipt {
    Receipt {
        transaction_hash: TxHash::normalize(hash),
        status: true,
        logs,
    }
}

fn evm(address: &str) -> alloy::primitives::Address {
    Address::normalize(address).to_evm().unwrap()
}

pub fn transfer_log(contract: &str, from: &str, to: &str, value: u128, log_index: u64) -> Log {
    let event = Transfer {
        from: evm(from),
        to: evm(to),
        value: U256::from(value),
    };
    Log {
        address: Address::normalize(contract),
        data: event.encode_log_data(),
        log_index,
    }
}

/// Scripted ledger. Heights without a block are "not yet available".
#[derive(Default)]
pub struct MockLedger {
    head: Mutex<u64>,
    blocks: Mutex<HashMap<u64, Block>>,
    receipts: Mutex<HashMap<TxHash, Receipt>>,
    block_failures: Mutex<HashMap<u64, u32>>,
    block_calls: Mutex<Vec<u64>>,
    head_calls: AtomicUsize,
    receipt_calls: AtomicUsize,
}

impl MockLedger {
    pub fn with_head(head: u64) -> Self {
        let ledger = Self::default();
        ledger.set_head(head);
        ledger
    }

    pub fn set_head(&self, head: u64) {
        *self.head.lock().unwrap() = head;
    }

    pub fn add_block(&self, block: Block) {
        self.blocks.lock().unwrap().insert(block.number, block);
    }

    pub fn add_receipt(&self, receipt: Receipt) {
        self.receipts
            .lock()
            .unwrap()
            .insert(receipt.transaction_hash.clone(), receipt);
    }

    /// Make the next `times` fetches of `height` fail with a transport-like error.
    pub fn fail_block(&self, height: u64, times: u32) {
        self.block_failures.lock().unwrap().insert(height, times);
    }

    pub fn block_calls(&self) -> Vec<u64> {
        self.block_calls.lock().unwrap().clone()
    }

    pub fn head_calls(&self) -> usize {
        self.head_calls.load(Ordering::SeqCst)
    }

    pub fn receipt_calls(&self) -> usize {
        self.receipt_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LedgerPort for MockLedger {
    async fn current_height(&self) -> Result<u64, LedgerError> {
        self.head_calls.fetch_add(1, Ordering::SeqCst);
        Ok(*self.head.lock().unwrap())
    }

    async fn get_block(&self, height: u64) -> Result<Option<Block>, LedgerError> {
        self.block_calls.lock().unwrap().push(height);
        if let Some(remaining) = self.block_failures.lock().unwrap().get_mut(&height) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(LedgerError::MalformedResponse("connection reset".into()));
            }
        }
        Ok(self.blocks.lock().unwrap().get(&height).cloned())
    }

    async fn get_transaction_receipt(
        &self,
        tx_hash: &TxHash,
    ) -> Result<Option<Receipt>, LedgerError> {
        self.receipt_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.receipts.lock().unwrap().get(tx_hash).cloned())
    }
}

/// Sink that records what it receives and can be told to fail or stall.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<DepositEvent>>,
    failures: AtomicU32,
    calls: AtomicUsize,
    stall: Mutex<Option<Duration>>,
}

impl RecordingSink {
    pub fn fail_next(&self, times: u32) {
        self.failures.store(times, Ordering::SeqCst);
    }

    pub fn stall_for(&self, delay: Duration) {
        *self.stall.lock().unwrap() = Some(delay);
    }

    pub fn events(&self) -> Vec<DepositEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EventSink for RecordingSink {
    async fn deliver(&self, event: DepositEvent) -> Result<(), SinkError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let stall = *self.stall.lock().unwrap();
        if let Some(delay) = stall {
            tokio::time::sleep(delay).await;
        }
        let failing = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(SinkError::Rejected("downstream unavailable".into()));
        }
        self.events.lock().unwrap().push(event);
        Ok(())
    }
}

/// Memory store whose saves can be made to fail.
#[derive(Default)]
pub struct FlakyCursorStore {
    inner: MemoryCursorStore,
    save_failures: AtomicU32,
    saves: AtomicUsize,
}

impl FlakyCursorStore {
    pub fn fail_saves(&self, times: u32) {
        self.save_failures.store(times, Ordering::SeqCst);
    }

    pub fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CursorStore for FlakyCursorStore {
    async fn load(&self, watcher_id: &str) -> Result<Option<Cursor>, CursorError> {
        self.inner.load(watcher_id).await
    }

    async fn save(&self, watcher_id: &str, cursor: Cursor) -> Result<(), CursorError> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .save_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(CursorError::Unavailable("disk full".into()));
        }
        self.inner.save(watcher_id, cursor).await
    }
}
