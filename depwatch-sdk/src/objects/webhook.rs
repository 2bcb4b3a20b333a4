//! Webhook payload types for deposit notifications.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::WebhookBody;
use super::primitives::{Address, AssetKind, TxHash, UserId};

/// Event type tag carried by [`DepositReceivedPayload`].
pub const DEPOSIT_RECEIVED_EVENT: &str = "deposit_received";

/// Webhook payload announcing a recorded deposit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositReceivedPayload {
    pub event_type: String,
    pub deposit_id: i64,
    pub user_id: UserId,
    pub asset_kind: AssetKind,
    pub amount: Decimal,
    pub address: Address,
    pub tx_hash: TxHash,
    pub log_index: Option<u64>,
    pub block_height: u64,
    pub timestamp: i64,
}

impl WebhookBody for DepositReceivedPayload {}
