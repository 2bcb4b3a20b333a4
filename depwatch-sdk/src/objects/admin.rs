//! Admin API request and response types.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::primitives::{Address, AssetKind};

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

/// A recorded deposit including its webhook delivery state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminDepositResponse {
    pub id: i64,
    pub user_id: String,
    pub asset_kind: AssetKind,
    pub address: String,
    pub amount: Decimal,
    pub tx_hash: String,
    pub log_index: Option<i64>,
    pub block_height: i64,
    pub created_at: i64,
    pub webhook_retry_count: i32,
    pub webhook_success_at: Option<i64>,
    pub webhook_last_tried_at: Option<i64>,
}

/// Progress of the deposit watcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatcherStatusResponse {
    pub watcher_id: String,
    /// `None` until the watcher has initialized its cursor.
    pub last_processed_height: Option<u64>,
    pub payouts_enabled: bool,
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Request body for `POST /admin/payouts`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayoutRequest {
    pub asset_kind: AssetKind,
    pub to_address: Address,
    pub amount: Decimal,
}

// ---------------------------------------------------------------------------
// Query parameters
// ---------------------------------------------------------------------------

const DEFAULT_LIMIT: i64 = 20;
const MAX_LIMIT: i64 = 200;
const MAX_OFFSET: i64 = 100_000;

/// Query parameters for listing recorded deposits.
#[derive(Debug, Clone, Deserialize)]
pub struct ListDepositsQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
    pub user_id: Option<String>,
    pub asset_kind: Option<AssetKind>,
}

fn default_limit() -> i64 {
    DEFAULT_LIMIT
}

/// Clamp limit and offset to safe maximums.
pub fn clamp_pagination(limit: i64, offset: i64) -> (i64, i64) {
    (limit.clamp(1, MAX_LIMIT), offset.clamp(0, MAX_OFFSET))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_pagination() {
        assert_eq!(clamp_pagination(0, -5), (1, 0));
        assert_eq!(clamp_pagination(50, 10), (50, 10));
        assert_eq!(clamp_pagination(10_000, 1_000_000), (MAX_LIMIT, MAX_OFFSET));
    }

    #[test]
    fn test_payout_request_normalizes_address() {
        let request: PayoutRequest = serde_json::from_str(
            r#"{"asset_kind":"native","to_address":"0xABCDEF0000000000000000000000000000000001","amount":"0.25"}"#,
        )
        .unwrap();
        assert_eq!(
            request.to_address.as_str(),
            "0xabcdef0000000000000000000000000000000001"
        );
        assert_eq!(request.amount, Decimal::new(25, 2));
    }
}
