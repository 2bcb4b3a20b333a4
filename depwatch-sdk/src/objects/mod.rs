pub mod admin;
pub mod deposit;
pub mod primitives;
pub mod webhook;

pub use deposit::{DepositEvent, PrivateKey, TransferResult, Wallet};
pub use primitives::{Address, AssetKind, TxHash, UserId};

/// Payloads that can be sent as a [`SignedWebhook`](crate::signature::SignedWebhook).
pub trait WebhookBody: for<'de> serde::Deserialize<'de> + serde::Serialize {}
