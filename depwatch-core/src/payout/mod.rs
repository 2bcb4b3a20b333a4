//! Outbound payouts from the custodial address.
//!
//! One request, one broadcast: the dispatcher never retries. The caller
//! decides what to do with an error.

pub mod local_signer;
pub mod node_signer;

use std::sync::Arc;

use alloy::network::TransactionBuilder;
use alloy::primitives::{Address as EvmAddress, Bytes, U256};
use alloy::rpc::types::TransactionRequest;
use async_trait::async_trait;
use depwatch_sdk::objects::{Address, AssetKind, TransferResult, TxHash};
use rust_decimal::Decimal;
use thiserror::Error;
use tracing::info;

use crate::abi::{decode_balance_of_return, encode_balance_of_call, encode_transfer_call};
use crate::config::ChainConfig;
use crate::ledger::{CallRequest, LedgerError, PayoutLedger};
use crate::utils::units::{UnitError, scale_up};

pub use local_signer::{LocalSigner, generate_wallet};
pub use node_signer::NodeSigner;

/// Gas of a plain value transfer.
pub const NATIVE_TRANSFER_GAS: u64 = 21_000;

/// A legacy-priced transaction ready to be signed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsignedTransaction {
    pub from: EvmAddress,
    pub to: EvmAddress,
    pub value: U256,
    pub data: Bytes,
    pub nonce: u64,
    pub gas: u64,
    pub gas_price: u128,
    pub chain_id: u64,
}

impl UnsignedTransaction {
    /// Every field set, so a wallet can sign it without further lookups.
    pub fn to_request(&self) -> TransactionRequest {
        TransactionRequest::default()
            .with_from(self.from)
            .with_to(self.to)
            .with_value(self.value)
            .with_input(self.data.clone())
            .with_nonce(self.nonce)
            .with_gas_limit(self.gas)
            .with_gas_price(self.gas_price)
            .with_chain_id(self.chain_id)
    }
}

#[derive(Debug, Error)]
pub enum SignerError {
    #[error("signer ledger call failed: {0}")]
    Ledger(#[from] LedgerError),
    #[error("invalid private key: {0}")]
    InvalidKey(String),
    #[error("signer refused: {0}")]
    Refused(String),
}

/// Holds the custodial key and turns transactions into raw signed bytes.
#[async_trait]
pub trait TransactionSigner: Send + Sync {
    /// The custodial address funds are sent from.
    fn address(&self) -> EvmAddress;

    /// EIP-2718 encoded signed transaction, ready for broadcast.
    async fn sign(&self, tx: &UnsignedTransaction) -> Result<Vec<u8>, SignerError>;
}

#[async_trait]
impl<T: TransactionSigner + ?Sized> TransactionSigner for Box<T> {
    fn address(&self) -> EvmAddress {
        (**self).address()
    }

    async fn sign(&self, tx: &UnsignedTransaction) -> Result<Vec<u8>, SignerError> {
        (**self).sign(tx).await
    }
}

#[async_trait]
impl<T: TransactionSigner + ?Sized> TransactionSigner for Arc<T> {
    fn address(&self) -> EvmAddress {
        (**self).address()
    }

    async fn sign(&self, tx: &UnsignedTransaction) -> Result<Vec<u8>, SignerError> {
        (**self).sign(tx).await
    }
}

#[derive(Debug, Error)]
pub enum PayoutError {
    #[error("invalid recipient address: {0}")]
    InvalidAddress(Address),

    #[error("invalid amount: {0}")]
    InvalidAmount(#[from] UnitError),

    #[error("no token is configured")]
    TokenNotConfigured,

    #[error("insufficient {asset_kind} balance: {available} available, {required} required")]
    InsufficientBalance {
        asset_kind: AssetKind,
        available: U256,
        required: U256,
    },

    #[error("signing failed: {0}")]
    Signing(#[from] SignerError),

    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),
}

/// Builds, signs and broadcasts transfers out of the custodial address.
pub struct PayoutDispatcher<L: ?Sized, S> {
    ledger: Arc<L>,
    signer: S,
    chain: ChainConfig,
}

impl<L, S> PayoutDispatcher<L, S>
where
    L: PayoutLedger + ?Sized,
    S: TransactionSigner,
{
    pub fn new(ledger: Arc<L>, signer: S, chain: ChainConfig) -> Self {
        Self {
            ledger,
            signer,
            chain,
        }
    }

    pub fn custodial_address(&self) -> Address {
        self.signer.address().into()
    }

    /// Send `amount` of the native asset to `to`.
    #[tracing::instrument(skip(self, to), err, fields(to = %to))]
    pub async fn pay_native(
        &self,
        to: &Address,
        amount: Decimal,
    ) -> Result<TransferResult, PayoutError> {
        let recipient = validate_recipient(to)?;
        let value = scale_up(amount, self.chain.native_decimals)?;
        let from = self.signer.address();

        let gas_price = self.ledger.gas_price().await?;
        let required = U256::from(gas_price)
            .checked_mul(U256::from(NATIVE_TRANSFER_GAS))
            .and_then(|fee| fee.checked_add(value))
            .ok_or(UnitError::Overflow)?;
        let available = self.ledger.balance(from).await?;
        if available < required {
            return Err(PayoutError::InsufficientBalance {
                asset_kind: AssetKind::Native,
                available,
                required,
            });
        }

        let nonce = self.ledger.transaction_count(from).await?;
        let tx = UnsignedTransaction {
            from,
            to: recipient,
            value,
            data: Bytes::new(),
            nonce,
            gas: NATIVE_TRANSFER_GAS,
            gas_price,
            chain_id: self.chain.chain_id,
        };
        let tx_hash = self.submit(&tx).await?;
        info!(
            to = %to,
            amount = %amount,
            tx_hash = %tx_hash,
            nonce,
            "Native payout broadcast"
        );
        Ok(TransferResult {
            to_address: to.clone(),
            asset_kind: AssetKind::Native,
            amount,
            tx_hash,
        })
    }

    /// Send `amount` of the configured token to `to`.
    #[tracing::instrument(skip(self, to), err, fields(to = %to))]
    pub async fn pay_token(
        &self,
        to: &Address,
        amount: Decimal,
    ) -> Result<TransferResult, PayoutError> {
        let token = self
            .chain
            .token
            .as_ref()
            .ok_or(PayoutError::TokenNotConfigured)?;
        let recipient = validate_recipient(to)?;
        let value = scale_up(amount, token.decimals)?;
        let contract = token
            .contract
            .to_evm()
            .ok_or_else(|| PayoutError::InvalidAddress(token.contract.clone()))?;
        let from = self.signer.address();

        let available = self.token_balance(contract, from).await?;
        if available < value {
            return Err(PayoutError::InsufficientBalance {
                asset_kind: AssetKind::Token,
                available,
                required: value,
            });
        }

        let call = CallRequest {
            from: Some(from),
            to: contract,
            value: U256::ZERO,
            data: encode_transfer_call(recipient, value),
        };
        let gas = self.ledger.estimate_gas(&call).await?;
        let gas_price = self.ledger.gas_price().await?;
        let fee = U256::from(gas_price)
            .checked_mul(U256::from(gas))
            .ok_or(UnitError::Overflow)?;
        let native = self.ledger.balance(from).await?;
        if native < fee {
            return Err(PayoutError::InsufficientBalance {
                asset_kind: AssetKind::Native,
                available: native,
                required: fee,
            });
        }

        let nonce = self.ledger.transaction_count(from).await?;
        let tx = UnsignedTransaction {
            from,
            to: contract,
            value: U256::ZERO,
            data: call.data,
            nonce,
            gas,
            gas_price,
            chain_id: self.chain.chain_id,
        };
        let tx_hash = self.submit(&tx).await?;
        info!(
            to = %to,
            amount = %amount,
            token = %token.symbol,
            tx_hash = %tx_hash,
            nonce,
            "Token payout broadcast"
        );
        Ok(TransferResult {
            to_address: to.clone(),
            asset_kind: AssetKind::Token,
            amount,
            tx_hash,
        })
    }

    /// Dispatch on asset kind.
    pub async fn pay(
        &self,
        asset_kind: AssetKind,
        to: &Address,
        amount: Decimal,
    ) -> Result<TransferResult, PayoutError> {
        match asset_kind {
            AssetKind::Native => self.pay_native(to, amount).await,
            AssetKind::Token => self.pay_token(to, amount).await,
        }
    }

    async fn token_balance(
        &self,
        contract: EvmAddress,
        owner: EvmAddress,
    ) -> Result<U256, PayoutError> {
        let data = self
            .ledger
            .call(&CallRequest {
                from: None,
                to: contract,
                value: U256::ZERO,
                data: encode_balance_of_call(owner),
            })
            .await?;
        let balance = decode_balance_of_return(&data).ok_or_else(|| {
            LedgerError::MalformedResponse(format!("balanceOf returned {} bytes", data.len()))
        })?;
        Ok(balance)
    }

    async fn submit(&self, tx: &UnsignedTransaction) -> Result<TxHash, PayoutError> {
        let raw = self.signer.sign(tx).await?;
        Ok(self.ledger.send_raw_transaction(&raw).await?)
    }
}

fn validate_recipient(to: &Address) -> Result<EvmAddress, PayoutError> {
    to.to_evm()
        .ok_or_else(|| PayoutError::InvalidAddress(to.clone()))
}
