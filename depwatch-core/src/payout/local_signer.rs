//! In-process signing with a custodial private key.

use alloy::eips::eip2718::Encodable2718;
use alloy::network::{EthereumWallet, TransactionBuilder};
use alloy::primitives::Address as EvmAddress;
use alloy::signers::local::PrivateKeySigner;
use async_trait::async_trait;
use depwatch_sdk::objects::{PrivateKey, UserId, Wallet};

use super::{SignerError, TransactionSigner, UnsignedTransaction};

/// Signs legacy transactions locally, so payouts work against any public
/// node that only accepts `eth_sendRawTransaction`.
pub struct LocalSigner {
    wallet: EthereumWallet,
    address: EvmAddress,
}

impl LocalSigner {
    pub fn new(signer: PrivateKeySigner) -> Self {
        let address = signer.address();
        Self {
            wallet: EthereumWallet::from(signer),
            address,
        }
    }

    /// Parse a hex private key, with or without `0x`.
    pub fn from_private_key(key: &PrivateKey) -> Result<Self, SignerError> {
        key.expose()
            .trim()
            .parse::<PrivateKeySigner>()
            .map(Self::new)
            .map_err(|e| SignerError::InvalidKey(e.to_string()))
    }
}

#[async_trait]
impl TransactionSigner for LocalSigner {
    fn address(&self) -> EvmAddress {
        self.address
    }

    async fn sign(&self, tx: &UnsignedTransaction) -> Result<Vec<u8>, SignerError> {
        let envelope = tx
            .to_request()
            .build(&self.wallet)
            .await
            .map_err(|e| SignerError::Refused(e.to_string()))?;
        Ok(envelope.encoded_2718())
    }
}

/// Create a fresh keypair for `user_id`.
pub fn generate_wallet(user_id: UserId) -> Wallet {
    let signer = PrivateKeySigner::random();
    Wallet {
        user_id,
        address: signer.address().into(),
        private_key: PrivateKey::new(signer.to_bytes().to_string()),
    }
}
