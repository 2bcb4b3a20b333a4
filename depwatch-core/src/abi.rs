//! ERC-20 ABI: the `Transfer` event and the two calls the payout dispatcher
//! needs.

use alloy::primitives::{Address as EvmAddress, Bytes, LogData, U256};
use alloy::sol;
use alloy::sol_types::{SolCall, SolEvent};
use depwatch_sdk::objects::Address;
use thiserror::Error;

sol! {
    event Transfer(address indexed from, address indexed to, uint256 value);

    function transfer(address to, uint256 amount) external returns (bool);

    function balanceOf(address owner) external view returns (uint256);
}

/// A decoded `Transfer(address indexed from, address indexed to, uint256 value)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenTransferLog {
    pub from: Address,
    pub to: Address,
    /// Raw value in the token's smallest unit.
    pub value: U256,
}

/// Why a log did not decode as a token transfer.
///
/// Both variants are expected outcomes for unrelated logs in a receipt.
#[derive(Debug, Error)]
pub enum LogDecodeError {
    #[error("topic0 is not the Transfer signature")]
    NotTransfer,
    #[error("malformed Transfer log: {0}")]
    Abi(#[from] alloy::sol_types::Error),
}

/// Decode a raw log as an ERC-20 `Transfer` event.
///
/// ERC-721 transfers share the signature but index the third argument, so
/// they fail the topic count check.
pub fn decode_transfer_log(data: &LogData) -> Result<TokenTransferLog, LogDecodeError> {
    match data.topics() {
        [topic0, _, _] if *topic0 == Transfer::SIGNATURE_HASH => {}
        _ => return Err(LogDecodeError::NotTransfer),
    }
    let event = Transfer::decode_log_data(data)?;
    Ok(TokenTransferLog {
        from: event.from.into(),
        to: event.to.into(),
        value: event.value,
    })
}

/// Call data for `transfer(to, amount)`.
pub fn encode_transfer_call(to: EvmAddress, amount: U256) -> Bytes {
    transferCall { to, amount }.abi_encode().into()
}

/// Call data for `balanceOf(owner)`.
pub fn encode_balance_of_call(owner: EvmAddress) -> Bytes {
    balanceOfCall { owner }.abi_encode().into()
}

/// Decode the single `uint256` returned by `balanceOf`.
pub fn decode_balance_of_return(data: &[u8]) -> Option<U256> {
    if data.len() != 32 {
        return None;
    }
    U256::try_from_be_slice(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{B256, address};

    const FROM: EvmAddress = address!("111111111111111111111111111111111111aaaa");
    const TO: EvmAddress = address!("222222222222222222222222222222222222bbbb");

    #[test]
    fn test_decode_transfer_log() {
        let data = Transfer {
            from: FROM,
            to: TO,
            value: U256::from(2_500_000u64),
        }
        .encode_log_data();
        let decoded = decode_transfer_log(&data).unwrap();
        assert_eq!(
            decoded.to,
            Address::normalize("0x222222222222222222222222222222222222bbbb")
        );
        assert_eq!(
            decoded.from,
            Address::normalize("0x111111111111111111111111111111111111aaaa")
        );
        assert_eq!(decoded.value, U256::from(2_500_000u64));
    }

    #[test]
    fn test_full_width_value_decodes() {
        let data = Transfer {
            from: FROM,
            to: TO,
            value: U256::MAX,
        }
        .encode_log_data();
        assert_eq!(decode_transfer_log(&data).unwrap().value, U256::MAX);
    }

    #[test]
    fn test_unrelated_logs_do_not_decode() {
        let approval = LogData::new_unchecked(
            vec![
                B256::repeat_byte(0x8c),
                FROM.into_word(),
                TO.into_word(),
            ],
            U256::from(1u64).to_be_bytes_vec().into(),
        );
        assert!(matches!(
            decode_transfer_log(&approval),
            Err(LogDecodeError::NotTransfer)
        ));

        // ERC-721 Transfer carries the token id as a fourth topic.
        let nft = LogData::new_unchecked(
            vec![
                Transfer::SIGNATURE_HASH,
                FROM.into_word(),
                TO.into_word(),
                B256::with_last_byte(7),
            ],
            Bytes::new(),
        );
        assert!(matches!(
            decode_transfer_log(&nft),
            Err(LogDecodeError::NotTransfer)
        ));

        let short_data = LogData::new_unchecked(
            vec![Transfer::SIGNATURE_HASH, FROM.into_word(), TO.into_word()],
            Bytes::from_static(&[0x12, 0x34]),
        );
        assert!(matches!(
            decode_transfer_log(&short_data),
            Err(LogDecodeError::Abi(_))
        ));

        let empty = LogData::new_unchecked(vec![], Bytes::new());
        assert!(matches!(
            decode_transfer_log(&empty),
            Err(LogDecodeError::NotTransfer)
        ));
    }

    #[test]
    fn test_encode_transfer_call() {
        let data = encode_transfer_call(TO, U256::from(1_000_000u64));
        assert_eq!(data.len(), 68);
        assert_eq!(&data[..4], &[0xa9, 0x05, 0x9c, 0xbb]);
        assert_eq!(&data[4..16], &[0u8; 12]);
        assert_eq!(&data[16..36], TO.as_slice());
        assert_eq!(
            U256::try_from_be_slice(&data[36..]),
            Some(U256::from(1_000_000u64))
        );
    }

    #[test]
    fn test_balance_of_round_trip() {
        let data = encode_balance_of_call(FROM);
        assert_eq!(data.len(), 36);
        assert_eq!(&data[..4], &[0x70, 0xa0, 0x82, 0x31]);

        let word = U256::from(42u64).to_be_bytes_vec();
        assert_eq!(decode_balance_of_return(&word), Some(U256::from(42u64)));
        assert_eq!(decode_balance_of_return(&word[1..]), None);
    }
}
