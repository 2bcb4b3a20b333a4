//! Conversion between smallest ledger units and human-scaled decimals.

use alloy::primitives::U256;
use rust_decimal::Decimal;
use thiserror::Error;

/// Largest decimal exponent a `Decimal` can carry.
pub const MAX_DECIMALS: u32 = 28;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UnitError {
    #[error("decimal exponent {0} exceeds the supported maximum of {MAX_DECIMALS}")]
    DecimalsTooLarge(u32),
    #[error("raw amount {0} cannot be represented as a decimal")]
    OutOfRange(U256),
    #[error("amount must be positive")]
    NonPositive,
    #[error("amount has {scale} fractional digits but the asset only has {decimals}")]
    TooPrecise { scale: u32, decimals: u32 },
    #[error("amount overflows the smallest-unit range")]
    Overflow,
}

/// Reject decimal exponents a `Decimal` cannot scale by.
pub fn check_decimals(decimals: u32) -> Result<(), UnitError> {
    if decimals > MAX_DECIMALS {
        return Err(UnitError::DecimalsTooLarge(decimals));
    }
    Ok(())
}

/// Scale a raw smallest-unit amount down by `10^decimals`.
///
/// `scale_down(1_500_000_000_000_000_000, 18)` is `1.5`. Amounts wider than
/// the 96-bit `Decimal` mantissa are [`UnitError::OutOfRange`].
pub fn scale_down(raw: U256, decimals: u32) -> Result<Decimal, UnitError> {
    check_decimals(decimals)?;
    let mantissa = i128::try_from(raw).map_err(|_| UnitError::OutOfRange(raw))?;
    let value = Decimal::try_from_i128_with_scale(mantissa, decimals)
        .map_err(|_| UnitError::OutOfRange(raw))?;
    Ok(value.normalize())
}

/// Scale a human amount up to smallest units.
///
/// Rejects non-positive amounts and amounts with more fractional digits than
/// the asset supports; nothing is rounded.
pub fn scale_up(amount: Decimal, decimals: u32) -> Result<U256, UnitError> {
    check_decimals(decimals)?;
    if amount <= Decimal::ZERO {
        return Err(UnitError::NonPositive);
    }
    let amount = amount.normalize();
    let scale = amount.scale();
    if scale > decimals {
        return Err(UnitError::TooPrecise { scale, decimals });
    }
    let mantissa = u128::try_from(amount.mantissa()).map_err(|_| UnitError::Overflow)?;
    10u128
        .checked_pow(decimals - scale)
        .and_then(|factor| mantissa.checked_mul(factor))
        .map(U256::from)
        .ok_or(UnitError::Overflow)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(value: u128) -> U256 {
        U256::from(value)
    }

    #[test]
    fn test_native_amount_conversion() {
        let amount = scale_down(raw(1_500_000_000_000_000_000), 18).unwrap();
        assert_eq!(amount, Decimal::new(15, 1));
        assert_eq!(amount.to_string(), "1.5");
    }

    #[test]
    fn test_token_amount_conversion() {
        assert_eq!(scale_down(raw(2_500_000), 6).unwrap(), Decimal::new(25, 1));
        assert_eq!(scale_down(U256::ZERO, 6).unwrap(), Decimal::ZERO);
    }

    #[test]
    fn test_scale_down_rejects_unrepresentable() {
        assert_eq!(scale_down(raw(1), 30), Err(UnitError::DecimalsTooLarge(30)));
        assert_eq!(
            scale_down(raw(u128::MAX), 18),
            Err(UnitError::OutOfRange(raw(u128::MAX)))
        );
        let wide = U256::from(1u8) << 200;
        assert_eq!(scale_down(wide, 18), Err(UnitError::OutOfRange(wide)));
    }

    #[test]
    fn test_check_decimals_bounds() {
        assert_eq!(check_decimals(0), Ok(()));
        assert_eq!(check_decimals(MAX_DECIMALS), Ok(()));
        assert_eq!(
            check_decimals(MAX_DECIMALS + 1),
            Err(UnitError::DecimalsTooLarge(29))
        );
    }

    #[test]
    fn test_scale_up() {
        assert_eq!(
            scale_up(Decimal::new(15, 1), 18).unwrap(),
            raw(1_500_000_000_000_000_000)
        );
        assert_eq!(scale_up(Decimal::new(2_500, 3), 6).unwrap(), raw(2_500_000));
        assert_eq!(scale_up(Decimal::new(1_000, 3), 0).unwrap(), raw(1));
    }

    #[test]
    fn test_scale_up_rejects_bad_amounts() {
        assert_eq!(scale_up(Decimal::ZERO, 18), Err(UnitError::NonPositive));
        assert_eq!(scale_up(Decimal::new(-1, 0), 18), Err(UnitError::NonPositive));
        assert_eq!(
            scale_up(Decimal::new(1_234_567, 7), 6),
            Err(UnitError::TooPrecise {
                scale: 7,
                decimals: 6
            })
        );
    }
}
