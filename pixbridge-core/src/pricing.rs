//! Fee and amount calculation shared by both settlement directions.

use crate::config::PricingConfig;
use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuoteError {
    #[error("amount {amount} is below the minimum of {min} BRL")]
    BelowMinimum { amount: Decimal, min: Decimal },
    #[error("amount {amount} is above the maximum of {max} BRL")]
    AboveMaximum { amount: Decimal, max: Decimal },
    #[error("amount {amount} leaves nothing after the {fee} BRL fee")]
    NonPositivePayout { amount: Decimal, fee: Decimal },
    #[error("rate must be positive")]
    InvalidRate,
}

/// Amounts locked into an order at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quote {
    pub amount_brl: Decimal,
    pub fee_brl: Decimal,
    /// Net fiat after the fee.
    pub payout_brl: Decimal,
    /// `payout_brl / rate`, rounded to the token's decimals.
    pub crypto_amount: Decimal,
    pub rate: Decimal,
}

/// `fee = max(fee_min, amount·fee_rate)`, `payout = amount − fee`,
/// `crypto = payout / rate`.
pub fn quote(amount_brl: Decimal, rate: Decimal, pricing: &PricingConfig) -> Result<Quote, QuoteError> {
    if rate <= Decimal::ZERO {
        return Err(QuoteError::InvalidRate);
    }
    if amount_brl < pricing.order_min_brl {
        return Err(QuoteError::BelowMinimum {
            amount: amount_brl,
            min: pricing.order_min_brl,
        });
    }
    if amount_brl > pricing.order_max_brl {
        return Err(QuoteError::AboveMaximum {
            amount: amount_brl,
            max: pricing.order_max_brl,
        });
    }

    let fee_brl = (amount_brl * pricing.fee_rate)
        .max(pricing.fee_min_brl)
        .round_dp(2);
    let payout_brl = amount_brl - fee_brl;
    if payout_brl <= Decimal::ZERO {
        return Err(QuoteError::NonPositivePayout {
            amount: amount_brl,
            fee: fee_brl,
        });
    }
    let crypto_amount = (payout_brl / rate)
        .round_dp(pricing.token_decimals)
        .normalize();

    Ok(Quote {
        amount_brl,
        fee_brl,
        payout_brl,
        crypto_amount,
        rate,
    })
}
