//! Platform and processor fee calculation.
//!
//! All amounts are integer minor units. Rates are exact decimals and every
//! product is rounded half away from zero to the nearest minor unit, so the
//! same inputs always produce the same ledger row.

use crate::entities::Processor;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use utoipa::ToSchema;

/// Currency key matching any currency without its own entry.
pub const ANY_CURRENCY: &str = "*";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FeeError {
    #[error("gross amount must not be negative (got {0})")]
    NegativeGross(i64),
    #[error("processor fee must not be negative (got {0})")]
    NegativeProcessorFee(i64),
    #[error("no fee rate configured for {processor} in {currency}")]
    MissingRate { processor: String, currency: String },
    #[error("fees ({platform_fee} + {processor_fee}) exceed gross {gross}; check fee configuration")]
    NegativeNet {
        gross: i64,
        platform_fee: i64,
        processor_fee: i64,
    },
    #[error("invalid fee rate: {0}")]
    InvalidRate(String),
    #[error("fee arithmetic overflow")]
    Overflow,
}

/// Percentage plus fixed per-transaction amount charged by a processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ProcessorRate {
    /// Fraction of the charge, e.g. `0.029` for 2.9%
    #[schema(value_type = String)]
    pub percentage: Decimal,
    /// Fixed amount in minor units, e.g. `49` for $0.49
    pub fixed_minor: i64,
}

impl ProcessorRate {
    pub const fn new(percentage: Decimal, fixed_minor: i64) -> Self {
        Self {
            percentage,
            fixed_minor,
        }
    }
}

/// Fee rates, loaded once at start-up and handed to the calculator per call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeeConfig {
    #[serde(default = "default_platform_rate")]
    pub platform_rate: Decimal,
    /// processor name -> currency code (or `*`) -> rate
    #[serde(default = "default_processor_rates")]
    pub processors: HashMap<String, HashMap<String, ProcessorRate>>,
}

impl Default for FeeConfig {
    fn default() -> Self {
        Self {
            platform_rate: default_platform_rate(),
            processors: default_processor_rates(),
        }
    }
}

fn default_platform_rate() -> Decimal {
    dec!(0.0899)
}

fn default_processor_rates() -> HashMap<String, HashMap<String, ProcessorRate>> {
    let per_currency: HashMap<String, ProcessorRate> = [
        ("USD".to_string(), ProcessorRate::new(dec!(0.029), 49)),
        ("INR".to_string(), ProcessorRate::new(dec!(0.02), 300)),
    ]
    .into_iter()
    .collect();

    [Processor::Stripe, Processor::Paypal, Processor::CardGateway]
        .into_iter()
        .map(|p| (p.to_string(), per_currency.clone()))
        .collect()
}

impl FeeConfig {
    /// Rate for a processor and currency. Keys compare case-insensitively
    /// because layered config sources lowercase them.
    pub fn rate_for(&self, processor: Processor, currency: &str) -> Result<ProcessorRate, FeeError> {
        let processor_name = processor.to_string();
        let missing = || FeeError::MissingRate {
            processor: processor_name.clone(),
            currency: currency.to_ascii_uppercase(),
        };

        let rates = self
            .processors
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(&processor_name))
            .map(|(_, rates)| rates)
            .ok_or_else(missing)?;

        rates
            .iter()
            .find(|(code, _)| code.eq_ignore_ascii_case(currency))
            .or_else(|| rates.iter().find(|(code, _)| code.as_str() == ANY_CURRENCY))
            .map(|(_, rate)| *rate)
            .ok_or_else(missing)
    }

    /// Start-up sanity check of every configured rate.
    pub fn validate_rates(&self) -> Result<(), FeeError> {
        check_fraction("platform_rate", self.platform_rate)?;
        for (processor, rates) in &self.processors {
            if processor.parse::<Processor>().is_err() {
                return Err(FeeError::InvalidRate(format!(
                    "unknown processor '{}'",
                    processor
                )));
            }
            for (currency, rate) in rates {
                let well_formed = currency == ANY_CURRENCY
                    || (currency.len() == 3 && currency.chars().all(|c| c.is_ascii_alphabetic()));
                if !well_formed {
                    return Err(FeeError::InvalidRate(format!(
                        "'{}' is not a currency code",
                        currency
                    )));
                }
                check_fraction(&format!("{}.{}", processor, currency), rate.percentage)?;
                if rate.fixed_minor < 0 {
                    return Err(FeeError::InvalidRate(format!(
                        "{}.{} fixed amount is negative",
                        processor, currency
                    )));
                }
            }
        }
        Ok(())
    }
}

fn check_fraction(name: &str, rate: Decimal) -> Result<(), FeeError> {
    if rate < Decimal::ZERO || rate >= Decimal::ONE {
        return Err(FeeError::InvalidRate(format!(
            "{} must be within [0, 1), got {}",
            name, rate
        )));
    }
    Ok(())
}

/// Fee split of one gross amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct FeeBreakdown {
    pub gross_amount: i64,
    pub platform_fee: i64,
    pub processor_fee: i64,
    pub net_amount: i64,
}

impl FeeBreakdown {
    pub fn total_fees(&self) -> i64 {
        self.platform_fee + self.processor_fee
    }
}

fn round_minor(value: Decimal) -> Result<i64, FeeError> {
    value
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .ok_or(FeeError::Overflow)
}

fn platform_fee(config: &FeeConfig, gross: i64) -> Result<i64, FeeError> {
    let product = Decimal::from(gross)
        .checked_mul(config.platform_rate)
        .ok_or(FeeError::Overflow)?;
    round_minor(product)
}

fn finish(gross: i64, platform_fee: i64, processor_fee: i64) -> Result<FeeBreakdown, FeeError> {
    let net_amount = gross
        .checked_sub(platform_fee)
        .and_then(|v| v.checked_sub(processor_fee))
        .ok_or(FeeError::Overflow)?;
    if net_amount < 0 {
        return Err(FeeError::NegativeNet {
            gross,
            platform_fee,
            processor_fee,
        });
    }
    Ok(FeeBreakdown {
        gross_amount: gross,
        platform_fee,
        processor_fee,
        net_amount,
    })
}

/// Computes platform fee, processor fee and net for a gross amount.
///
/// The processor's percentage applies to the gross plus its fixed component,
/// so 10000 USD cents at 2.9% + 49 yields a processor fee of 340. A zero gross
/// carries no fees. A configuration whose fees exceed the gross is an error,
/// never clamped.
pub fn compute_fees(
    config: &FeeConfig,
    gross: i64,
    currency: &str,
    processor: Processor,
) -> Result<FeeBreakdown, FeeError> {
    if gross < 0 {
        return Err(FeeError::NegativeGross(gross));
    }
    if gross == 0 {
        return finish(0, 0, 0);
    }

    let rate = config.rate_for(processor, currency)?;
    let basis = gross.checked_add(rate.fixed_minor).ok_or(FeeError::Overflow)?;
    let variable = round_minor(
        Decimal::from(basis)
            .checked_mul(rate.percentage)
            .ok_or(FeeError::Overflow)?,
    )?;
    let processor_fee = variable
        .checked_add(rate.fixed_minor)
        .ok_or(FeeError::Overflow)?;

    finish(gross, platform_fee(config, gross)?, processor_fee)
}

/// Same as [`compute_fees`] but with the processor fee the processor reported
/// on capture instead of the configured estimate.
pub fn compute_fees_with_reported(
    config: &FeeConfig,
    gross: i64,
    reported_processor_fee: i64,
) -> Result<FeeBreakdown, FeeError> {
    if gross < 0 {
        return Err(FeeError::NegativeGross(gross));
    }
    if reported_processor_fee < 0 {
        return Err(FeeError::NegativeProcessorFee(reported_processor_fee));
    }
    finish(gross, platform_fee(config, gross)?, reported_processor_fee)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use proptest::prelude::*;

    #[test]
    fn hundred_dollar_card_gateway_donation() {
        let fees = compute_fees(&FeeConfig::default(), 10_000, "USD", Processor::CardGateway)
            .unwrap();
        assert_eq!(fees.platform_fee, 899);
        assert_eq!(fees.processor_fee, 340);
        assert_eq!(fees.net_amount, 8_761);
        assert_eq!(
            fees.platform_fee + fees.processor_fee + fees.net_amount,
            10_000
        );
    }

    #[test]
    fn inr_uses_its_own_rate() {
        // platform 8990, processor round(100300 * 0.02) + 300 = 2306
        let fees = compute_fees(&FeeConfig::default(), 100_000, "inr", Processor::Paypal).unwrap();
        assert_eq!(fees.platform_fee, 8_990);
        assert_eq!(fees.processor_fee, 2_306);
        assert_eq!(fees.net_amount, 88_704);
    }

    #[test]
    fn half_cents_round_away_from_zero() {
        let mut config = FeeConfig::default();
        config.platform_rate = dec!(0.05);
        // 10 * 0.05 = 0.5 -> 1; 30 * 0.05 = 1.5 -> 2
        assert_eq!(platform_fee(&config, 10).unwrap(), 1);
        assert_eq!(platform_fee(&config, 30).unwrap(), 2);
    }

    #[test]
    fn zero_gross_has_no_fees() {
        let fees = compute_fees(&FeeConfig::default(), 0, "USD", Processor::Stripe).unwrap();
        assert_eq!(fees.total_fees(), 0);
        assert_eq!(fees.net_amount, 0);
    }

    #[test]
    fn fees_above_gross_fail_loudly() {
        let result = compute_fees(&FeeConfig::default(), 20, "USD", Processor::Stripe);
        assert_matches!(result, Err(FeeError::NegativeNet { gross: 20, .. }));
    }

    #[test]
    fn unknown_currency_without_fallback_is_a_configuration_error() {
        let result = compute_fees(&FeeConfig::default(), 5_000, "EUR", Processor::Stripe);
        assert_matches!(result, Err(FeeError::MissingRate { .. }));
    }

    #[test]
    fn wildcard_currency_is_used_as_fallback() {
        let mut config = FeeConfig::default();
        config
            .processors
            .get_mut("stripe")
            .unwrap()
            .insert(ANY_CURRENCY.to_string(), ProcessorRate::new(dec!(0.03), 25));
        let fees = compute_fees(&config, 10_000, "EUR", Processor::Stripe).unwrap();
        // round(10025 * 0.03) + 25 = 301 + 25
        assert_eq!(fees.processor_fee, 326);
    }

    #[test]
    fn reported_processor_fee_replaces_estimate() {
        let fees = compute_fees_with_reported(&FeeConfig::default(), 10_000, 320).unwrap();
        assert_eq!(fees.platform_fee, 899);
        assert_eq!(fees.processor_fee, 320);
        assert_eq!(fees.net_amount, 8_781);
        assert_matches!(
            compute_fees_with_reported(&FeeConfig::default(), 10_000, -1),
            Err(FeeError::NegativeProcessorFee(-1))
        );
    }

    #[test]
    fn negative_gross_is_rejected() {
        assert_matches!(
            compute_fees(&FeeConfig::default(), -1, "USD", Processor::Stripe),
            Err(FeeError::NegativeGross(-1))
        );
    }

    #[test]
    fn validate_rates_rejects_bad_entries() {
        assert!(FeeConfig::default().validate_rates().is_ok());

        let mut config = FeeConfig::default();
        config.processors.insert("venmo".into(), HashMap::new());
        assert_matches!(config.validate_rates(), Err(FeeError::InvalidRate(_)));

        let mut config = FeeConfig::default();
        config
            .processors
            .get_mut("paypal")
            .unwrap()
            .insert("USD".into(), ProcessorRate::new(dec!(0.03), -5));
        assert_matches!(config.validate_rates(), Err(FeeError::InvalidRate(_)));
    }

    proptest! {
        #[test]
        fn fees_never_exceed_gross(gross in 0i64..10_000_000_000, processor_idx in 0usize..3) {
            let processor = [Processor::Stripe, Processor::Paypal, Processor::CardGateway][processor_idx];
            match compute_fees(&FeeConfig::default(), gross, "USD", processor) {
                Ok(fees) => {
                    prop_assert!(fees.platform_fee >= 0);
                    prop_assert!(fees.processor_fee >= 0);
                    prop_assert!(fees.net_amount >= 0);
                    prop_assert!(fees.platform_fee + fees.processor_fee <= gross);
                    prop_assert_eq!(fees.platform_fee + fees.processor_fee + fees.net_amount, gross);
                }
                Err(err) => {
                    let is_negative_net = matches!(err, FeeError::NegativeNet { .. });
                    prop_assert!(is_negative_net);
                    prop_assert!(gross < 100);
                }
            }
        }
    }
}
