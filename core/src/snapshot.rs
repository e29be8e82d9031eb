//! Contract rate snapshot: the immutable copy of billing parameters a
//! reconciliation computes against.
//!
//! A snapshot is captured when a reconciliation is opened and again on
//! every explicit regeneration. Later edits to the live ContractTerms
//! never reach a reconciliation until it is regenerated.

use crate::{
    calendar,
    types::{ContractId, Hours, Qty, Rate},
};
use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// The live, editable contract as maintained by the surrounding system.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContractTerms {
    pub contract_id:            ContractId,
    pub contract_name:          String,
    pub monthly_mgq:            Qty,
    pub prime_rate:             Rate,
    pub optimize_rate:          Rate,
    #[serde(default)]
    pub ngt_rate:               Rate,
    pub excess_rate:            Rate,
    pub hourly_conversion_factor: Decimal,
    #[serde(default)]
    pub cooling_months:         u32,
    #[serde(default)]
    pub cooling_end:            Option<NaiveDateTime>,
    #[serde(default)]
    pub waveoff_allowance_hours: Hours,
    /// Zero means no limit.
    #[serde(default)]
    pub bank_pull_limit:        Qty,
    #[serde(default)]
    pub product_code:           Option<String>,
    /// Last write to the contract; becomes the snapshot's version tag.
    pub revised_at:             NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContractSnapshot {
    pub contract_name:          String,
    pub monthly_mgq:            Qty,
    pub prime_rate:             Rate,
    pub optimize_rate:          Rate,
    pub ngt_rate:               Rate,
    pub excess_rate:            Rate,
    pub hourly_conversion_factor: Decimal,
    pub cooling_months:         u32,
    pub cooling_end:            Option<NaiveDateTime>,
    pub waveoff_allowance_hours: Hours,
    pub bank_pull_limit:        Qty,
    pub product_code:           Option<String>,
    pub version_tag:            String,
}

impl ContractSnapshot {
    /// Copy the billing parameters out of the live contract.
    pub fn capture(terms: &ContractTerms) -> Self {
        Self {
            contract_name:            terms.contract_name.clone(),
            monthly_mgq:              terms.monthly_mgq,
            prime_rate:               terms.prime_rate,
            optimize_rate:            terms.optimize_rate,
            ngt_rate:                 terms.ngt_rate,
            excess_rate:              terms.excess_rate,
            hourly_conversion_factor: terms.hourly_conversion_factor,
            cooling_months:           terms.cooling_months,
            cooling_end:              terms.cooling_end,
            waveoff_allowance_hours:  terms.waveoff_allowance_hours,
            bank_pull_limit:          terms.bank_pull_limit,
            product_code:             terms.product_code.clone(),
            version_tag:              terms.revised_at.format("%Y%m%d%H%M%S").to_string(),
        }
    }

    /// The configured pull ceiling, `None` when unset (zero).
    pub fn bank_pull_limit(&self) -> Option<Qty> {
        non_zero(self.bank_pull_limit)
    }

    /// Rate for billing a remaining bank balance: optimize, else prime.
    pub fn settlement_rate(&self) -> Rate {
        non_zero(self.optimize_rate).unwrap_or(self.prime_rate)
    }

    /// Hours-to-quantity factor for a month.
    ///
    /// Priority: month override → snapshot factor → (if `derive`)
    /// `month_target / days_in_month / 24` rounded half-up to 2 dp → zero.
    /// A zero `month_target` derives from `monthly_mgq` instead.
    pub fn ngt_factor_for(
        &self,
        month_start: NaiveDate,
        month_target: Qty,
        month_override: Option<Decimal>,
        derive: bool,
    ) -> Decimal {
        if let Some(factor) = month_override.and_then(non_zero) {
            return factor;
        }
        if let Some(factor) = non_zero(self.hourly_conversion_factor) {
            return factor;
        }
        match non_zero(month_target).or_else(|| non_zero(self.monthly_mgq)) {
            Some(basis) if derive => {
                let days = Decimal::from(calendar::days_in_month(month_start));
                (basis / days / Decimal::from(24))
                    .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
            }
            _ => Decimal::ZERO,
        }
    }
}

/// Zero-as-unset, matching how contract fields are left blank upstream.
pub(crate) fn non_zero(value: Decimal) -> Option<Decimal> {
    if value.is_zero() {
        None
    } else {
        Some(value)
    }
}
