//! Period aggregator: folds raw production records into one figure set
//! per calendar month of a fiscal window.
//!
//! Read-only. A month without a monthly work record still yields an
//! entry, with every figure at zero and the cooling flag off.

use crate::{
    calendar,
    error::{ReconError, ReconResult},
    snapshot::{non_zero, ContractSnapshot},
    types::{ContractId, Hours, Qty, Rate},
};
use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Month-specific rate overrides. `None` (or zero) falls back to the snapshot.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct RateOverrides {
    #[serde(default)]
    pub prime:    Option<Rate>,
    #[serde(default)]
    pub optimize: Option<Rate>,
    #[serde(default)]
    pub ngt:      Option<Rate>,
    #[serde(default)]
    pub excess:   Option<Rate>,
}

impl RateOverrides {
    /// First non-zero value per field, `self` winning over `other`.
    fn or(self, other: RateOverrides) -> RateOverrides {
        RateOverrides {
            prime:    self.prime.and_then(non_zero).or(other.prime),
            optimize: self.optimize.and_then(non_zero).or(other.optimize),
            ngt:      self.ngt.and_then(non_zero).or(other.ngt),
            excess:   self.excess.and_then(non_zero).or(other.excess),
        }
    }
}

/// The surrounding system's monthly work order for one contract month.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MonthlyWorkRecord {
    pub contract_id: ContractId,
    /// Any day inside the month; normalised to the first.
    pub month_start: NaiveDate,
    /// Month MGQ target; `None` uses the snapshot's flat monthly MGQ.
    #[serde(default)]
    pub target: Option<Qty>,
    #[serde(default)]
    pub cooling: bool,
    #[serde(default)]
    pub bank_pull_limit: Option<Qty>,
    #[serde(default)]
    pub hourly_conversion_factor: Option<Decimal>,
    #[serde(default)]
    pub rates: RateOverrides,
}

/// A single production/delivery fact recorded against a contract.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProductionEvent {
    pub contract_id: ContractId,
    pub day: NaiveDate,
    #[serde(default)]
    pub prime_output_qty: Qty,
    /// Approved no-generation-time hours.
    #[serde(default)]
    pub ngt_hours: Hours,
    /// Lock-out/tag-out hours, charged only beyond the wave-off allowance.
    #[serde(default)]
    pub loto_hours: Hours,
}

/// LOTO hours split against the contract's wave-off allowance.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct WaveoffBreakdown {
    pub applied:    Hours,
    pub chargeable: Hours,
    pub remaining:  Hours,
}

impl WaveoffBreakdown {
    pub fn split(loto_hours: Hours, allowance: Hours) -> Self {
        let applied = loto_hours.min(allowance).max(Decimal::ZERO);
        Self {
            applied,
            chargeable: (loto_hours - allowance).max(Decimal::ZERO),
            remaining:  (allowance - applied).max(Decimal::ZERO),
        }
    }
}

/// One month of figures, in the shape the bank waterfall consumes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MonthlyAggregate {
    pub month_start: NaiveDate,
    pub target: Qty,
    pub produced: Qty,
    pub ngt_hours: Hours,
    /// Factor applied to `ngt_hours`; already resolved against the snapshot.
    pub hourly_conversion_factor: Decimal,
    pub ngt_qty: Qty,
    #[serde(default)]
    pub waveoff_applied_hours: Hours,
    pub waveoff_chargeable_hours: Hours,
    pub cooling_flag: bool,
    #[serde(default)]
    pub bank_pull_limit_override: Option<Qty>,
    #[serde(default)]
    pub rate_overrides: RateOverrides,
}

impl MonthlyAggregate {
    pub fn empty(month_start: NaiveDate) -> Self {
        Self {
            month_start,
            target: Decimal::ZERO,
            produced: Decimal::ZERO,
            ngt_hours: Decimal::ZERO,
            hourly_conversion_factor: Decimal::ZERO,
            ngt_qty: Decimal::ZERO,
            waveoff_applied_hours: Decimal::ZERO,
            waveoff_chargeable_hours: Decimal::ZERO,
            cooling_flag: false,
            bank_pull_limit_override: None,
            rate_overrides: RateOverrides::default(),
        }
    }

    /// Reject the data-quality faults the waterfall must never see.
    pub fn validate(&self) -> ReconResult<()> {
        let checks: [(&'static str, Decimal); 6] = [
            ("target", self.target),
            ("produced", self.produced),
            ("ngt_hours", self.ngt_hours),
            ("ngt_qty", self.ngt_qty),
            ("waveoff_chargeable_hours", self.waveoff_chargeable_hours),
            ("bank_pull_limit_override", self.bank_pull_limit_override.unwrap_or_default()),
        ];
        for (field, value) in checks {
            reject_negative(self.month_start, field, value)?;
        }
        Ok(())
    }

    /// Over-target production before any bank pull.
    pub fn gross_excess(&self) -> Qty {
        (self.produced - self.target).max(Decimal::ZERO)
    }

    /// Under-target production.
    pub fn shortfall(&self) -> Qty {
        (self.target - self.produced).max(Decimal::ZERO)
    }
}

/// Ensure aggregates are valid, start on the first of a month and appear
/// once each in strictly increasing month order.
pub fn validate_sequence(months: &[MonthlyAggregate]) -> ReconResult<()> {
    for month in months {
        month.validate()?;
        if month.month_start.day() != 1 {
            return Err(ReconError::MonthNotAligned { month: month.month_start });
        }
    }
    for pair in months.windows(2) {
        let (previous, month) = (pair[0].month_start, pair[1].month_start);
        match month.cmp(&previous) {
            Ordering::Greater => {}
            Ordering::Equal => return Err(ReconError::DuplicateMonth { month }),
            Ordering::Less => return Err(ReconError::MonthsOutOfOrder { previous, month }),
        }
    }
    Ok(())
}

pub struct PeriodAggregator<'a> {
    snapshot: &'a ContractSnapshot,
    derive_ngt_factor: bool,
}

impl<'a> PeriodAggregator<'a> {
    pub fn new(snapshot: &'a ContractSnapshot) -> Self {
        Self {
            snapshot,
            derive_ngt_factor: false,
        }
    }

    pub fn derive_ngt_factor(mut self, derive: bool) -> Self {
        self.derive_ngt_factor = derive;
        self
    }

    /// Aggregate `contract_id`'s records over `[year_start, year_end]`.
    ///
    /// Records for other contracts or outside the window are ignored.
    /// Several work records in one month are merged: targets add up,
    /// cooling is set if any record sets it, the first non-zero override wins.
    pub fn aggregate(
        &self,
        contract_id: &str,
        year_start: NaiveDate,
        year_end: NaiveDate,
        work_records: &[MonthlyWorkRecord],
        events: &[ProductionEvent],
    ) -> ReconResult<Vec<MonthlyAggregate>> {
        if year_end < year_start {
            return Err(ReconError::InvalidFiscalWindow {
                start: year_start,
                end:   year_end,
            });
        }

        let months = calendar::months_in_window(year_start, year_end);
        let mut out = Vec::with_capacity(months.len());

        for month in months {
            let next = calendar::next_month_start(month);
            let records: Vec<&MonthlyWorkRecord> = work_records
                .iter()
                .filter(|r| r.contract_id == contract_id)
                .filter(|r| calendar::month_start(r.month_start) == month)
                .collect();
            let month_events: Vec<&ProductionEvent> = events
                .iter()
                .filter(|e| e.contract_id == contract_id)
                .filter(|e| e.day >= year_start && e.day <= year_end)
                .filter(|e| e.day >= month && e.day < next)
                .collect();

            out.push(self.aggregate_month(month, &records, &month_events)?);
        }

        log::debug!(
            "aggregated {} months for contract {contract_id} ({year_start}..{year_end})",
            out.len()
        );
        Ok(out)
    }

    fn aggregate_month(
        &self,
        month: NaiveDate,
        records: &[&MonthlyWorkRecord],
        events: &[&ProductionEvent],
    ) -> ReconResult<MonthlyAggregate> {
        let mut agg = MonthlyAggregate::empty(month);

        for record in records {
            if let Some(target) = record.target {
                reject_negative(month, "target", target)?;
            }
            if let Some(limit) = record.bank_pull_limit {
                reject_negative(month, "bank_pull_limit_override", limit)?;
            }
        }
        for event in events {
            reject_negative(event.day, "produced", event.prime_output_qty)?;
            reject_negative(event.day, "ngt_hours", event.ngt_hours)?;
            reject_negative(event.day, "loto_hours", event.loto_hours)?;
        }

        if records.is_empty() {
            if !events.is_empty() {
                log::warn!(
                    "{} production events in {month} have no monthly work record; month left at zero",
                    events.len()
                );
            }
            return Ok(agg);
        }

        agg.produced = events.iter().map(|e| e.prime_output_qty).sum();
        agg.ngt_hours = events.iter().map(|e| e.ngt_hours).sum();

        agg.target = records
            .iter()
            .map(|r| r.target.and_then(non_zero).unwrap_or(self.snapshot.monthly_mgq))
            .sum();
        agg.cooling_flag = records.iter().any(|r| r.cooling);
        agg.bank_pull_limit_override = records
            .iter()
            .find_map(|r| r.bank_pull_limit.and_then(non_zero));
        agg.rate_overrides = records
            .iter()
            .fold(RateOverrides::default(), |acc, r| acc.or(r.rates));

        let factor_override = records
            .iter()
            .find_map(|r| r.hourly_conversion_factor.and_then(non_zero));
        agg.hourly_conversion_factor =
            self.snapshot
                .ngt_factor_for(month, agg.target, factor_override, self.derive_ngt_factor);
        agg.ngt_qty = agg.ngt_hours * agg.hourly_conversion_factor;

        let loto: Hours = events.iter().map(|e| e.loto_hours).sum();
        let waveoff = WaveoffBreakdown::split(loto, self.snapshot.waveoff_allowance_hours);
        agg.waveoff_applied_hours = waveoff.applied;
        agg.waveoff_chargeable_hours = waveoff.chargeable;

        Ok(agg)
    }
}

fn reject_negative(month: NaiveDate, field: &'static str, value: Decimal) -> ReconResult<()> {
    if value < Decimal::ZERO {
        return Err(ReconError::NegativeQuantity { month, field, value });
    }
    Ok(())
}
