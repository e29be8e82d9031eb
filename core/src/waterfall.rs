//! Bank waterfall: turns chronologically ordered monthly figures into
//! ledger lines while carrying the running bank balance forward.
//!
//! ORDER IS A CORRECTNESS REQUIREMENT: month N's closing balance is the
//! opening balance of month N+1. The calculator folds over the input in
//! the order given and never sorts, splits, or parallelises it.
//!
//! Per month:
//!   gross_excess = max(produced − target, 0)
//!   bank_add     = max(target − produced, 0), or 0 in a cooling month
//!   available    = opening + bank_add
//!   bank_pull    = min(gross_excess, available, limit) when both are > 0,
//!                  limit = month override → snapshot limit → gross_excess
//!   closing      = available − bank_pull
//!
//! The calculator never fails: inputs are validated upstream, and for
//! non-negative inputs every output is non-negative.

use crate::{
    calendar,
    period::MonthlyAggregate,
    snapshot::{non_zero, ContractSnapshot},
    types::{Hours, Qty, Rate},
};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MonthlyLedgerLine {
    pub month_start:              NaiveDate,
    pub month_label:              String,
    pub target:                   Qty,
    pub produced:                 Qty,
    pub opening_bank:             Qty,
    pub bank_add:                 Qty,
    pub bank_pull:                Qty,
    pub closing_bank:             Qty,
    pub gross_excess:             Qty,
    pub excess_after_bank:        Qty,
    /// Pull ceiling in effect; `None` means only excess and balance cap the pull.
    pub pull_limit:               Option<Qty>,
    pub ngt_hours:                Hours,
    pub ngt_qty:                  Qty,
    pub waveoff_chargeable_hours: Hours,
    pub cooling_flag:             bool,
    pub prime_rate:               Rate,
    pub optimize_rate:            Rate,
    pub ngt_rate:                 Rate,
    pub excess_rate:              Rate,
}

impl MonthlyLedgerLine {
    /// Ceiling that bounded this month's pull.
    pub fn effective_pull_limit(&self) -> Qty {
        self.pull_limit.unwrap_or(self.gross_excess)
    }
}

pub struct BankWaterfall<'a> {
    snapshot: &'a ContractSnapshot,
}

impl<'a> BankWaterfall<'a> {
    pub fn new(snapshot: &'a ContractSnapshot) -> Self {
        Self { snapshot }
    }

    /// Build the full ordered line set from `opening_bank`.
    /// Identical inputs always produce identical lines.
    pub fn run(&self, opening_bank: Qty, months: &[MonthlyAggregate]) -> Vec<MonthlyLedgerLine> {
        months
            .iter()
            .scan(opening_bank, |running_bank, month| {
                let line = self.line_for(*running_bank, month);
                *running_bank = line.closing_bank;
                Some(line)
            })
            .collect()
    }

    fn line_for(&self, opening_bank: Qty, m: &MonthlyAggregate) -> MonthlyLedgerLine {
        let gross_excess = m.gross_excess();
        let bank_add = if m.cooling_flag {
            Decimal::ZERO
        } else {
            m.shortfall()
        };
        let available_bank = opening_bank + bank_add;

        let pull_limit = m
            .bank_pull_limit_override
            .and_then(non_zero)
            .or_else(|| self.snapshot.bank_pull_limit());

        let bank_pull = if gross_excess > Decimal::ZERO && available_bank > Decimal::ZERO {
            let limit = pull_limit.unwrap_or(gross_excess);
            gross_excess.min(available_bank).min(limit)
        } else {
            Decimal::ZERO
        };

        let rates = &m.rate_overrides;
        MonthlyLedgerLine {
            month_start: m.month_start,
            month_label: calendar::month_label(m.month_start),
            target: m.target,
            produced: m.produced,
            opening_bank,
            bank_add,
            bank_pull,
            closing_bank: available_bank - bank_pull,
            gross_excess,
            excess_after_bank: gross_excess - bank_pull,
            pull_limit,
            ngt_hours: m.ngt_hours,
            ngt_qty: m.ngt_qty,
            waveoff_chargeable_hours: m.waveoff_chargeable_hours,
            cooling_flag: m.cooling_flag,
            prime_rate: rate_or(rates.prime, self.snapshot.prime_rate),
            optimize_rate: rate_or(rates.optimize, self.snapshot.optimize_rate),
            ngt_rate: rate_or(rates.ngt, self.snapshot.ngt_rate),
            excess_rate: rate_or(rates.excess, self.snapshot.excess_rate),
        }
    }
}

fn rate_or(month_rate: Option<Rate>, snapshot_rate: Rate) -> Rate {
    month_rate.and_then(non_zero).unwrap_or(snapshot_rate)
}
