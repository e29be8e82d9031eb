//! Annual totals: a pure reduction over a reconciliation's ledger lines.

use crate::{
    error::{ReconError, ReconResult},
    types::{Hours, Qty},
    waterfall::MonthlyLedgerLine,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AnnualTotals {
    pub annual_target:       Qty,
    pub annual_actual:       Qty,
    pub opening_bank:        Qty,
    pub bank_added_total:    Qty,
    pub bank_pulled_total:   Qty,
    pub closing_bank:        Qty,
    pub excess_total:        Qty,
    pub ngt_total_qty:       Qty,
    pub waveoff_total_hours: Hours,
}

impl AnnualTotals {
    /// Sum the lines. With no lines the annual target is `monthly_mgq × 12`.
    pub fn from_lines(opening_bank: Qty, monthly_mgq: Qty, lines: &[MonthlyLedgerLine]) -> Self {
        let sum = |f: fn(&MonthlyLedgerLine) -> Decimal| lines.iter().map(f).sum::<Decimal>();

        let annual_target = if lines.is_empty() {
            monthly_mgq * Decimal::from(12)
        } else {
            sum(|l| l.target)
        };
        let bank_added_total = sum(|l| l.bank_add);
        let bank_pulled_total = sum(|l| l.bank_pull);

        Self {
            annual_target,
            annual_actual: sum(|l| l.produced),
            opening_bank,
            bank_added_total,
            bank_pulled_total,
            closing_bank: opening_bank + bank_added_total - bank_pulled_total,
            excess_total: sum(|l| l.excess_after_bank),
            ngt_total_qty: sum(|l| l.ngt_qty),
            waveoff_total_hours: sum(|l| l.waveoff_chargeable_hours),
        }
    }

    /// Bank conservation: the independently summed closing balance must
    /// equal the last line's running closing balance.
    pub fn verify_against(&self, lines: &[MonthlyLedgerLine]) -> ReconResult<()> {
        let actual = lines
            .last()
            .map(|l| l.closing_bank)
            .unwrap_or(self.opening_bank);
        if actual != self.closing_bank {
            return Err(ReconError::BankConservationViolated {
                expected: self.closing_bank,
                actual,
            });
        }
        Ok(())
    }
}
