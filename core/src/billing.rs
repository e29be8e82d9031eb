//! Monthly billing summary: the per-month quantities a monthly invoice
//! is built from, split into cooling and normal buckets.
//!
//! Optimized standby is the unproduced part of the MGQ after downtime
//! relief: max(target − ngt_qty − produced, 0). Cooling months carry no
//! standby.

use crate::{
    calendar,
    error::{ReconError, ReconResult},
    invoice::InvoiceLineRequest,
    period::MonthlyAggregate,
    snapshot::{non_zero, ContractSnapshot},
    types::{Hours, Qty, Rate},
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BillingBucket {
    pub target_qty:               Qty,
    pub prime_output_qty:         Qty,
    pub standby_qty:              Qty,
    pub ngt_qty:                  Qty,
    pub ngt_hours:                Hours,
    pub waveoff_applied_hours:    Hours,
    pub waveoff_chargeable_hours: Hours,
}

impl BillingBucket {
    fn add(&mut self, m: &MonthlyAggregate) {
        self.target_qty += m.target;
        self.prime_output_qty += m.produced;
        self.standby_qty += optimized_standby(m);
        self.ngt_qty += m.ngt_qty;
        self.ngt_hours += m.ngt_hours;
        self.waveoff_applied_hours += m.waveoff_applied_hours;
        self.waveoff_chargeable_hours += m.waveoff_chargeable_hours;
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MonthlyBillingSummary {
    pub cooling: BillingBucket,
    pub normal:  BillingBucket,
}

impl MonthlyBillingSummary {
    pub fn from_months(months: &[MonthlyAggregate]) -> Self {
        let mut summary = Self::default();
        for m in months {
            if m.cooling_flag {
                summary.cooling.add(m);
            } else {
                summary.normal.add(m);
            }
        }
        summary
    }

    pub fn prime_output_qty(&self) -> Qty {
        self.cooling.prime_output_qty + self.normal.prime_output_qty
    }

    pub fn standby_qty(&self) -> Qty {
        self.normal.standby_qty
    }

    pub fn ngt_qty(&self) -> Qty {
        self.cooling.ngt_qty + self.normal.ngt_qty
    }
}

pub fn optimized_standby(m: &MonthlyAggregate) -> Qty {
    if m.cooling_flag {
        return Decimal::ZERO;
    }
    (m.target - m.ngt_qty - m.produced).max(Decimal::ZERO)
}

/// Line requests for one month's invoice: prime output, MGQ shortfall
/// adjustment and NGT relief, each only when its quantity is positive.
pub fn monthly_invoice_lines(
    contract_id: &str,
    snapshot: &ContractSnapshot,
    month: &MonthlyAggregate,
) -> ReconResult<Vec<InvoiceLineRequest>> {
    let summary = MonthlyBillingSummary::from_months(std::slice::from_ref(month));
    let prime = summary.prime_output_qty();
    let standby = summary.standby_qty();
    let ngt = summary.ngt_qty();

    if prime <= Decimal::ZERO && standby <= Decimal::ZERO && ngt <= Decimal::ZERO {
        return Err(ReconError::NothingToBill { quantity: Decimal::ZERO });
    }

    let period = format!(
        "{} - {}",
        month.month_start,
        calendar::month_end(month.month_start)
    );
    let rates = &month.rate_overrides;
    let line = |quantity: Qty, unit_rate: Rate, label: String| InvoiceLineRequest {
        contract_id:     contract_id.to_string(),
        origin:          calendar::month_label(month.month_start),
        product_code:    snapshot.product_code.clone(),
        quantity,
        unit_rate,
        reference_label: label,
    };

    let mut lines = Vec::new();
    if prime > Decimal::ZERO {
        let rate = rates.prime.and_then(non_zero).unwrap_or(snapshot.prime_rate);
        lines.push(line(prime, rate, format!("Prime Output for {period}")));
    }
    if standby > Decimal::ZERO {
        let rate = rates.optimize.and_then(non_zero).unwrap_or(snapshot.optimize_rate);
        lines.push(line(standby, rate, format!("MGQ Shortfall Adjustment ({period})")));
    }
    if ngt > Decimal::ZERO {
        let rate = rates.ngt.and_then(non_zero).unwrap_or(snapshot.ngt_rate);
        lines.push(line(ngt, rate, format!("NGT Relief ({period})")));
    }
    Ok(lines)
}
