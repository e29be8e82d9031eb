//! Policy resolver: decides what happens to a fiscal year's remaining
//! bank balance.
//!
//! Resolution is a one-time transition guarded by the reconciliation's
//! settlement record. Every precondition is checked before anything is
//! mutated; applying the resulting action is the caller's job
//! (`Reconciliation::apply_settlement`).

use crate::{
    error::{ReconError, ReconResult},
    reconciliation::Reconciliation,
    types::{Qty, Rate},
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SettlementPolicy {
    /// Invoice the remaining bank to the customer.
    BillNow,
    /// Drop the remaining bank; the customer owes nothing for it.
    Forfeit,
    /// Carry the remaining bank into next year's opening balance.
    Rollover,
}

impl SettlementPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BillNow  => "bill_now",
            Self::Forfeit  => "forfeit",
            Self::Rollover => "rollover",
        }
    }
}

impl fmt::Display for SettlementPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SettlementPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bill_now" => Ok(Self::BillNow),
            "forfeit"  => Ok(Self::Forfeit),
            "rollover" => Ok(Self::Rollover),
            other => Err(anyhow::anyhow!("Unknown settlement policy: {other}")),
        }
    }
}

/// Outcome of applying a policy to the final bank balance.
/// `quantity` is what gets billed, or the balance left after settlement.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SettlementAction {
    Bill { quantity: Qty, rate: Rate },
    Forfeit { quantity: Qty, forfeited: Qty },
    Rollover { quantity: Qty },
}

impl SettlementAction {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Bill { .. }     => "bill",
            Self::Forfeit { .. }  => "forfeit",
            Self::Rollover { .. } => "rollover",
        }
    }

    pub fn quantity(&self) -> Qty {
        match self {
            Self::Bill { quantity, .. }
            | Self::Forfeit { quantity, .. }
            | Self::Rollover { quantity } => *quantity,
        }
    }

    pub fn rate(&self) -> Option<Rate> {
        match self {
            Self::Bill { rate, .. } => Some(*rate),
            _ => None,
        }
    }

    /// Bank balance the reconciliation keeps once this action is applied.
    pub fn remaining_bank(&self, closing_bank: Qty) -> Qty {
        match self {
            Self::Forfeit { .. } => Decimal::ZERO,
            Self::Bill { .. } | Self::Rollover { .. } => closing_bank,
        }
    }
}

/// Produce the single settlement action for `recon`'s selected policy.
pub fn resolve(recon: &Reconciliation) -> ReconResult<SettlementAction> {
    if let Some(settled) = &recon.settlement {
        return Err(ReconError::AlreadySettled {
            id:          recon.id.clone(),
            invoice_ref: settled.invoice_ref.clone(),
        });
    }
    let policy = recon.policy.ok_or(ReconError::NoPolicySelected)?;
    if recon.lines.is_empty() {
        return Err(ReconError::NoLinesGenerated { id: recon.id.clone() });
    }

    let closing = recon.closing_bank;
    let action = match policy {
        SettlementPolicy::BillNow => {
            if closing <= Decimal::ZERO {
                return Err(ReconError::NothingToBill { quantity: closing });
            }
            if recon.snapshot.product_code.is_none() {
                return Err(ReconError::MissingContractProduct {
                    contract_id: recon.contract_id.clone(),
                });
            }
            SettlementAction::Bill {
                quantity: closing,
                rate:     recon.snapshot.settlement_rate(),
            }
        }
        SettlementPolicy::Forfeit => SettlementAction::Forfeit {
            quantity:  Decimal::ZERO,
            forfeited: closing,
        },
        SettlementPolicy::Rollover => SettlementAction::Rollover { quantity: closing },
    };
    Ok(action)
}
