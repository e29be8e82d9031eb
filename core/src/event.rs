//! Reconciliation event log.
//!
//! RULE: Every state transition of a reconciliation is recorded here.
//! Forfeit and rollover notes live in this log; they produce no invoice.

use crate::{
    policy::{SettlementAction, SettlementPolicy},
    types::{InvoiceRef, Qty, ReconciliationId},
};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Variants are only ever appended.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReconEvent {
    ReconciliationOpened {
        reconciliation_id: ReconciliationId,
        contract_id:       String,
        fiscal_year_start: NaiveDate,
        fiscal_year_end:   NaiveDate,
        opening_bank:      Qty,
    },
    LinesRegenerated {
        reconciliation_id: ReconciliationId,
        version:           u32,
        snapshot_version:  String,
        line_count:        usize,
        closing_bank:      Qty,
    },
    PolicyApplied {
        reconciliation_id: ReconciliationId,
        policy:            SettlementPolicy,
        action:            SettlementAction,
    },
    InvoiceEmitted {
        reconciliation_id: ReconciliationId,
        invoice_ref:       InvoiceRef,
        quantity:          Qty,
    },
    BankForfeited {
        reconciliation_id: ReconciliationId,
        amount:            Qty,
    },
    BankRolledOver {
        reconciliation_id: ReconciliationId,
        amount:            Qty,
    },
    NextYearOpened {
        reconciliation_id: ReconciliationId,
        previous_id:       ReconciliationId,
        opening_bank:      Qty,
    },
}

impl ReconEvent {
    pub fn reconciliation_id(&self) -> &str {
        match self {
            Self::ReconciliationOpened { reconciliation_id, .. }
            | Self::LinesRegenerated { reconciliation_id, .. }
            | Self::PolicyApplied { reconciliation_id, .. }
            | Self::InvoiceEmitted { reconciliation_id, .. }
            | Self::BankForfeited { reconciliation_id, .. }
            | Self::BankRolledOver { reconciliation_id, .. }
            | Self::NextYearOpened { reconciliation_id, .. } => reconciliation_id,
        }
    }

    /// Stable name for the event_type column.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::ReconciliationOpened { .. } => "reconciliation_opened",
            Self::LinesRegenerated { .. }     => "lines_regenerated",
            Self::PolicyApplied { .. }        => "policy_applied",
            Self::InvoiceEmitted { .. }       => "invoice_emitted",
            Self::BankForfeited { .. }        => "bank_forfeited",
            Self::BankRolledOver { .. }       => "bank_rolled_over",
            Self::NextYearOpened { .. }       => "next_year_opened",
        }
    }
}

/// A persisted event log row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventLogEntry {
    pub id:                Option<i64>,
    pub reconciliation_id: ReconciliationId,
    pub event_type:        String,
    pub payload:           String,
    pub created_at:        NaiveDateTime,
}
