use crate::types::{Qty, ReconciliationId};
use chrono::NaiveDate;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReconError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // ── Configuration ─────────────────────────────────────────────
    #[error("Policy must be selected before settlement")]
    NoPolicySelected,

    #[error("Contract '{contract_id}' has no billable product configured")]
    MissingContractProduct { contract_id: String },

    #[error("Contract '{contract_id}' has no bank pull limit but the configuration requires one")]
    MissingBankPullLimit { contract_id: String },

    // ── Preconditions ─────────────────────────────────────────────
    #[error("Reconciliation '{id}' has no generated monthly lines")]
    NoLinesGenerated { id: ReconciliationId },

    #[error("Nothing to bill: closing bank is {quantity}")]
    NothingToBill { quantity: Qty },

    #[error("Reconciliation '{id}' is closed")]
    ReconciliationClosed { id: ReconciliationId },

    #[error("Monthly figures out of order: {month} follows {previous}")]
    MonthsOutOfOrder { previous: NaiveDate, month: NaiveDate },

    #[error("Monthly figures for {month} appear more than once")]
    DuplicateMonth { month: NaiveDate },

    #[error("Monthly figures must start on the first of a month, got {month}")]
    MonthNotAligned { month: NaiveDate },

    #[error("Invalid fiscal window: {start} .. {end}")]
    InvalidFiscalWindow { start: NaiveDate, end: NaiveDate },

    #[error("Reconciliation '{id}' was not settled by rollover")]
    RolloverRequired { id: ReconciliationId },

    // ── Conflicts ─────────────────────────────────────────────────
    #[error("Reconciliation '{id}' is already settled (invoice: {invoice_ref:?})")]
    AlreadySettled {
        id: ReconciliationId,
        invoice_ref: Option<String>,
    },

    #[error("Contract '{contract_id}' already has open reconciliation '{existing}' for an overlapping window")]
    OverlappingReconciliation {
        contract_id: String,
        existing: ReconciliationId,
    },

    // ── Data quality ──────────────────────────────────────────────
    #[error("Negative {field} ({value}) for month {month}")]
    NegativeQuantity {
        month: NaiveDate,
        field: &'static str,
        value: Qty,
    },

    #[error("Bank conservation violated: totals give {expected}, last line closes at {actual}")]
    BankConservationViolated { expected: Qty, actual: Qty },

    #[error("Reconciliation '{id}' not found")]
    ReconciliationNotFound { id: ReconciliationId },

    #[error("Billing collaborator failed: {0}")]
    Billing(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type ReconResult<T> = Result<T, ReconError>;
