//! Reconciliation: one contract, one fiscal window.
//!
//! Owns its snapshot and its ordered ledger lines exclusively. Lines are
//! never patched: every regeneration discards the whole set and builds a
//! new one, and only commits it once the conservation check passes.

use crate::{
    error::{ReconError, ReconResult},
    period::{validate_sequence, MonthlyAggregate, MonthlyWorkRecord, PeriodAggregator, ProductionEvent},
    policy::{SettlementAction, SettlementPolicy},
    snapshot::{ContractSnapshot, ContractTerms},
    totals::AnnualTotals,
    types::{ContractId, InvoiceRef, Qty, ReconciliationId},
    waterfall::{BankWaterfall, MonthlyLedgerLine},
};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReconState {
    Draft,
    InProgress,
    Closed,
}

impl ReconState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft      => "draft",
            Self::InProgress => "in_progress",
            Self::Closed     => "closed",
        }
    }
}

impl fmt::Display for ReconState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReconState {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft"       => Ok(Self::Draft),
            "in_progress" => Ok(Self::InProgress),
            "closed"      => Ok(Self::Closed),
            other => Err(anyhow::anyhow!("Unknown reconciliation state: {other}")),
        }
    }
}

/// The settlement artifact linked to a reconciliation. Its presence is the
/// double-settlement guard.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SettlementRecord {
    pub action:      SettlementAction,
    pub invoice_ref: Option<InvoiceRef>,
    pub settled_at:  NaiveDateTime,
}

/// Switches that shape a generation run.
#[derive(Debug, Clone, Copy, Default)]
pub struct GenerationOptions {
    pub derive_ngt_factor:       bool,
    pub require_bank_pull_limit: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Reconciliation {
    pub id:                ReconciliationId,
    pub contract_id:       ContractId,
    pub fiscal_year_start: NaiveDate,
    pub fiscal_year_end:   NaiveDate,
    pub opening_bank:      Qty,
    pub policy:            Option<SettlementPolicy>,
    pub state:             ReconState,
    pub version:           u32,
    pub regenerated_at:    Option<NaiveDateTime>,
    pub snapshot:          ContractSnapshot,
    pub lines:             Vec<MonthlyLedgerLine>,
    pub totals:            AnnualTotals,
    /// Stored closing bank; equals `totals.closing_bank` until a forfeit resets it.
    pub closing_bank:      Qty,
    pub settlement:        Option<SettlementRecord>,
}

impl Reconciliation {
    /// Open a draft reconciliation and take the first contract snapshot.
    pub fn open(
        id: ReconciliationId,
        terms: &ContractTerms,
        fiscal_year_start: NaiveDate,
        fiscal_year_end: NaiveDate,
        opening_bank: Qty,
        policy: Option<SettlementPolicy>,
    ) -> ReconResult<Self> {
        if fiscal_year_end < fiscal_year_start {
            return Err(ReconError::InvalidFiscalWindow {
                start: fiscal_year_start,
                end:   fiscal_year_end,
            });
        }
        let snapshot = ContractSnapshot::capture(terms);
        let totals = AnnualTotals::from_lines(opening_bank, snapshot.monthly_mgq, &[]);
        Ok(Self {
            id,
            contract_id: terms.contract_id.clone(),
            fiscal_year_start,
            fiscal_year_end,
            opening_bank,
            policy,
            state: ReconState::Draft,
            version: 1,
            regenerated_at: None,
            closing_bank: totals.closing_bank,
            snapshot,
            lines: Vec::new(),
            totals,
            settlement: None,
        })
    }

    pub fn is_settled(&self) -> bool {
        self.settlement.is_some()
    }

    /// Re-snapshot `terms`, aggregate the raw records and rebuild every line.
    pub fn regenerate(
        &mut self,
        terms: &ContractTerms,
        work_records: &[MonthlyWorkRecord],
        events: &[ProductionEvent],
        options: GenerationOptions,
        at: NaiveDateTime,
    ) -> ReconResult<()> {
        self.ensure_open()?;
        let snapshot = ContractSnapshot::capture(terms);
        let months = PeriodAggregator::new(&snapshot)
            .derive_ngt_factor(options.derive_ngt_factor)
            .aggregate(
                &self.contract_id,
                self.fiscal_year_start,
                self.fiscal_year_end,
                work_records,
                events,
            )?;
        self.rebuild(snapshot, &months, options, at)
    }

    /// Rebuild from already aggregated months (the external-aggregator path).
    /// Nothing on `self` changes unless the whole rebuild succeeds.
    pub fn rebuild(
        &mut self,
        snapshot: ContractSnapshot,
        months: &[MonthlyAggregate],
        options: GenerationOptions,
        at: NaiveDateTime,
    ) -> ReconResult<()> {
        self.ensure_open()?;
        if options.require_bank_pull_limit && snapshot.bank_pull_limit().is_none() {
            return Err(ReconError::MissingBankPullLimit {
                contract_id: self.contract_id.clone(),
            });
        }
        validate_sequence(months)?;

        let lines = BankWaterfall::new(&snapshot).run(self.opening_bank, months);
        let totals = AnnualTotals::from_lines(self.opening_bank, snapshot.monthly_mgq, &lines);
        totals.verify_against(&lines)?;

        self.closing_bank = totals.closing_bank;
        self.snapshot = snapshot;
        self.lines = lines;
        self.totals = totals;
        self.version += 1;
        self.regenerated_at = Some(at);
        self.state = ReconState::InProgress;
        Ok(())
    }

    /// Record the settlement and close. Call only with an action produced
    /// by `policy::resolve` for this reconciliation.
    pub fn apply_settlement(
        &mut self,
        action: SettlementAction,
        invoice_ref: Option<InvoiceRef>,
        at: NaiveDateTime,
    ) {
        self.closing_bank = action.remaining_bank(self.closing_bank);
        self.settlement = Some(SettlementRecord {
            action,
            invoice_ref,
            settled_at: at,
        });
        self.state = ReconState::Closed;
    }

    fn ensure_open(&self) -> ReconResult<()> {
        if self.state == ReconState::Closed {
            return Err(ReconError::ReconciliationClosed { id: self.id.clone() });
        }
        Ok(())
    }
}
