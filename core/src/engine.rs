//! The reconciliation engine: orchestrates snapshot, aggregation,
//! waterfall, totals and settlement against the store.
//!
//! OPERATION ORDER for one contract year (never reordered):
//!   1. open_reconciliation   (draft, first snapshot)
//!   2. regenerate            (any number of times while not closed)
//!   3. settle                (exactly once; closes the reconciliation)
//!   4. open_next_year        (only after a rollover settlement)
//!
//! RULES:
//!   - The engine never issues SQL; it calls ReconStore.
//!   - Every state transition is recorded in the event log.
//!   - Each transition reaches the store in one call, which writes the
//!     reconciliation and its events in a single transaction: nothing is
//!     persisted unless the whole operation succeeded.
//!   - Callers serialize calls per reconciliation; the engine holds no lock.

use crate::{
    calendar,
    clock::{Clock, ManualClock, SystemClock},
    config::ReconConfig,
    error::{ReconError, ReconResult},
    event::{EventLogEntry, ReconEvent},
    invoice::{BillingCollaborator, InvoiceRequestEmitter},
    period::MonthlyAggregate,
    policy::{self, SettlementAction, SettlementPolicy},
    reconciliation::{GenerationOptions, Reconciliation},
    snapshot::{ContractSnapshot, ContractTerms},
    store::{ReconStore, StoreBilling},
    types::Qty,
};
use chrono::{Days, NaiveDate, NaiveDateTime};
use uuid::Uuid;

pub struct ReconEngine {
    store:  ReconStore,
    config: ReconConfig,
    clock:  Box<dyn Clock>,
}

impl ReconEngine {
    pub fn new(store: ReconStore, config: ReconConfig, clock: Box<dyn Clock>) -> Self {
        Self { store, config, clock }
    }

    /// Migrate the store and wire the system clock.
    /// Call this instead of new() in production code.
    pub fn build(store: ReconStore, config: ReconConfig) -> ReconResult<Self> {
        store.migrate()?;
        Ok(Self::new(store, config, Box::new(SystemClock)))
    }

    /// In-memory store, test configuration, clock frozen at `at`.
    pub fn build_test(at: NaiveDateTime) -> ReconResult<Self> {
        let store = ReconStore::in_memory()?;
        store.migrate()?;
        Ok(Self::new(
            store,
            ReconConfig::default_test(),
            Box::new(ManualClock::new(at)),
        ))
    }

    pub fn store(&self) -> &ReconStore {
        &self.store
    }

    pub fn config(&self) -> &ReconConfig {
        &self.config
    }

    pub fn set_clock(&mut self, clock: Box<dyn Clock>) {
        self.clock = clock;
    }

    pub fn reconciliation(&self, id: &str) -> ReconResult<Reconciliation> {
        self.store.load_reconciliation(id)
    }

    pub fn events(&self, id: &str) -> ReconResult<Vec<EventLogEntry>> {
        self.store.events_for_reconciliation(id)
    }

    // ── Lifecycle ──────────────────────────────────────────────

    /// Open a draft reconciliation for `terms` over `[start, end]`.
    /// `policy` falls back to the configured default.
    pub fn open_reconciliation(
        &self,
        terms: &ContractTerms,
        start: NaiveDate,
        end: NaiveDate,
        opening_bank: Qty,
        policy: Option<SettlementPolicy>,
    ) -> ReconResult<Reconciliation> {
        self.open_following(None, terms, start, end, opening_bank, policy)
    }

    /// Re-snapshot `terms`, aggregate the stored records for the window and
    /// replace every ledger line.
    pub fn regenerate(&self, id: &str, terms: &ContractTerms) -> ReconResult<Reconciliation> {
        let mut recon = self.store.load_reconciliation(id)?;
        let work_records = self.store.work_records_in_window(
            &recon.contract_id,
            recon.fiscal_year_start,
            recon.fiscal_year_end,
        )?;
        let events = self.store.production_events_in_window(
            &recon.contract_id,
            recon.fiscal_year_start,
            recon.fiscal_year_end,
        )?;

        recon
            .regenerate(terms, &work_records, &events, self.generation_options(), self.clock.now())
            .map_err(|e| {
                log::warn!("regeneration of {id} rejected: {e}");
                e
            })?;
        self.commit_lines(&recon)?;
        Ok(recon)
    }

    /// Replace the ledger from months aggregated outside the engine.
    pub fn regenerate_from_aggregates(
        &self,
        id: &str,
        terms: &ContractTerms,
        months: &[MonthlyAggregate],
    ) -> ReconResult<Reconciliation> {
        let mut recon = self.store.load_reconciliation(id)?;
        recon
            .rebuild(
                ContractSnapshot::capture(terms),
                months,
                self.generation_options(),
                self.clock.now(),
            )
            .map_err(|e| {
                log::warn!("regeneration of {id} rejected: {e}");
                e
            })?;
        self.commit_lines(&recon)?;
        Ok(recon)
    }

    /// Choose the policy applied at settlement.
    pub fn set_policy(&self, id: &str, policy: SettlementPolicy) -> ReconResult<Reconciliation> {
        let mut recon = self.store.load_reconciliation(id)?;
        if recon.is_settled() {
            return Err(ReconError::ReconciliationClosed { id: recon.id });
        }
        recon.policy = Some(policy);
        self.store.update_reconciliation(&recon)?;
        Ok(recon)
    }

    /// Resolve the selected policy, emit the invoice line for `bill_now`,
    /// and close the reconciliation. A billing failure leaves it open.
    pub fn settle(
        &self,
        id: &str,
        billing: &mut dyn BillingCollaborator,
    ) -> ReconResult<Reconciliation> {
        let mut recon = self.store.load_reconciliation(id)?;
        let action = policy::resolve(&recon).map_err(|e| {
            log::warn!("settlement of {id} rejected: {e}");
            e
        })?;
        let policy = recon.policy.ok_or(ReconError::NoPolicySelected)?;

        let emitter = InvoiceRequestEmitter::new(&self.config.reference_label_template);
        let invoice_ref = emitter.emit(&recon, &action, billing)?;
        let filed = billing.take_local_filing();

        let settled_at = self.clock.now();
        recon.apply_settlement(action.clone(), invoice_ref.clone(), settled_at);

        let mut events = vec![self.entry(&ReconEvent::PolicyApplied {
            reconciliation_id: recon.id.clone(),
            policy,
            action: action.clone(),
        })?];
        let outcome = match (&action, invoice_ref) {
            (SettlementAction::Bill { quantity, .. }, Some(invoice_ref)) => {
                Some(ReconEvent::InvoiceEmitted {
                    reconciliation_id: recon.id.clone(),
                    invoice_ref,
                    quantity: *quantity,
                })
            }
            (SettlementAction::Forfeit { forfeited, .. }, _) => Some(ReconEvent::BankForfeited {
                reconciliation_id: recon.id.clone(),
                amount:            *forfeited,
            }),
            (SettlementAction::Rollover { quantity }, _) => Some(ReconEvent::BankRolledOver {
                reconciliation_id: recon.id.clone(),
                amount:            *quantity,
            }),
            (SettlementAction::Bill { .. }, None) => None,
        };
        if let Some(event) = outcome {
            events.push(self.entry(&event)?);
        }

        self.store.settle_reconciliation(
            &recon,
            &events,
            filed.as_ref().map(|(invoice_ref, request)| (invoice_ref.as_str(), request)),
        )?;

        log::info!(
            "settled {} with {policy}: {} {} (closing bank now {})",
            recon.id,
            action.kind(),
            action.quantity(),
            recon.closing_bank
        );
        Ok(recon)
    }

    /// Settle, filing any invoice request in this engine's own store.
    pub fn settle_with_store_billing(&self, id: &str) -> ReconResult<Reconciliation> {
        let mut billing = StoreBilling::new();
        self.settle(id, &mut billing)
    }

    /// Open the fiscal year following a rollover-settled reconciliation,
    /// carrying its balance in as the opening bank.
    pub fn open_next_year(&self, id: &str, terms: &ContractTerms) -> ReconResult<Reconciliation> {
        let previous = self.store.load_reconciliation(id)?;
        let carried = match previous.settlement.as_ref().map(|s| &s.action) {
            Some(SettlementAction::Rollover { quantity }) => *quantity,
            _ => return Err(ReconError::RolloverRequired { id: previous.id }),
        };
        if terms.contract_id != previous.contract_id {
            return Err(anyhow::anyhow!(
                "terms for '{}' cannot continue reconciliation of '{}'",
                terms.contract_id,
                previous.contract_id
            )
            .into());
        }

        let next_day = previous
            .fiscal_year_end
            .checked_add_days(Days::new(1))
            .ok_or(ReconError::InvalidFiscalWindow {
                start: previous.fiscal_year_start,
                end:   previous.fiscal_year_end,
            })?;
        let (start, end) =
            calendar::fiscal_window_containing(next_day, self.config.fiscal_year_start_month);

        self.open_following(
            Some(previous.id.as_str()),
            terms,
            start,
            end,
            carried,
            previous.policy,
        )
    }

    // ── Internals ──────────────────────────────────────────────

    fn generation_options(&self) -> GenerationOptions {
        GenerationOptions {
            derive_ngt_factor:       self.config.derive_ngt_factor,
            require_bank_pull_limit: self.config.require_bank_pull_limit,
        }
    }

    fn open_following(
        &self,
        previous_id: Option<&str>,
        terms: &ContractTerms,
        start: NaiveDate,
        end: NaiveDate,
        opening_bank: Qty,
        policy: Option<SettlementPolicy>,
    ) -> ReconResult<Reconciliation> {
        let recon = Reconciliation::open(
            Uuid::new_v4().to_string(),
            terms,
            start,
            end,
            opening_bank,
            policy.or(self.config.default_policy),
        )?;

        let overlapping =
            self.store
                .open_reconciliations_overlapping(&terms.contract_id, start, end)?;
        if let Some(existing) = overlapping.into_iter().next() {
            log::warn!(
                "refusing to open {start}..{end} for {}: {existing} is still open",
                terms.contract_id
            );
            return Err(ReconError::OverlappingReconciliation {
                contract_id: terms.contract_id.clone(),
                existing,
            });
        }

        let mut events = vec![self.entry(&ReconEvent::ReconciliationOpened {
            reconciliation_id: recon.id.clone(),
            contract_id:       recon.contract_id.clone(),
            fiscal_year_start: recon.fiscal_year_start,
            fiscal_year_end:   recon.fiscal_year_end,
            opening_bank:      recon.opening_bank,
        })?];
        if let Some(previous_id) = previous_id {
            events.push(self.entry(&ReconEvent::NextYearOpened {
                reconciliation_id: recon.id.clone(),
                previous_id:       previous_id.to_string(),
                opening_bank,
            })?);
        }
        self.store.insert_reconciliation(&recon, &events)?;

        log::info!(
            "opened reconciliation {} for {} ({start}..{end}, opening bank {opening_bank})",
            recon.id,
            recon.contract_id
        );
        Ok(recon)
    }

    fn commit_lines(&self, recon: &Reconciliation) -> ReconResult<()> {
        let regenerated = self.entry(&ReconEvent::LinesRegenerated {
            reconciliation_id: recon.id.clone(),
            version:           recon.version,
            snapshot_version:  recon.snapshot.version_tag.clone(),
            line_count:        recon.lines.len(),
            closing_bank:      recon.closing_bank,
        })?;
        self.store.replace_ledger_lines(recon, &[regenerated])?;
        log::debug!(
            "regenerated {} v{}: {} lines, closing bank {}",
            recon.id,
            recon.version,
            recon.lines.len(),
            recon.closing_bank
        );
        Ok(())
    }

    fn entry(&self, event: &ReconEvent) -> ReconResult<EventLogEntry> {
        Ok(EventLogEntry {
            id:                None,
            reconciliation_id: event.reconciliation_id().to_string(),
            event_type:        event.type_name().to_string(),
            payload:           serde_json::to_string(event)?,
            created_at:        self.clock.now(),
        })
    }
}
