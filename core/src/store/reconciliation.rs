use super::{
    dec_col, dec_text, insert_events, invoice::insert_invoice_request, opt_dec_col, opt_dec_text,
    ReconStore,
};
use crate::{
    error::{ReconError, ReconResult},
    event::EventLogEntry,
    invoice::InvoiceLineRequest,
    reconciliation::{Reconciliation, ReconState, SettlementRecord},
    policy::SettlementPolicy,
    snapshot::ContractSnapshot,
    totals::AnnualTotals,
    types::ReconciliationId,
    waterfall::MonthlyLedgerLine,
};
use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::{params, Connection, OptionalExtension};
use rust_decimal::Decimal;

/// Header columns as stored, before domain parsing.
struct HeaderRow {
    reconciliation_id: String,
    contract_id:       String,
    fiscal_year_start: NaiveDate,
    fiscal_year_end:   NaiveDate,
    opening_bank:      Decimal,
    policy:            Option<String>,
    state:             String,
    version:           i64,
    regenerated_at:    Option<NaiveDateTime>,
    snapshot_json:     String,
    closing_bank:      Decimal,
    settlement_json:   Option<String>,
}

// Each write that moves a reconciliation forward runs in one transaction
// with the event log entries recording it.
impl ReconStore {
    /// Insert a newly opened reconciliation, any lines it has and `events`.
    pub fn insert_reconciliation(
        &self,
        recon: &Reconciliation,
        events: &[EventLogEntry],
    ) -> ReconResult<()> {
        self.replace_ledger_lines(recon, events)
    }

    /// Update only the header (policy, state, settlement, closing bank).
    pub fn update_reconciliation(&self, recon: &Reconciliation) -> ReconResult<()> {
        upsert_header(&self.conn, recon)
    }

    /// Persist a regeneration: header plus the full line set, swapped in
    /// one transaction so readers never see a half-rebuilt ledger.
    pub fn replace_ledger_lines(
        &self,
        recon: &Reconciliation,
        events: &[EventLogEntry],
    ) -> ReconResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        upsert_header(&tx, recon)?;
        write_lines(&tx, recon)?;
        insert_events(&tx, events)?;
        tx.commit()?;
        Ok(())
    }

    /// Persist a settled header with its events and, for a locally filed
    /// bill, the invoice request row.
    pub fn settle_reconciliation(
        &self,
        recon: &Reconciliation,
        events: &[EventLogEntry],
        filed_request: Option<(&str, &InvoiceLineRequest)>,
    ) -> ReconResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        upsert_header(&tx, recon)?;
        if let Some((invoice_ref, request)) = filed_request {
            insert_invoice_request(&tx, invoice_ref, request)?;
        }
        insert_events(&tx, events)?;
        tx.commit()?;
        Ok(())
    }

    pub fn load_reconciliation(&self, id: &str) -> ReconResult<Reconciliation> {
        let header = self
            .conn
            .query_row(
                "SELECT reconciliation_id, contract_id, fiscal_year_start, fiscal_year_end,
                        opening_bank, policy, state, version, regenerated_at,
                        snapshot_json, closing_bank, settlement_json
                 FROM reconciliation WHERE reconciliation_id = ?1",
                params![id],
                |row| {
                    Ok(HeaderRow {
                        reconciliation_id: row.get(0)?,
                        contract_id:       row.get(1)?,
                        fiscal_year_start: row.get(2)?,
                        fiscal_year_end:   row.get(3)?,
                        opening_bank:      dec_col(row, 4)?,
                        policy:            row.get(5)?,
                        state:             row.get(6)?,
                        version:           row.get(7)?,
                        regenerated_at:    row.get(8)?,
                        snapshot_json:     row.get(9)?,
                        closing_bank:      dec_col(row, 10)?,
                        settlement_json:   row.get(11)?,
                    })
                },
            )
            .optional()?
            .ok_or_else(|| ReconError::ReconciliationNotFound { id: id.to_string() })?;

        let lines = self.ledger_lines(id)?;
        let snapshot: ContractSnapshot = serde_json::from_str(&header.snapshot_json)?;
        let settlement: Option<SettlementRecord> = header
            .settlement_json
            .as_deref()
            .map(|json| serde_json::from_str(json))
            .transpose()?;
        let policy = header
            .policy
            .as_deref()
            .map(str::parse::<SettlementPolicy>)
            .transpose()?;
        let totals = AnnualTotals::from_lines(header.opening_bank, snapshot.monthly_mgq, &lines);

        Ok(Reconciliation {
            id:                header.reconciliation_id,
            contract_id:       header.contract_id,
            fiscal_year_start: header.fiscal_year_start,
            fiscal_year_end:   header.fiscal_year_end,
            opening_bank:      header.opening_bank,
            policy,
            state:             header.state.parse::<ReconState>()?,
            version:           header.version as u32,
            regenerated_at:    header.regenerated_at,
            snapshot,
            lines,
            totals,
            closing_bank:      header.closing_bank,
            settlement,
        })
    }

    /// Lines of a reconciliation in chronological order.
    pub fn ledger_lines(&self, reconciliation_id: &str) -> ReconResult<Vec<MonthlyLedgerLine>> {
        let mut stmt = self.conn.prepare(
            "SELECT month_start, month_label, target, produced, opening_bank, bank_add,
                    bank_pull, closing_bank, gross_excess, excess_after_bank, pull_limit,
                    ngt_hours, ngt_qty, waveoff_chargeable_hours, cooling_flag,
                    prime_rate, optimize_rate, ngt_rate, excess_rate
             FROM ledger_line WHERE reconciliation_id = ?1
             ORDER BY month_start ASC, seq ASC",
        )?;
        let rows = stmt
            .query_map(params![reconciliation_id], |row| {
                Ok(MonthlyLedgerLine {
                    month_start:              row.get(0)?,
                    month_label:              row.get(1)?,
                    target:                   dec_col(row, 2)?,
                    produced:                 dec_col(row, 3)?,
                    opening_bank:             dec_col(row, 4)?,
                    bank_add:                 dec_col(row, 5)?,
                    bank_pull:                dec_col(row, 6)?,
                    closing_bank:             dec_col(row, 7)?,
                    gross_excess:             dec_col(row, 8)?,
                    excess_after_bank:        dec_col(row, 9)?,
                    pull_limit:               opt_dec_col(row, 10)?,
                    ngt_hours:                dec_col(row, 11)?,
                    ngt_qty:                  dec_col(row, 12)?,
                    waveoff_chargeable_hours: dec_col(row, 13)?,
                    cooling_flag:             row.get::<_, i32>(14)? != 0,
                    prime_rate:               dec_col(row, 15)?,
                    optimize_rate:            dec_col(row, 16)?,
                    ngt_rate:                 dec_col(row, 17)?,
                    excess_rate:              dec_col(row, 18)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn ledger_line_count(&self, reconciliation_id: &str) -> ReconResult<i64> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM ledger_line WHERE reconciliation_id = ?1",
            params![reconciliation_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Non-closed reconciliations of `contract_id` whose window overlaps
    /// `[start, end]`.
    pub fn open_reconciliations_overlapping(
        &self,
        contract_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> ReconResult<Vec<ReconciliationId>> {
        let mut stmt = self.conn.prepare(
            "SELECT reconciliation_id FROM reconciliation
             WHERE contract_id = ?1 AND state != 'closed'
               AND fiscal_year_start <= ?3 AND ?2 <= fiscal_year_end
             ORDER BY fiscal_year_start ASC",
        )?;
        let ids = stmt
            .query_map(params![contract_id, start, end], |row| row.get(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }
}

fn upsert_header(conn: &Connection, recon: &Reconciliation) -> ReconResult<()> {
    let snapshot_json = serde_json::to_string(&recon.snapshot)?;
    let settlement_json = recon
        .settlement
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;
    let invoice_ref = recon
        .settlement
        .as_ref()
        .and_then(|s| s.invoice_ref.clone());

    conn.execute(
        "INSERT INTO reconciliation (
            reconciliation_id, contract_id, fiscal_year_start, fiscal_year_end,
            opening_bank, policy, state, version, regenerated_at, snapshot_json,
            closing_bank, settlement_json, invoice_ref
        ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13)
        ON CONFLICT(reconciliation_id) DO UPDATE SET
            opening_bank    = excluded.opening_bank,
            policy          = excluded.policy,
            state           = excluded.state,
            version         = excluded.version,
            regenerated_at  = excluded.regenerated_at,
            snapshot_json   = excluded.snapshot_json,
            closing_bank    = excluded.closing_bank,
            settlement_json = excluded.settlement_json,
            invoice_ref     = excluded.invoice_ref",
        params![
            recon.id,
            recon.contract_id,
            recon.fiscal_year_start,
            recon.fiscal_year_end,
            dec_text(recon.opening_bank),
            recon.policy.map(|p| p.as_str()),
            recon.state.as_str(),
            recon.version as i64,
            recon.regenerated_at,
            snapshot_json,
            dec_text(recon.closing_bank),
            settlement_json,
            invoice_ref,
        ],
    )?;
    Ok(())
}

fn write_lines(conn: &Connection, recon: &Reconciliation) -> ReconResult<()> {
    conn.execute(
        "DELETE FROM ledger_line WHERE reconciliation_id = ?1",
        params![recon.id],
    )?;
    let mut stmt = conn.prepare(
        "INSERT INTO ledger_line (
            reconciliation_id, month_start, seq, month_label, target, produced,
            opening_bank, bank_add, bank_pull, closing_bank, gross_excess,
            excess_after_bank, pull_limit, ngt_hours, ngt_qty,
            waveoff_chargeable_hours, cooling_flag, prime_rate, optimize_rate,
            ngt_rate, excess_rate
        ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18,?19,?20,?21)",
    )?;
    for (seq, line) in recon.lines.iter().enumerate() {
        stmt.execute(params![
            recon.id,
            line.month_start,
            seq as i64,
            line.month_label,
            dec_text(line.target),
            dec_text(line.produced),
            dec_text(line.opening_bank),
            dec_text(line.bank_add),
            dec_text(line.bank_pull),
            dec_text(line.closing_bank),
            dec_text(line.gross_excess),
            dec_text(line.excess_after_bank),
            opt_dec_text(line.pull_limit),
            dec_text(line.ngt_hours),
            dec_text(line.ngt_qty),
            dec_text(line.waveoff_chargeable_hours),
            if line.cooling_flag { 1 } else { 0 },
            dec_text(line.prime_rate),
            dec_text(line.optimize_rate),
            dec_text(line.ngt_rate),
            dec_text(line.excess_rate),
        ])?;
    }
    Ok(())
}
