use super::{dec_col, dec_text, opt_dec_col, opt_dec_text, ReconStore};
use crate::{
    calendar,
    error::ReconResult,
    period::{MonthlyWorkRecord, ProductionEvent, RateOverrides},
};
use chrono::NaiveDate;
use rusqlite::{params, Connection};

impl ReconStore {
    /// Load one window's source records for `contract_id`, unless the store
    /// already holds any work record or production event for that contract
    /// inside `[start, end]`. Returns whether the batch was loaded.
    ///
    /// Loading is all or nothing, so replaying the same input is a no-op.
    pub fn import_window(
        &self,
        contract_id: &str,
        start: NaiveDate,
        end: NaiveDate,
        records: &[MonthlyWorkRecord],
        events: &[ProductionEvent],
    ) -> ReconResult<bool> {
        let tx = self.conn.unchecked_transaction()?;
        let existing: i64 = tx.query_row(
            "SELECT (SELECT COUNT(*) FROM monthly_work_record
                     WHERE contract_id = ?1 AND month_start >= ?2 AND month_start <= ?3)
                  + (SELECT COUNT(*) FROM production_event
                     WHERE contract_id = ?1 AND day >= ?4 AND day <= ?3)",
            params![contract_id, calendar::month_start(start), end, start],
            |row| row.get(0),
        )?;
        if existing > 0 {
            return Ok(false);
        }
        for record in records {
            insert_work_record(&tx, record)?;
        }
        for event in events {
            insert_production_event(&tx, event)?;
        }
        tx.commit()?;
        Ok(true)
    }

    // ── Monthly work records ───────────────────────────────────

    pub fn insert_work_record(&self, record: &MonthlyWorkRecord) -> ReconResult<()> {
        insert_work_record(&self.conn, record)
    }

    /// Work records whose month falls inside `[start, end]`, oldest first.
    pub fn work_records_in_window(
        &self,
        contract_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> ReconResult<Vec<MonthlyWorkRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT contract_id, month_start, target, cooling, bank_pull_limit,
                    hourly_conversion_factor, prime_rate, optimize_rate, ngt_rate, excess_rate
             FROM monthly_work_record
             WHERE contract_id = ?1 AND month_start >= ?2 AND month_start <= ?3
             ORDER BY month_start ASC, id ASC",
        )?;
        let records = stmt
            .query_map(
                params![contract_id, calendar::month_start(start), end],
                |row| {
                    Ok(MonthlyWorkRecord {
                        contract_id:              row.get(0)?,
                        month_start:              row.get(1)?,
                        target:                   opt_dec_col(row, 2)?,
                        cooling:                  row.get::<_, i32>(3)? != 0,
                        bank_pull_limit:          opt_dec_col(row, 4)?,
                        hourly_conversion_factor: opt_dec_col(row, 5)?,
                        rates: RateOverrides {
                            prime:    opt_dec_col(row, 6)?,
                            optimize: opt_dec_col(row, 7)?,
                            ngt:      opt_dec_col(row, 8)?,
                            excess:   opt_dec_col(row, 9)?,
                        },
                    })
                },
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    // ── Production events ──────────────────────────────────────

    pub fn insert_production_event(&self, event: &ProductionEvent) -> ReconResult<()> {
        insert_production_event(&self.conn, event)
    }

    /// Production events dated inside `[start, end]`, in day order.
    pub fn production_events_in_window(
        &self,
        contract_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> ReconResult<Vec<ProductionEvent>> {
        let mut stmt = self.conn.prepare(
            "SELECT contract_id, day, prime_output_qty, ngt_hours, loto_hours
             FROM production_event
             WHERE contract_id = ?1 AND day >= ?2 AND day <= ?3
             ORDER BY day ASC, id ASC",
        )?;
        let events = stmt
            .query_map(params![contract_id, start, end], |row| {
                Ok(ProductionEvent {
                    contract_id:      row.get(0)?,
                    day:              row.get(1)?,
                    prime_output_qty: dec_col(row, 2)?,
                    ngt_hours:        dec_col(row, 3)?,
                    loto_hours:       dec_col(row, 4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(events)
    }
}

fn insert_work_record(conn: &Connection, record: &MonthlyWorkRecord) -> ReconResult<()> {
    conn.execute(
        "INSERT INTO monthly_work_record (
            contract_id, month_start, target, cooling, bank_pull_limit,
            hourly_conversion_factor, prime_rate, optimize_rate, ngt_rate, excess_rate
        ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10)",
        params![
            record.contract_id,
            calendar::month_start(record.month_start),
            opt_dec_text(record.target),
            if record.cooling { 1 } else { 0 },
            opt_dec_text(record.bank_pull_limit),
            opt_dec_text(record.hourly_conversion_factor),
            opt_dec_text(record.rates.prime),
            opt_dec_text(record.rates.optimize),
            opt_dec_text(record.rates.ngt),
            opt_dec_text(record.rates.excess),
        ],
    )?;
    Ok(())
}

fn insert_production_event(conn: &Connection, event: &ProductionEvent) -> ReconResult<()> {
    conn.execute(
        "INSERT INTO production_event (contract_id, day, prime_output_qty, ngt_hours, loto_hours)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            event.contract_id,
            event.day,
            dec_text(event.prime_output_qty),
            dec_text(event.ngt_hours),
            dec_text(event.loto_hours),
        ],
    )?;
    Ok(())
}
