use super::{dec_col, dec_text, ReconStore};
use crate::{
    error::ReconResult,
    invoice::{BillingCollaborator, InvoiceLineRequest},
    types::InvoiceRef,
};
use rusqlite::{params, Connection};
use uuid::Uuid;

impl ReconStore {
    /// Requests raised for one reconciliation (its id is the origin).
    pub fn invoice_requests_for(
        &self,
        origin: &str,
    ) -> ReconResult<Vec<(InvoiceRef, InvoiceLineRequest)>> {
        let mut stmt = self.conn.prepare(
            "SELECT invoice_ref, contract_id, origin, product_code, quantity, unit_rate, reference_label
             FROM invoice_request WHERE origin = ?1
             ORDER BY seq ASC",
        )?;
        let rows = stmt
            .query_map(params![origin], |row| {
                Ok((
                    row.get(0)?,
                    InvoiceLineRequest {
                        contract_id:     row.get(1)?,
                        origin:          row.get(2)?,
                        product_code:    row.get(3)?,
                        quantity:        dec_col(row, 4)?,
                        unit_rate:       dec_col(row, 5)?,
                        reference_label: row.get(6)?,
                    },
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

pub(super) fn insert_invoice_request(
    conn: &Connection,
    invoice_ref: &str,
    request: &InvoiceLineRequest,
) -> ReconResult<()> {
    conn.execute(
        "INSERT INTO invoice_request (
            invoice_ref, contract_id, origin, product_code, quantity, unit_rate, reference_label
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            invoice_ref,
            request.contract_id,
            request.origin,
            request.product_code,
            dec_text(request.quantity),
            dec_text(request.unit_rate),
            request.reference_label,
        ],
    )?;
    Ok(())
}

/// Billing collaborator backed by the local `invoice_request` table.
///
/// It hands out a fresh `INV-` reference straight away but leaves the row
/// with the engine, which files it in the same transaction as the
/// settlement it belongs to.
#[derive(Debug, Default)]
pub struct StoreBilling {
    pending: Option<(InvoiceRef, InvoiceLineRequest)>,
}

impl StoreBilling {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BillingCollaborator for StoreBilling {
    fn emit_invoice_line(&mut self, request: &InvoiceLineRequest) -> ReconResult<InvoiceRef> {
        let invoice_ref = format!("INV-{}", Uuid::new_v4().simple());
        self.pending = Some((invoice_ref.clone(), request.clone()));
        Ok(invoice_ref)
    }

    fn take_local_filing(&mut self) -> Option<(InvoiceRef, InvoiceLineRequest)> {
        self.pending.take()
    }
}
