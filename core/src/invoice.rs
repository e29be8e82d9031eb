//! Invoice request emitter: the boundary to the external billing system.
//!
//! Translation only: a `Bill` settlement becomes one line-item request.
//! The collaborator decides what an invoice is and hands back a reference.

use crate::{
    error::{ReconError, ReconResult},
    policy::SettlementAction,
    reconciliation::Reconciliation,
    types::{InvoiceRef, Qty, Rate},
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub const DEFAULT_REFERENCE_TEMPLATE: &str = "Annual reconciliation bank pull for {contract}";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InvoiceLineRequest {
    pub contract_id:     String,
    pub origin:          String,
    pub product_code:    Option<String>,
    pub quantity:        Qty,
    pub unit_rate:       Rate,
    pub reference_label: String,
}

impl InvoiceLineRequest {
    pub fn amount(&self) -> Decimal {
        self.quantity * self.unit_rate
    }
}

/// External billing system.
pub trait BillingCollaborator {
    fn emit_invoice_line(&mut self, request: &InvoiceLineRequest) -> ReconResult<InvoiceRef>;

    /// The last emitted request, when the collaborator wants it filed in
    /// the reconciliation store together with the settlement.
    fn take_local_filing(&mut self) -> Option<(InvoiceRef, InvoiceLineRequest)> {
        None
    }
}

pub struct InvoiceRequestEmitter<'a> {
    reference_template: &'a str,
}

impl<'a> InvoiceRequestEmitter<'a> {
    pub fn new(reference_template: &'a str) -> Self {
        Self { reference_template }
    }

    /// Build the request for a bill action; `None` for forfeit/rollover.
    pub fn request_for(
        &self,
        recon: &Reconciliation,
        action: &SettlementAction,
    ) -> ReconResult<Option<InvoiceLineRequest>> {
        let SettlementAction::Bill { quantity, rate } = action else {
            return Ok(None);
        };
        if *quantity <= Decimal::ZERO {
            return Err(ReconError::NothingToBill { quantity: *quantity });
        }
        let contract = if recon.snapshot.contract_name.is_empty() {
            recon.id.as_str()
        } else {
            recon.snapshot.contract_name.as_str()
        };
        Ok(Some(InvoiceLineRequest {
            contract_id:     recon.contract_id.clone(),
            origin:          recon.id.clone(),
            product_code:    recon.snapshot.product_code.clone(),
            quantity:        *quantity,
            unit_rate:       *rate,
            reference_label: self.reference_template.replace("{contract}", contract),
        }))
    }

    /// Send the request for `action` to `billing`, if there is one.
    pub fn emit(
        &self,
        recon: &Reconciliation,
        action: &SettlementAction,
        billing: &mut dyn BillingCollaborator,
    ) -> ReconResult<Option<InvoiceRef>> {
        match self.request_for(recon, action)? {
            Some(request) => {
                let invoice_ref = billing.emit_invoice_line(&request)?;
                log::info!(
                    "invoice {invoice_ref} requested for {}: {} @ {}",
                    recon.id,
                    request.quantity,
                    request.unit_rate
                );
                Ok(Some(invoice_ref))
            }
            None => Ok(None),
        }
    }
}

impl Default for InvoiceRequestEmitter<'static> {
    fn default() -> Self {
        Self::new(DEFAULT_REFERENCE_TEMPLATE)
    }
}

/// Collaborator that keeps every request in memory. Used by tests and
/// dry runs.
#[derive(Debug, Default)]
pub struct RecordingBilling {
    pub requests: Vec<InvoiceLineRequest>,
    pub fail_with: Option<String>,
}

impl BillingCollaborator for RecordingBilling {
    fn emit_invoice_line(&mut self, request: &InvoiceLineRequest) -> ReconResult<InvoiceRef> {
        if let Some(reason) = &self.fail_with {
            return Err(ReconError::Billing(reason.clone()));
        }
        self.requests.push(request.clone());
        Ok(format!("INV-{:04}", self.requests.len()))
    }
}
