//! Shared primitive types used across the entire engine.

use rust_decimal::Decimal;

/// A quantity in contract units (m³ of concrete for RMC contracts).
pub type Qty = Decimal;

/// A price per contract unit.
pub type Rate = Decimal;

/// A duration in hours (NGT downtime, LOTO wave-off).
pub type Hours = Decimal;

/// Stable identifier of the customer contract a reconciliation settles.
pub type ContractId = String;

/// Stable identifier of one reconciliation (one contract, one fiscal window).
pub type ReconciliationId = String;

/// Opaque reference returned by the external billing collaborator.
pub type InvoiceRef = String;
