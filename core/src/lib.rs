pub mod billing;
pub mod calendar;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod invoice;
pub mod period;
pub mod policy;
pub mod reconciliation;
pub mod snapshot;
pub mod store;
pub mod totals;
pub mod types;
pub mod waterfall;
