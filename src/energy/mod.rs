//! Energy accounting.
//!
//! - [`EnergyMeter`] — joules-per-token estimates per model
//! - [`EnergyLedger`] — durable per-request record with aggregates

mod ledger;
mod meter;

pub use ledger::{EnergyLedger, EnergyRecord, LedgerAverages, LedgerConfig, LedgerSnapshot};
pub use meter::{DEFAULT_INTENSITY_KEY, EnergyMeter};
