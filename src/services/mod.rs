// Money
pub mod fees;
pub mod ledger;
pub mod payouts;
pub mod settlement;

// Reporting
pub mod exports;
pub mod redaction;

// Concurrency helpers
pub mod keyed_lock;
