pub mod ledger;
pub mod lifecycle;
pub mod payment;
