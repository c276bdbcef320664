pub mod ledger;
pub mod memory;
pub mod preferences;
pub mod reward;
pub mod task;
pub mod user;
