pub mod events;
pub mod ledger;
pub mod profile;

pub use events::EventBus;
pub use ledger::PointsLedger;
pub use profile::ProfileService;
