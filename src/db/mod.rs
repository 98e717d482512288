mod ledger;
mod store;

pub use ledger::Ledger;
pub use store::LedgerStore;
