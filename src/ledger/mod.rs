//! Ledger module
//!
//! Append-only ledger entries, account row persistence, and the Balance
//! Mutator that ties balance updates and entries into one atomic unit.

pub mod entry;
pub mod mutator;
pub mod store;

pub use entry::{EntryStatus, EntryType, LedgerEntry};
pub use mutator::{BalanceMutator, DeltaCommand, MutationOutcome};
pub use store::LedgerError;
