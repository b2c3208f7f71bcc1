//! bankcore Library
//!
//! Re-exports modules for integration testing and external use.

pub mod api;
pub mod audit;
pub mod domain;
pub mod handlers;
pub mod jobs;
pub mod ledger;
pub mod notify;

pub mod config;
pub mod db;
mod error;

pub use config::Config;
pub use domain::{Amount, AmountError, Balance, DomainError, OperationContext, SignedAmount};
pub use error::{AppError, AppResult};
pub use ledger::{BalanceMutator, DeltaCommand, LedgerEntry};
