//! Command Handlers module
//!
//! Handlers orchestrate business operations: each one coordinates the
//! domain rules, the Balance Mutator, audit, and notifications.

mod account_handler;
mod adjust_handler;
mod commands;
mod transfer_handler;


pub use account_handler::AccountHandler;
pub use adjust_handler::AdjustHandler;
pub use commands::*;
pub use transfer_handler::TransferHandler;
