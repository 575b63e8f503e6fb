//! Event-driven orchestration of cache imports into Bigtable.
//!
//! A storage notification for an object under an import root is routed by [`router`]:
//!
//! * `<root>/control/<table id>/init.txt` provisions a table and launches the ingestion job
//!   ([`state_machine`]).
//! * `<root>/process/<run>/trigger.txt` wakes the import controller ([`trigger`]).
//!
//! Everything else is ignored. External services sit behind the traits in [`gateway`],
//! [`table_admin`], [`job`] and [`publish`], so this crate never talks to the network itself.

pub mod alert;
pub mod config;
pub mod gateway;
pub mod handler;
pub mod job;
pub mod paths;
pub mod publish;
pub mod retry;
pub mod router;
pub mod state_machine;
pub mod table_admin;
pub mod trigger;

#[cfg(test)]
mod test_util;

/// Error returned by an external service client.
pub type ClientError = Box<dyn std::error::Error + Send + Sync>;
