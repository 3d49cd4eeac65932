//! Recova backend: payment processing for debt-collection agencies.
//!
//! The core is the payment pipeline: an orchestrator that charges debtor
//! payments through an external processor behind a circuit breaker and an
//! idempotency store, webhook receipt that confirms or fails payments
//! asynchronously, and a reconciliation worker that settles payments stuck
//! in pending. Around it sit the account status machine, the activity
//! timeline, and the SFTP placement-file importer.

pub mod accounts;
pub mod api;
pub mod breaker;
pub mod cache;
pub mod config;
pub mod database;
pub mod error;
pub mod imports;
pub mod payments;
pub mod processor;
pub mod tasks;
