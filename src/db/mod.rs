//! Loan store: SQLite persistence for loans, idempotency records, the audit
//! log, and liquidation leases.
//!
//! This module provides:
//! - Database initialization and migrations
//! - SQLite pragma configuration
//! - Repository layer enforcing the loan invariants
//! - Per-loan keyed locking for linearized mutations

pub mod keyed_lock;
pub mod migrations;
pub mod repo;

pub use keyed_lock::KeyedLocks;
pub use migrations::init_db;
pub use repo::{
    AuditEntry, AuditKind, ProcessedRequest, Repository, RequestOutcome, StoreError,
};
