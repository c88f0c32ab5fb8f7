//! Concrete entity model persisted by the SQLite reference repository.
//!
//! # Invariants
//! - Every record is identified by a stable `RecordId`.
//! - Identity equality compares ids only; payload changes keep identity.

pub mod record;
