//! Transaction coordination contracts.
//!
//! # Responsibility
//! - Define the participant capability a staged writer exposes.
//! - Define the coordinator seam a writer enlists with during `save`.
//! - Provide an in-process participant scope and a SQLite-backed scope.
//!
//! # Invariants
//! - A participant receives at most one of `commit` / `rollback` per enlistment.
//! - Participants are resolved in enlistment order.

use crate::db::DbError;
use thiserror::Error;

mod scope;
mod sqlite_scope;

pub use scope::TransactionScope;
pub use sqlite_scope::SqliteTransactionScope;

pub type TxResult<T> = Result<T, TxError>;

/// Failure while resolving a transaction.
#[derive(Debug, Error)]
pub enum TxError {
    /// A participant refused to commit or roll back.
    #[error("transaction participant failed: {0}")]
    Participant(String),
    /// The backing storage transaction failed.
    #[error("transaction storage failure: {0}")]
    Db(#[from] DbError),
}

impl From<rusqlite::Error> for TxError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Something that finishes its work only when the surrounding transaction does.
pub trait TransactionParticipant {
    /// Makes already-flushed work final.
    fn commit(&mut self) -> TxResult<()>;
    /// Abandons already-flushed work.
    fn rollback(&mut self) -> TxResult<()>;
}

/// Collects participants whose resolution is deferred to a transaction.
///
/// Handing a coordinator to `Writer::save` is what marks a save as being
/// inside a transaction.
pub trait TransactionCoordinator<'a> {
    fn enlist(&mut self, participant: Box<dyn TransactionParticipant + 'a>);
}
