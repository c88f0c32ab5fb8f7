//! Transaction scope backed by a SQLite transaction.
//!
//! Repositories sharing the same connection write inside the transaction, so
//! rolling the scope back undoes every flushed batch as well.

use super::{TransactionCoordinator, TransactionParticipant, TransactionScope, TxResult};
use log::{error, warn};
use rusqlite::{Connection, Transaction};

pub struct SqliteTransactionScope<'a> {
    tx: Transaction<'a>,
    participants: TransactionScope<'a>,
}

impl<'a> SqliteTransactionScope<'a> {
    /// Opens a deferred SQLite transaction on a shared connection.
    ///
    /// # Errors
    /// - Fails when the connection is already inside a transaction.
    pub fn begin(conn: &'a Connection) -> TxResult<Self> {
        let tx = conn.unchecked_transaction()?;
        Ok(Self {
            tx,
            participants: TransactionScope::new(),
        })
    }

    /// Connection view scoped to the open transaction.
    pub fn connection(&self) -> &Connection {
        &self.tx
    }

    pub fn participant_count(&self) -> usize {
        self.participants.len()
    }

    /// Commits SQLite first, then the participants.
    ///
    /// # Errors
    /// - When the SQLite commit fails, participants are rolled back and the
    ///   storage error is returned.
    pub fn commit(self) -> TxResult<()> {
        let Self { tx, participants } = self;
        if let Err(err) = tx.commit() {
            error!("event=tx_commit module=tx status=error backend=sqlite error={err}");
            if let Err(rollback_err) = participants.rollback() {
                warn!(
                    "event=tx_rollback module=tx status=error backend=sqlite reason=commit_failed error={rollback_err}"
                );
            }
            return Err(err.into());
        }
        participants.commit()
    }

    /// Rolls back SQLite, then every participant.
    pub fn rollback(self) -> TxResult<()> {
        let Self { tx, participants } = self;
        let storage = tx.rollback();
        let participant_outcome = participants.rollback();
        storage?;
        participant_outcome
    }
}

impl<'a> TransactionCoordinator<'a> for SqliteTransactionScope<'a> {
    fn enlist(&mut self, participant: Box<dyn TransactionParticipant + 'a>) {
        self.participants.enlist(participant);
    }
}
