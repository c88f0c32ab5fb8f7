//! In-process participant scope.

use super::{TransactionCoordinator, TransactionParticipant, TxResult};
use log::{error, info, warn};

/// Ordered list of participants resolved together.
///
/// Dropping a scope that was neither committed nor rolled back rolls every
/// participant back.
#[derive(Default)]
pub struct TransactionScope<'a> {
    participants: Vec<Box<dyn TransactionParticipant + 'a>>,
}

impl<'a> TransactionScope<'a> {
    pub fn new() -> Self {
        Self {
            participants: Vec::new(),
        }
    }

    /// Number of participants currently enlisted.
    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    /// Commits every participant in enlistment order.
    ///
    /// # Errors
    /// - Returns the first participant failure. Participants after the failing
    ///   one are rolled back instead of committed; earlier ones stay committed.
    pub fn commit(mut self) -> TxResult<()> {
        let participants = std::mem::take(&mut self.participants);
        let total = participants.len();
        let mut pending = participants.into_iter();
        let mut committed = 0usize;

        while let Some(mut participant) = pending.next() {
            if let Err(err) = participant.commit() {
                error!(
                    "event=tx_commit module=tx status=error committed={committed} total={total} error={err}"
                );
                for mut remaining in pending {
                    if let Err(rollback_err) = remaining.rollback() {
                        warn!(
                            "event=tx_rollback module=tx status=error reason=commit_aborted error={rollback_err}"
                        );
                    }
                }
                return Err(err);
            }
            committed += 1;
        }

        info!("event=tx_commit module=tx status=ok participants={total}");
        Ok(())
    }

    /// Rolls back every participant, even after a failure.
    ///
    /// # Errors
    /// - Returns the first participant failure once all were visited.
    pub fn rollback(mut self) -> TxResult<()> {
        let participants = std::mem::take(&mut self.participants);
        let total = participants.len();
        let outcome = rollback_all(participants);
        match &outcome {
            Ok(()) => info!("event=tx_rollback module=tx status=ok participants={total}"),
            Err(err) => error!(
                "event=tx_rollback module=tx status=error participants={total} error={err}"
            ),
        }
        outcome
    }
}

impl<'a> TransactionCoordinator<'a> for TransactionScope<'a> {
    fn enlist(&mut self, participant: Box<dyn TransactionParticipant + 'a>) {
        self.participants.push(participant);
    }
}

impl Drop for TransactionScope<'_> {
    fn drop(&mut self) {
        if self.participants.is_empty() {
            return;
        }
        warn!(
            "event=tx_rollback module=tx status=start reason=scope_dropped participants={}",
            self.participants.len()
        );
        let participants = std::mem::take(&mut self.participants);
        if let Err(err) = rollback_all(participants) {
            warn!("event=tx_rollback module=tx status=error reason=scope_dropped error={err}");
        }
    }
}

fn rollback_all(participants: Vec<Box<dyn TransactionParticipant + '_>>) -> TxResult<()> {
    let mut first_error = None;
    for mut participant in participants {
        if let Err(err) = participant.rollback() {
            first_error.get_or_insert(err);
        }
    }
    match first_error {
        Some(err) => Err(err),
        None => Ok(()),
    }
}
