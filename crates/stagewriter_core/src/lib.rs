//! Staged writes in front of a persistence repository.
//!
//! A [`Writer`] tracks entities across current / to-create / to-update /
//! to-delete buckets, flushes them in one `save`, and either folds them into
//! its current view right away or waits for a transaction coordinator.

pub mod config;
pub mod db;
pub mod equality;
pub mod logging;
pub mod model;
pub mod repo;
pub mod tx;
pub mod writer;

pub use config::{ConfigError, LoggingConfig, RollbackPolicy, StageWriterConfig, WriterOptions};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::record::{Record, RecordId, RecordValidationError};
pub use repo::memory_repo::{MemoryRepoError, MemoryRepository, RepoCall, RepoOp};
pub use repo::record_repo::{RecordListQuery, RepoError, RepoResult, SqliteRecordRepository};
pub use repo::WriterRepository;
pub use tx::{
    SqliteTransactionScope, TransactionCoordinator, TransactionParticipant, TransactionScope,
    TxError, TxResult,
};
pub use writer::Writer;

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
