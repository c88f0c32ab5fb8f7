//! SQLite-backed record repository.
//!
//! # Responsibility
//! - Persist writer batches of `Record` into the `records` table.
//! - Expose the read paths used to seed a writer.
//!
//! # Invariants
//! - Write paths call `Record::validate()` before SQL mutations.
//! - A batch is all-or-nothing: it runs inside one savepoint.
//! - Missing rows on update/delete are reported as `NotFound`.

use super::WriterRepository;
use crate::db::DbError;
use crate::model::record::{Record, RecordId, RecordValidationError};
use log::{debug, warn};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Row};
use thiserror::Error;
use uuid::Uuid;

const RECORD_SELECT_SQL: &str = "SELECT uuid, kind, body FROM records";
const BATCH_SAVEPOINT: &str = "record_batch";

pub type RepoResult<T> = Result<T, RepoError>;

/// Record persistence failure.
#[derive(Debug, Error)]
pub enum RepoError {
    #[error(transparent)]
    Validation(#[from] RecordValidationError),
    #[error(transparent)]
    Db(#[from] DbError),
    #[error("record not found: {0}")]
    NotFound(RecordId),
    #[error("invalid persisted record data: {0}")]
    InvalidData(String),
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Query options for listing records.
#[derive(Debug, Clone, Default)]
pub struct RecordListQuery {
    pub kind: Option<String>,
    pub limit: Option<u32>,
    pub offset: u32,
}

/// Record repository over a borrowed connection.
///
/// Writes land in whatever transaction is open on the connection, which is
/// how a `SqliteTransactionScope` on the same connection covers them.
pub struct SqliteRecordRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteRecordRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    pub fn get_record(&self, id: RecordId) -> RepoResult<Option<Record>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{RECORD_SELECT_SQL} WHERE uuid = ?1;"))?;
        let mut rows = stmt.query([id.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_record_row(row)?));
        }
        Ok(None)
    }

    /// Lists records oldest first.
    pub fn list_records(&self, query: &RecordListQuery) -> RepoResult<Vec<Record>> {
        let mut sql = format!("{RECORD_SELECT_SQL} WHERE 1 = 1");
        let mut bind_values: Vec<Value> = Vec::new();

        if let Some(kind) = &query.kind {
            sql.push_str(" AND kind = ?");
            bind_values.push(Value::Text(kind.clone()));
        }

        sql.push_str(" ORDER BY created_at ASC, rowid ASC");

        match query.limit {
            Some(limit) => {
                sql.push_str(" LIMIT ? OFFSET ?");
                bind_values.push(Value::Integer(i64::from(limit)));
            }
            None => sql.push_str(" LIMIT -1 OFFSET ?"),
        }
        bind_values.push(Value::Integer(i64::from(query.offset)));

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            records.push(parse_record_row(row)?);
        }
        Ok(records)
    }

    pub fn count_records(&self) -> RepoResult<u64> {
        let count = self
            .conn
            .query_row("SELECT COUNT(*) FROM records;", [], |row| row.get::<_, i64>(0))?;
        u64::try_from(count)
            .map_err(|_| RepoError::InvalidData(format!("negative record count `{count}`")))
    }

    fn in_batch(
        &self,
        op: &'static str,
        records: &[Record],
        apply: impl Fn(&Connection, &Record) -> RepoResult<()>,
    ) -> RepoResult<()> {
        if records.is_empty() {
            return Ok(());
        }

        self.conn
            .execute_batch(&format!("SAVEPOINT {BATCH_SAVEPOINT};"))?;
        let outcome = records
            .iter()
            .try_for_each(|record| apply(self.conn, record));

        match outcome {
            Ok(()) => {
                self.conn
                    .execute_batch(&format!("RELEASE SAVEPOINT {BATCH_SAVEPOINT};"))?;
                debug!(
                    "event=record_batch module=repo status=ok op={op} size={}",
                    records.len()
                );
                Ok(())
            }
            Err(err) => {
                let undo = format!(
                    "ROLLBACK TO SAVEPOINT {BATCH_SAVEPOINT}; RELEASE SAVEPOINT {BATCH_SAVEPOINT};"
                );
                if let Err(undo_err) = self.conn.execute_batch(&undo) {
                    warn!(
                        "event=record_batch module=repo status=error op={op} error_code=savepoint_undo_failed error={undo_err}"
                    );
                }
                Err(err)
            }
        }
    }
}

impl WriterRepository<Record> for SqliteRecordRepository<'_> {
    type Error = RepoError;

    fn delete(&mut self, values: &[Record]) -> RepoResult<()> {
        self.in_batch("delete", values, |conn, record| {
            let changed =
                conn.execute("DELETE FROM records WHERE uuid = ?1;", [record.id.to_string()])?;
            if changed == 0 {
                return Err(RepoError::NotFound(record.id));
            }
            Ok(())
        })
    }

    fn create(&mut self, values: &[Record]) -> RepoResult<()> {
        for record in values {
            record.validate()?;
        }
        self.in_batch("create", values, |conn, record| {
            conn.execute(
                "INSERT INTO records (uuid, kind, body) VALUES (?1, ?2, ?3);",
                params![record.id.to_string(), record.kind.as_str(), record.body.as_str()],
            )?;
            Ok(())
        })
    }

    fn update(&mut self, values: &[Record]) -> RepoResult<()> {
        for record in values {
            record.validate()?;
        }
        self.in_batch("update", values, |conn, record| {
            let changed = conn.execute(
                "UPDATE records
                 SET
                    kind = ?1,
                    body = ?2,
                    updated_at = (strftime('%s', 'now') * 1000)
                 WHERE uuid = ?3;",
                params![record.kind.as_str(), record.body.as_str(), record.id.to_string()],
            )?;
            if changed == 0 {
                return Err(RepoError::NotFound(record.id));
            }
            Ok(())
        })
    }
}

fn parse_record_row(row: &Row<'_>) -> RepoResult<Record> {
    let uuid_text: String = row.get("uuid")?;
    let id = Uuid::parse_str(&uuid_text).map_err(|_| {
        RepoError::InvalidData(format!("invalid uuid value `{uuid_text}` in records.uuid"))
    })?;

    let record = Record {
        id,
        kind: row.get("kind")?,
        body: row.get("body")?,
    };
    record
        .validate()
        .map_err(|err| RepoError::InvalidData(format!("{err} for record {id}")))?;
    Ok(record)
}
