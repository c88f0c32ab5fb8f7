//! In-memory repository with a call journal.
//!
//! Useful as a stand-in store and for asserting the exact batches a writer
//! flushes. Failures can be injected per operation.

use super::WriterRepository;
use crate::equality::{remove_all, Equality};
use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use thiserror::Error;

/// Repository write operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RepoOp {
    Delete,
    Create,
    Update,
}

impl RepoOp {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Delete => "delete",
            Self::Create => "create",
            Self::Update => "update",
        }
    }
}

impl Display for RepoOp {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One recorded repository invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoCall<T> {
    pub op: RepoOp,
    pub batch: Vec<T>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MemoryRepoError {
    #[error("injected {op} failure: {message}")]
    Injected { op: RepoOp, message: String },
}

pub struct MemoryRepository<T> {
    equal: Equality<T>,
    stored: Vec<T>,
    calls: Vec<RepoCall<T>>,
    failures: HashMap<RepoOp, String>,
}

impl<T: Clone> MemoryRepository<T> {
    pub fn new(equal: impl Fn(&T, &T) -> bool + 'static) -> Self {
        Self {
            equal: Box::new(equal),
            stored: Vec::new(),
            calls: Vec::new(),
            failures: HashMap::new(),
        }
    }

    /// Seeds stored values without journaling a call.
    pub fn with_stored(mut self, values: impl IntoIterator<Item = T>) -> Self {
        self.stored.extend(values);
        self
    }

    /// Makes every later `op` call fail, empty batches included.
    pub fn fail_on(&mut self, op: RepoOp, message: impl Into<String>) {
        self.failures.insert(op, message.into());
    }

    pub fn clear_failures(&mut self) {
        self.failures.clear();
    }

    pub fn stored(&self) -> &[T] {
        &self.stored
    }

    /// Every call in invocation order, failed ones included.
    pub fn calls(&self) -> &[RepoCall<T>] {
        &self.calls
    }

    pub fn ops(&self) -> Vec<RepoOp> {
        self.calls.iter().map(|call| call.op).collect()
    }

    fn record(&mut self, op: RepoOp, values: &[T]) -> Result<(), MemoryRepoError> {
        self.calls.push(RepoCall {
            op,
            batch: values.to_vec(),
        });
        match self.failures.get(&op) {
            Some(message) => Err(MemoryRepoError::Injected {
                op,
                message: message.clone(),
            }),
            None => Ok(()),
        }
    }
}

impl<T: Clone> WriterRepository<T> for MemoryRepository<T> {
    type Error = MemoryRepoError;

    fn delete(&mut self, values: &[T]) -> Result<(), Self::Error> {
        self.record(RepoOp::Delete, values)?;
        for value in values {
            remove_all(&mut self.stored, value, self.equal.as_ref());
        }
        Ok(())
    }

    fn create(&mut self, values: &[T]) -> Result<(), Self::Error> {
        self.record(RepoOp::Create, values)?;
        self.stored.extend_from_slice(values);
        Ok(())
    }

    fn update(&mut self, values: &[T]) -> Result<(), Self::Error> {
        self.record(RepoOp::Update, values)?;
        for value in values {
            for slot in self.stored.iter_mut() {
                if (self.equal)(value, slot) {
                    *slot = value.clone();
                }
            }
        }
        Ok(())
    }
}
