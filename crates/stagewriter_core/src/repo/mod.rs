//! Repository capability consumed by the staged writer.
//!
//! # Responsibility
//! - Define the batch write contract a writer flushes into.
//! - Provide reference implementations (in-memory journal, SQLite records).
//!
//! # Invariants
//! - An empty batch is a successful no-op.
//! - Errors are returned to the writer unchanged through `Error`.

pub mod memory_repo;
pub mod record_repo;

/// Batch persistence contract for one entity type.
pub trait WriterRepository<T> {
    type Error;

    fn delete(&mut self, values: &[T]) -> Result<(), Self::Error>;
    fn create(&mut self, values: &[T]) -> Result<(), Self::Error>;
    fn update(&mut self, values: &[T]) -> Result<(), Self::Error>;
}

impl<T, R> WriterRepository<T> for &mut R
where
    R: WriterRepository<T> + ?Sized,
{
    type Error = R::Error;

    fn delete(&mut self, values: &[T]) -> Result<(), Self::Error> {
        (**self).delete(values)
    }

    fn create(&mut self, values: &[T]) -> Result<(), Self::Error> {
        (**self).create(values)
    }

    fn update(&mut self, values: &[T]) -> Result<(), Self::Error> {
        (**self).update(values)
    }
}
