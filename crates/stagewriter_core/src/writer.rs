//! Staged writer: batches creates, updates and deletes before a flush.
//!
//! # Responsibility
//! - Track each entity across the `current`, `to_create`, `to_update` and
//!   `to_delete` buckets using a caller-supplied identity predicate.
//! - Flush staged buckets to a `WriterRepository` in delete, create, update
//!   order.
//! - Fold flushed work into `current` immediately, or defer that fold to a
//!   transaction coordinator.
//!
//! # Invariants
//! - A failed `save` leaves every bucket exactly as it was.
//! - `commit` and `rollback` never fail.
//! - An entity moved between buckets leaves its origin bucket.
//! - `restore` and `add_to_create` do not deduplicate.

use crate::config::{RollbackPolicy, WriterOptions};
use crate::equality::{contains, remove_all, take_all, Equality};
use crate::repo::WriterRepository;
use crate::tx::{TransactionCoordinator, TransactionParticipant, TxResult};
use log::{debug, error, info};
use std::cell::{Ref, RefCell};
use std::fmt::Display;
use std::rc::Rc;

/// The four staging buckets plus the deferred-commit marker.
#[derive(Debug)]
struct Buckets<T> {
    current: Vec<T>,
    to_create: Vec<T>,
    to_update: Vec<T>,
    to_delete: Vec<T>,
    /// Persisted values of entities that left `current` since the last commit.
    originals: Vec<T>,
    pending_transaction: bool,
}

impl<T> Default for Buckets<T> {
    fn default() -> Self {
        Self {
            current: Vec::new(),
            to_create: Vec::new(),
            to_update: Vec::new(),
            to_delete: Vec::new(),
            originals: Vec::new(),
            pending_transaction: false,
        }
    }
}

impl<T> Buckets<T> {
    fn has_staged_changes(&self) -> bool {
        !(self.to_create.is_empty() && self.to_update.is_empty() && self.to_delete.is_empty())
    }

    fn commit(&mut self) {
        let folded = self.to_create.len() + self.to_update.len();
        let deleted = self.to_delete.len();

        self.current.append(&mut self.to_create);
        self.current.append(&mut self.to_update);
        self.to_delete.clear();
        self.originals.clear();
        self.pending_transaction = false;

        debug!(
            "event=writer_commit module=writer status=ok folded={folded} deleted={deleted} current={}",
            self.current.len()
        );
    }

    fn rollback(&mut self, policy: RollbackPolicy) {
        match policy {
            RollbackPolicy::Retain => {}
            RollbackPolicy::Discard => {
                self.to_create.clear();
                self.to_update.clear();
                self.to_delete.clear();
                self.current.append(&mut self.originals);
            }
        }
        self.pending_transaction = false;

        debug!(
            "event=writer_rollback module=writer status=ok policy={} staged={}",
            policy.as_str(),
            self.has_staged_changes()
        );
    }
}

/// Participant enlisted by a deferred `save`; shares the writer's buckets.
struct StagedParticipant<T> {
    buckets: Rc<RefCell<Buckets<T>>>,
    policy: RollbackPolicy,
}

impl<T> TransactionParticipant for StagedParticipant<T> {
    fn commit(&mut self) -> TxResult<()> {
        self.buckets.borrow_mut().commit();
        Ok(())
    }

    fn rollback(&mut self) -> TxResult<()> {
        self.buckets.borrow_mut().rollback(self.policy);
        Ok(())
    }
}

/// In-memory staging buffer in front of a repository.
///
/// Not `Send`: the buckets are shared with any participant a deferred save
/// enlists, so the writer is meant for single-threaded use.
pub struct Writer<T, R> {
    repository: R,
    equal: Equality<T>,
    buckets: Rc<RefCell<Buckets<T>>>,
    options: WriterOptions,
}

impl<T, R> Writer<T, R>
where
    T: Clone,
    R: WriterRepository<T>,
{
    /// Creates an empty writer with default options.
    pub fn new(repository: R, equal: impl Fn(&T, &T) -> bool + 'static) -> Self {
        Self::with_options(repository, equal, WriterOptions::default())
    }

    pub fn with_options(
        repository: R,
        equal: impl Fn(&T, &T) -> bool + 'static,
        options: WriterOptions,
    ) -> Self {
        Self {
            repository,
            equal: Box::new(equal),
            buckets: Rc::new(RefCell::new(Buckets::default())),
            options,
        }
    }

    /// Appends entities that are already persisted to `current`.
    pub fn load(&mut self, values: impl IntoIterator<Item = T>) {
        self.buckets.borrow_mut().current.extend(values);
    }

    /// Reintroduces an entity: appends it to `current` and drops any equal
    /// entry from `to_delete`.
    pub fn restore(&mut self, value: T) {
        let eq = self.equal.as_ref();
        let mut guard = self.buckets.borrow_mut();
        let buckets = &mut *guard;
        remove_all(&mut buckets.to_delete, &value, eq);
        remove_all(&mut buckets.originals, &value, eq);
        buckets.current.push(value);
    }

    /// Stages deletions.
    ///
    /// A value found in `current` or `to_update` moves to `to_delete`. A value
    /// only found in `to_create` is cancelled instead of staged. Unknown
    /// values are ignored.
    pub fn delete(&mut self, values: impl IntoIterator<Item = T>) {
        let eq = self.equal.as_ref();
        let mut guard = self.buckets.borrow_mut();
        let buckets = &mut *guard;

        for value in values {
            let persisted = take_all(&mut buckets.current, &value, eq);
            if !persisted.is_empty() {
                buckets.originals.extend(persisted);
                buckets.to_delete.push(value);
            } else if remove_all(&mut buckets.to_update, &value, eq) > 0 {
                buckets.to_delete.push(value);
            } else if remove_all(&mut buckets.to_create, &value, eq) == 0 {
                debug!("event=writer_delete module=writer status=skipped reason=not_tracked");
            }
        }
    }

    /// Stages an update with the new `value`.
    ///
    /// The matching entry leaves `current`, or `to_delete` when it was staged
    /// for deletion. Values tracked nowhere else are ignored.
    pub fn set_to_update(&mut self, value: T) {
        let eq = self.equal.as_ref();
        let mut guard = self.buckets.borrow_mut();
        let buckets = &mut *guard;

        let persisted = take_all(&mut buckets.current, &value, eq);
        if !persisted.is_empty() {
            buckets.originals.extend(persisted);
            buckets.to_update.push(value);
        } else if remove_all(&mut buckets.to_delete, &value, eq) > 0 {
            buckets.to_update.push(value);
        } else {
            debug!("event=writer_update module=writer status=skipped reason=not_tracked");
        }
    }

    /// Stages creations without any existence check.
    pub fn add_to_create(&mut self, values: impl IntoIterator<Item = T>) {
        self.buckets.borrow_mut().to_create.extend(values);
    }

    /// Live view: `current`, then `to_create`, then `to_update`.
    pub fn get_all_active(&self) -> Vec<T> {
        let buckets = self.buckets.borrow();
        buckets
            .current
            .iter()
            .chain(&buckets.to_create)
            .chain(&buckets.to_update)
            .cloned()
            .collect()
    }

    /// First live entity matching `predicate`, in `get_all_active` order.
    pub fn search(&self, predicate: impl Fn(&T) -> bool) -> Option<T> {
        let buckets = self.buckets.borrow();
        buckets
            .current
            .iter()
            .chain(&buckets.to_create)
            .chain(&buckets.to_update)
            .find(|value| predicate(*value))
            .cloned()
    }

    /// Like [`Writer::search`], but yields `T::default()` when nothing matches.
    ///
    /// A real match equal to the default value is indistinguishable from a
    /// miss; prefer `search` unless the predicate rules that out.
    pub fn search_or_default(&self, predicate: impl Fn(&T) -> bool) -> T
    where
        T: Default,
    {
        self.search(predicate).unwrap_or_default()
    }

    /// Whether an entity equal to `value` is live (current, created or updated).
    pub fn contains(&self, value: &T) -> bool {
        let buckets = self.buckets.borrow();
        let eq = self.equal.as_ref();
        contains(&buckets.current, value, eq)
            || contains(&buckets.to_create, value, eq)
            || contains(&buckets.to_update, value, eq)
    }

    /// Flushes staged buckets: delete, then create, then update.
    ///
    /// With a coordinator the fold into `current` is deferred until the
    /// coordinator resolves; without one the writer commits right away.
    ///
    /// # Errors
    /// - Returns the first repository error unchanged. Later steps are skipped
    ///   and no bucket is modified.
    pub fn save<'a>(
        &mut self,
        coordinator: Option<&mut dyn TransactionCoordinator<'a>>,
    ) -> Result<(), R::Error>
    where
        T: 'a,
        R::Error: Display,
    {
        let deferred = coordinator.is_some();
        {
            let buckets = self.buckets.borrow();
            info!(
                "event=writer_save module=writer status=start deferred={deferred} delete={} create={} update={}",
                buckets.to_delete.len(),
                buckets.to_create.len(),
                buckets.to_update.len()
            );
            flush(&mut self.repository, &buckets)?;
        }

        match coordinator {
            Some(coordinator) => {
                self.buckets.borrow_mut().pending_transaction = true;
                coordinator.enlist(Box::new(StagedParticipant {
                    buckets: Rc::clone(&self.buckets),
                    policy: self.options.rollback_policy,
                }));
            }
            None => self.buckets.borrow_mut().commit(),
        }

        info!("event=writer_save module=writer status=ok deferred={deferred}");
        Ok(())
    }
}

/// Issues the three repository calls, stopping at the first failure.
fn flush<T, R>(repository: &mut R, buckets: &Buckets<T>) -> Result<(), R::Error>
where
    R: WriterRepository<T>,
    R::Error: Display,
{
    logged("delete", repository.delete(&buckets.to_delete))?;
    logged("create", repository.create(&buckets.to_create))?;
    logged("update", repository.update(&buckets.to_update))
}

fn logged<E: Display>(step: &'static str, outcome: Result<(), E>) -> Result<(), E> {
    outcome.map_err(|err| {
        error!("event=writer_save module=writer status=error step={step} error={err}");
        err
    })
}

impl<T, R> Writer<T, R> {
    /// Folds `to_create` and `to_update` into `current` and clears staging.
    pub fn commit(&mut self) {
        self.buckets.borrow_mut().commit();
    }

    /// Resolves a deferred save as failed, per the configured policy.
    pub fn rollback(&mut self) {
        self.buckets.borrow_mut().rollback(self.options.rollback_policy);
    }

    pub fn current(&self) -> Ref<'_, [T]> {
        Ref::map(self.buckets.borrow(), |buckets| buckets.current.as_slice())
    }

    pub fn to_create(&self) -> Ref<'_, [T]> {
        Ref::map(self.buckets.borrow(), |buckets| buckets.to_create.as_slice())
    }

    pub fn to_update(&self) -> Ref<'_, [T]> {
        Ref::map(self.buckets.borrow(), |buckets| buckets.to_update.as_slice())
    }

    pub fn to_delete(&self) -> Ref<'_, [T]> {
        Ref::map(self.buckets.borrow(), |buckets| buckets.to_delete.as_slice())
    }

    pub fn has_staged_changes(&self) -> bool {
        self.buckets.borrow().has_staged_changes()
    }

    /// Whether a deferred save still waits for its coordinator.
    pub fn is_pending_transaction(&self) -> bool {
        self.buckets.borrow().pending_transaction
    }

    pub fn options(&self) -> &WriterOptions {
        &self.options
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    pub fn repository_mut(&mut self) -> &mut R {
        &mut self.repository
    }
}

impl<T, R> TransactionParticipant for Writer<T, R> {
    fn commit(&mut self) -> TxResult<()> {
        Writer::commit(self);
        Ok(())
    }

    fn rollback(&mut self) -> TxResult<()> {
        Writer::rollback(self);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::Writer;
    use crate::config::{RollbackPolicy, WriterOptions};
    use crate::repo::memory_repo::{MemoryRepository, RepoCall, RepoOp};
    use crate::tx::{TransactionParticipant, TransactionScope};

    type Item = (u32, &'static str);
    type TestWriter = Writer<Item, MemoryRepository<Item>>;

    fn same_key(a: &Item, b: &Item) -> bool {
        a.0 == b.0
    }

    fn writer() -> TestWriter {
        Writer::new(MemoryRepository::new(same_key), same_key)
    }

    fn discarding_writer() -> TestWriter {
        let options = WriterOptions {
            rollback_policy: RollbackPolicy::Discard,
        };
        Writer::with_options(MemoryRepository::new(same_key), same_key, options)
    }

    #[test]
    fn restore_after_delete_returns_value_to_current() {
        let mut writer = writer();
        writer.load([(1, "a")]);

        writer.delete([(1, "a")]);
        assert!(writer.current().is_empty());
        assert_eq!(&*writer.to_delete(), &[(1, "a")]);

        writer.restore((1, "a"));
        assert_eq!(&*writer.current(), &[(1, "a")]);
        assert!(writer.to_delete().is_empty());
    }

    #[test]
    fn restore_does_not_deduplicate_current() {
        let mut writer = writer();
        writer.load([(1, "a")]);
        writer.restore((1, "a"));
        assert_eq!(writer.current().len(), 2);
    }

    #[test]
    fn delete_of_uncommitted_create_cancels_it() {
        let mut writer = writer();
        writer.add_to_create([(7, "new")]);

        writer.delete([(7, "new")]);
        assert!(writer.to_create().is_empty());
        assert!(writer.to_delete().is_empty());
        assert!(!writer.has_staged_changes());
    }

    #[test]
    fn delete_of_staged_update_moves_it_out_of_to_update() {
        let mut writer = writer();
        writer.load([(1, "a"), (2, "b")]);
        writer.set_to_update((2, "b2"));

        writer.delete([(2, "b2")]);
        assert!(writer.to_update().is_empty());
        assert_eq!(&*writer.current(), &[(1, "a")]);
        assert_eq!(&*writer.to_delete(), &[(2, "b2")]);
    }

    #[test]
    fn delete_ignores_untracked_values() {
        let mut writer = writer();
        writer.load([(1, "a")]);
        writer.delete([(9, "ghost")]);
        assert_eq!(&*writer.current(), &[(1, "a")]);
        assert!(!writer.has_staged_changes());
    }

    #[test]
    fn set_to_update_moves_from_current_with_new_value() {
        let mut writer = writer();
        writer.load([(1, "a"), (2, "b")]);

        writer.set_to_update((1, "a2"));
        assert_eq!(&*writer.current(), &[(2, "b")]);
        assert_eq!(&*writer.to_update(), &[(1, "a2")]);
    }

    #[test]
    fn set_to_update_revives_staged_delete() {
        let mut writer = writer();
        writer.load([(1, "a"), (2, "b")]);
        writer.delete([(1, "a")]);

        writer.set_to_update((1, "a2"));
        assert!(writer.to_delete().is_empty());
        assert_eq!(&*writer.current(), &[(2, "b")]);
        assert_eq!(&*writer.to_update(), &[(1, "a2")]);
    }

    #[test]
    fn set_to_update_ignores_unknown_and_created_values() {
        let mut writer = writer();
        writer.add_to_create([(5, "new")]);
        writer.set_to_update((5, "new2"));
        writer.set_to_update((6, "ghost"));

        assert!(writer.to_update().is_empty());
        assert_eq!(&*writer.to_create(), &[(5, "new")]);
    }

    #[test]
    fn get_all_active_concatenates_live_buckets_in_order() {
        let mut writer = writer();
        writer.load([(1, "a"), (2, "b"), (3, "c")]);
        writer.add_to_create([(4, "d")]);
        writer.set_to_update((2, "b2"));
        writer.delete([(3, "c")]);

        assert_eq!(writer.get_all_active(), vec![(1, "a"), (4, "d"), (2, "b2")]);
    }

    #[test]
    fn search_prefers_current_then_create_then_update() {
        let mut writer = writer();
        writer.load([(1, "x")]);
        writer.add_to_create([(2, "x"), (3, "y")]);

        assert_eq!(writer.search(|item| item.1 == "x"), Some((1, "x")));
        assert_eq!(writer.search(|item| item.1 == "y"), Some((3, "y")));
        assert_eq!(writer.search(|item| item.1 == "z"), None);
    }

    #[test]
    fn search_or_default_returns_default_on_miss() {
        let mut writer = writer();
        writer.load([(1, "a")]);
        assert_eq!(writer.search_or_default(|item| item.0 == 42), (0, ""));
        assert_eq!(writer.search_or_default(|item| item.0 == 1), (1, "a"));
    }

    #[test]
    fn save_flushes_delete_create_update_in_order() {
        let mut writer = writer();
        writer.load([(1, "a"), (2, "b")]);
        writer.delete([(1, "a")]);
        writer.add_to_create([(3, "c")]);
        writer.set_to_update((2, "b2"));

        writer.save(None).unwrap();

        assert_eq!(
            writer.repository().calls(),
            &[
                RepoCall {
                    op: RepoOp::Delete,
                    batch: vec![(1, "a")],
                },
                RepoCall {
                    op: RepoOp::Create,
                    batch: vec![(3, "c")],
                },
                RepoCall {
                    op: RepoOp::Update,
                    batch: vec![(2, "b2")],
                },
            ]
        );
    }

    #[test]
    fn save_without_coordinator_commits() {
        let mut writer = writer();
        writer.load([(1, "a"), (2, "b")]);
        writer.add_to_create([(3, "c")]);
        writer.set_to_update((2, "b2"));

        writer.save(None).unwrap();

        assert_eq!(&*writer.current(), &[(1, "a"), (3, "c"), (2, "b2")]);
        assert!(!writer.has_staged_changes());
        assert!(!writer.is_pending_transaction());
    }

    #[test]
    fn failed_delete_skips_create_and_update_and_keeps_buckets() {
        let mut writer = writer();
        writer.load([(1, "a")]);
        writer.delete([(1, "a")]);
        writer.add_to_create([(2, "b")]);
        writer.repository_mut().fail_on(RepoOp::Delete, "locked");

        let err = writer.save(None).unwrap_err();
        assert_eq!(err.to_string(), "injected delete failure: locked");
        assert_eq!(writer.repository().ops(), vec![RepoOp::Delete]);
        assert_eq!(&*writer.to_delete(), &[(1, "a")]);
        assert_eq!(&*writer.to_create(), &[(2, "b")]);
    }

    #[test]
    fn failed_create_skips_update() {
        let mut writer = writer();
        writer.load([(1, "a")]);
        writer.set_to_update((1, "a2"));
        writer.add_to_create([(2, "b")]);
        writer.repository_mut().fail_on(RepoOp::Create, "conflict");

        assert!(writer.save(None).is_err());
        assert_eq!(
            writer.repository().ops(),
            vec![RepoOp::Delete, RepoOp::Create]
        );
        assert_eq!(&*writer.to_update(), &[(1, "a2")]);
    }

    #[test]
    fn save_with_coordinator_defers_fold_until_commit() {
        let mut writer = writer();
        writer.add_to_create([(1, "a")]);

        let mut scope = TransactionScope::new();
        writer.save(Some(&mut scope)).unwrap();

        assert!(writer.is_pending_transaction());
        assert_eq!(&*writer.to_create(), &[(1, "a")]);
        assert!(writer.current().is_empty());

        scope.commit().unwrap();
        assert_eq!(&*writer.current(), &[(1, "a")]);
        assert!(!writer.has_staged_changes());
        assert!(!writer.is_pending_transaction());
    }

    #[test]
    fn retain_rollback_keeps_staged_buckets() {
        let mut writer = writer();
        writer.load([(1, "a")]);
        writer.delete([(1, "a")]);
        writer.add_to_create([(2, "b")]);

        let mut scope = TransactionScope::new();
        writer.save(Some(&mut scope)).unwrap();
        scope.rollback().unwrap();

        assert!(!writer.is_pending_transaction());
        assert_eq!(&*writer.to_delete(), &[(1, "a")]);
        assert_eq!(&*writer.to_create(), &[(2, "b")]);

        writer.save(None).unwrap();
        assert_eq!(writer.repository().calls().len(), 6);
    }

    #[test]
    fn discard_rollback_restores_pre_staging_view() {
        let mut writer = discarding_writer();
        writer.load([(1, "a"), (2, "b")]);
        writer.delete([(1, "a")]);
        writer.set_to_update((2, "b2"));
        writer.add_to_create([(3, "c")]);

        let mut scope = TransactionScope::new();
        writer.save(Some(&mut scope)).unwrap();
        scope.rollback().unwrap();

        assert_eq!(&*writer.current(), &[(1, "a"), (2, "b")]);
        assert!(!writer.has_staged_changes());
    }

    #[test]
    fn discard_rollback_restores_persisted_value_of_updated_then_deleted_entity() {
        let mut writer = discarding_writer();
        writer.load([(1, "a")]);
        writer.set_to_update((1, "a2"));
        writer.delete([(1, "a2")]);
        assert_eq!(&*writer.to_delete(), &[(1, "a2")]);

        let mut scope = TransactionScope::new();
        writer.save(Some(&mut scope)).unwrap();
        scope.rollback().unwrap();

        assert_eq!(&*writer.current(), &[(1, "a")]);
        assert!(!writer.has_staged_changes());
    }

    #[test]
    fn commit_forgets_persisted_values_before_later_discard() {
        let mut writer = discarding_writer();
        writer.load([(1, "a")]);
        writer.set_to_update((1, "a2"));
        writer.save(None).unwrap();

        writer.add_to_create([(2, "b")]);
        let mut scope = TransactionScope::new();
        writer.save(Some(&mut scope)).unwrap();
        scope.rollback().unwrap();

        assert_eq!(&*writer.current(), &[(1, "a2")]);
    }

    #[test]
    fn restore_drops_recorded_persisted_value() {
        let mut writer = discarding_writer();
        writer.load([(1, "a")]);
        writer.delete([(1, "a")]);
        writer.restore((1, "a"));

        writer.rollback();
        assert_eq!(&*writer.current(), &[(1, "a")]);
    }

    #[test]
    fn contains_sees_live_buckets_only() {
        let mut writer = writer();
        writer.load([(1, "a"), (2, "b")]);
        writer.add_to_create([(3, "c")]);
        writer.set_to_update((2, "b2"));
        writer.delete([(1, "a")]);

        assert!(!writer.contains(&(1, "a")));
        assert!(writer.contains(&(2, "any")));
        assert!(writer.contains(&(3, "c")));
        assert!(!writer.contains(&(4, "d")));
    }

    #[test]
    fn options_reflect_construction() {
        assert_eq!(writer().options().rollback_policy, RollbackPolicy::Retain);
        assert_eq!(
            discarding_writer().options().rollback_policy,
            RollbackPolicy::Discard
        );
    }

    #[test]
    fn writer_is_itself_a_participant() {
        let mut writer = writer();
        writer.add_to_create([(1, "a")]);

        TransactionParticipant::commit(&mut writer).unwrap();
        assert_eq!(&*writer.current(), &[(1, "a")]);
        TransactionParticipant::rollback(&mut writer).unwrap();
        assert_eq!(&*writer.current(), &[(1, "a")]);
    }
}
