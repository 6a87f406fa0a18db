//! In-memory reference adapter.
//!
//! This adapter is deterministic and test-friendly, and its results define the query
//! semantics every other backend must reproduce. Inserts reject duplicate identifiers;
//! batch deletes ignore identifiers that are not stored. A [`MemoryStore`] keeps one
//! table per record type and one undo/redo log across all of them.

use crate::context::StoreContext;
use crate::eval::run_query;
use crate::model::{Storable, Viewable};
use crate::query::{Query, QueryOption, Sort};
use crate::stack::{Operation, OperationLog};
use crate::traits::{Adapter, Connection, QueryWindow, ReadAdapter};
use crate::{StorageError, StorageResult};
use async_trait::async_trait;
use std::any::{Any, TypeId};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::marker::PhantomData;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

/// Records of one table, keyed logically by identifier.
#[derive(Debug, Clone)]
pub struct MemoryTable<R> {
    records: Vec<R>,
}

impl<R> Default for MemoryTable<R> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
        }
    }
}

impl<R: Viewable> MemoryTable<R> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table from existing records, rejecting duplicate identifiers.
    pub fn from_records(records: Vec<R>) -> StorageResult<Self> {
        let mut table = Self::new();
        table.insert_all(records)?;
        Ok(table)
    }

    pub fn records(&self) -> &[R] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.records.iter().position(|record| record.id() == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.position(id).is_some()
    }

    pub fn get(&self, id: &str) -> StorageResult<R> {
        self.position(id)
            .map(|index| self.records[index].clone())
            .ok_or_else(|| StorageError::NoResult(format!("{} {id} not found", R::TABLE)))
    }

    pub fn insert(&mut self, record: R) -> StorageResult<()> {
        if self.contains(record.id()) {
            return Err(StorageError::InsertFailed(format!(
                "{} {} already exists",
                R::TABLE,
                record.id()
            )));
        }
        self.records.push(record);
        Ok(())
    }

    /// All-or-nothing insert.
    pub fn insert_all(&mut self, records: Vec<R>) -> StorageResult<()> {
        let mut seen = HashSet::new();
        for record in &records {
            if self.contains(record.id()) || !seen.insert(record.id()) {
                return Err(StorageError::InsertFailed(format!(
                    "{} {} already exists",
                    R::TABLE,
                    record.id()
                )));
            }
        }
        self.records.extend(records);
        Ok(())
    }

    /// Delete-then-insert by identifier. Returns the replaced record.
    pub fn replace(&mut self, record: R) -> StorageResult<R> {
        let index = self.position(record.id()).ok_or_else(|| {
            StorageError::UpdateFailed(format!("{} {} does not exist", R::TABLE, record.id()))
        })?;
        let previous = self.records.remove(index);
        self.records.push(record);
        Ok(previous)
    }

    /// Replace every record, or none if any is missing or repeated.
    pub fn replace_all(&mut self, records: Vec<R>) -> StorageResult<Vec<R>> {
        let mut seen = HashSet::new();
        for record in &records {
            if !self.contains(record.id()) {
                return Err(StorageError::UpdateFailed(format!(
                    "{} {} does not exist",
                    R::TABLE,
                    record.id()
                )));
            }
            if !seen.insert(record.id()) {
                return Err(StorageError::UpdateFailed(format!(
                    "{} {} appears more than once",
                    R::TABLE,
                    record.id()
                )));
            }
        }
        records
            .into_iter()
            .map(|record| self.replace(record))
            .collect()
    }

    pub fn remove(&mut self, id: &str) -> StorageResult<R> {
        let index = self.position(id).ok_or_else(|| {
            StorageError::DeleteFailed(format!("{} {id} does not exist", R::TABLE))
        })?;
        Ok(self.records.remove(index))
    }

    /// Remove whichever of `ids` are stored and return them. Missing ids are skipped.
    pub fn remove_all(&mut self, ids: &[String]) -> Vec<R> {
        let wanted: HashSet<&str> = ids.iter().map(String::as_str).collect();
        let (removed, kept): (Vec<R>, Vec<R>) = std::mem::take(&mut self.records)
            .into_iter()
            .partition(|record| wanted.contains(record.id()));
        self.records = kept;
        removed
    }

    pub fn select(&self, query: Option<&Query>, sorts: &[Sort], window: QueryWindow) -> Vec<R> {
        run_query(&self.records, query, sorts, window)
    }

    pub fn select_ids(&self, ids: &[String], sorts: &[Sort], window: QueryWindow) -> Vec<R> {
        let wanted: HashSet<&str> = ids.iter().map(String::as_str).collect();
        run_query(
            self.records
                .iter()
                .filter(|record| wanted.contains(record.id())),
            None,
            sorts,
            window,
        )
    }

    pub fn count(&self, query: Option<&Query>) -> usize {
        match query {
            Some(query) => self.records.iter().filter(|r| query.evaluate(*r)).count(),
            None => self.records.len(),
        }
    }
}

/// Per-record-type tables of one store.
#[derive(Default)]
pub(crate) struct Tables {
    tables: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl Tables {
    pub(crate) fn table<R: Viewable>(&self) -> Option<&MemoryTable<R>> {
        self.tables
            .get(&TypeId::of::<R>())
            .and_then(|table| table.downcast_ref::<MemoryTable<R>>())
    }

    /// Table for `R`, created empty on first use.
    pub(crate) fn table_mut<R: Viewable>(&mut self) -> StorageResult<&mut MemoryTable<R>> {
        self.tables
            .entry(TypeId::of::<R>())
            .or_insert_with(|| Box::new(MemoryTable::<R>::new()) as Box<dyn Any + Send + Sync>)
            .downcast_mut::<MemoryTable<R>>()
            .ok_or_else(|| StorageError::EntityNotFound(R::TABLE.name().to_string()))
    }

    /// Run `f` against the table for `R`; a table never written reads as empty.
    fn read<R: Viewable, T>(&self, f: impl FnOnce(&MemoryTable<R>) -> T) -> T {
        match self.table::<R>() {
            Some(table) => f(table),
            None => f(&MemoryTable::new()),
        }
    }
}

#[derive(Default)]
struct StoreState {
    tables: Tables,
    log: OperationLog,
}

/// In-memory store holding one table per record type and a single undo/redo log.
///
/// Per-type adapters returned by [`MemoryStore::adapter`] share the store's state, so an
/// undo through any of them reverts the latest mutation of the whole store.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<RwLock<StoreState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adapter serving `R` from this store.
    pub fn adapter<R: Viewable>(&self) -> MemoryAdapter<R> {
        MemoryAdapter {
            store: self.clone(),
            _record: PhantomData,
        }
    }

    /// Register the adapter for `R` in `context`.
    pub fn register<R: Viewable>(&self, context: &mut StoreContext) {
        context.register::<R, _>(Arc::new(self.adapter::<R>()));
    }

    /// Load records without logging them.
    pub fn seed<R: Viewable>(&self, records: Vec<R>) -> StorageResult<()> {
        let count = records.len();
        self.write()?.tables.table_mut::<R>()?.insert_all(records)?;
        debug!(table = %R::TABLE, count, "seeded records");
        Ok(())
    }

    fn read(&self) -> StorageResult<RwLockReadGuard<'_, StoreState>> {
        self.state
            .read()
            .map_err(|_| StorageError::SaveFailed("memory store lock poisoned".to_string()))
    }

    fn write(&self) -> StorageResult<RwLockWriteGuard<'_, StoreState>> {
        self.state
            .write()
            .map_err(|_| StorageError::SaveFailed("memory store lock poisoned".to_string()))
    }

    /// Copy of every stored `R`, in storage order.
    pub fn snapshot<R: Viewable>(&self) -> StorageResult<Vec<R>> {
        Ok(self.read()?.tables.read(|table: &MemoryTable<R>| table.records().to_vec()))
    }

    pub fn undo(&self) -> StorageResult<bool> {
        let mut guard = self.write()?;
        let StoreState { tables, log } = &mut *guard;
        let table = log.next_undo().map(|(_, table)| table.to_string());
        let undone = log.undo(tables)?;
        debug!(table = ?table, undone, "undo");
        Ok(undone)
    }

    pub fn redo(&self) -> StorageResult<bool> {
        let mut guard = self.write()?;
        let StoreState { tables, log } = &mut *guard;
        let table = log.next_redo().map(|(_, table)| table.to_string());
        let redone = log.redo(tables)?;
        debug!(table = ?table, redone, "redo");
        Ok(redone)
    }

    pub fn can_undo(&self) -> StorageResult<bool> {
        Ok(self.read()?.log.can_undo())
    }

    pub fn can_redo(&self) -> StorageResult<bool> {
        Ok(self.read()?.log.can_redo())
    }

    pub fn clear_history(&self) -> StorageResult<()> {
        self.write()?.log.clear();
        Ok(())
    }
}

impl fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryStore").finish_non_exhaustive()
    }
}

/// In-memory adapter for one record type, backed by a [`MemoryStore`].
pub struct MemoryAdapter<R> {
    store: MemoryStore,
    _record: PhantomData<fn() -> R>,
}

impl<R: Viewable> Default for MemoryAdapter<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Viewable> MemoryAdapter<R> {
    /// Adapter over a private store of its own.
    pub fn new() -> Self {
        MemoryStore::new().adapter()
    }

    /// Private store seeded with `records`, which are not logged.
    pub fn with_records(records: Vec<R>) -> StorageResult<Self> {
        let store = MemoryStore::new();
        store.seed(records)?;
        Ok(store.adapter())
    }

    /// The store this adapter reads and writes.
    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    pub fn snapshot(&self) -> StorageResult<Vec<R>> {
        self.store.snapshot()
    }

    /// Revert the latest mutation of the backing store, whichever table it touched.
    pub fn undo(&self) -> StorageResult<bool> {
        self.store.undo()
    }

    pub fn redo(&self) -> StorageResult<bool> {
        self.store.redo()
    }

    pub fn can_undo(&self) -> StorageResult<bool> {
        self.store.can_undo()
    }

    pub fn can_redo(&self) -> StorageResult<bool> {
        self.store.can_redo()
    }

    pub fn clear_history(&self) -> StorageResult<()> {
        self.store.clear_history()
    }

    fn read<T>(&self, f: impl FnOnce(&MemoryTable<R>) -> T) -> StorageResult<T> {
        Ok(self.store.read()?.tables.read(f))
    }

    /// Apply `f` to the table and log the operation it returns.
    fn mutate<T>(
        &self,
        f: impl FnOnce(&mut MemoryTable<R>) -> StorageResult<(T, Operation<R>)>,
    ) -> StorageResult<T> {
        let mut guard = self.store.write()?;
        let StoreState { tables, log } = &mut *guard;
        let (output, operation) = f(tables.table_mut::<R>()?)?;
        log.record(operation);
        Ok(output)
    }
}

impl<R> fmt::Debug for MemoryAdapter<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryAdapter").finish_non_exhaustive()
    }
}

#[async_trait]
impl<R: Viewable> Connection for MemoryAdapter<R> {
    async fn connect(&self) -> StorageResult<bool> {
        Ok(true)
    }

    async fn disconnect(&self) -> StorageResult<bool> {
        Ok(true)
    }
}

#[async_trait]
impl<R: Viewable> ReadAdapter<R> for MemoryAdapter<R> {
    async fn find(&self, id: &str, _options: &[QueryOption]) -> StorageResult<R> {
        self.read(|table| table.get(id))?
    }

    async fn find_all(
        &self,
        ids: &[String],
        sorts: &[Sort],
        window: QueryWindow,
        _options: &[QueryOption],
    ) -> StorageResult<Vec<R>> {
        self.read(|table| table.select_ids(ids, sorts, window))
    }

    async fn fetch(
        &self,
        query: Option<&Query>,
        sorts: &[Sort],
        window: QueryWindow,
        _options: &[QueryOption],
    ) -> StorageResult<Vec<R>> {
        let records = self.read(|table| table.select(query, sorts, window))?;
        debug!(
            table = %R::TABLE,
            query = %query.map(ToString::to_string).unwrap_or_default(),
            results = records.len(),
            "fetched records"
        );
        Ok(records)
    }

    async fn count(&self, query: Option<&Query>, _options: &[QueryOption]) -> StorageResult<usize> {
        self.read(|table| table.count(query))
    }
}

#[async_trait]
impl<R: Storable> Adapter<R> for MemoryAdapter<R> {
    async fn insert(&self, record: R, _options: &[QueryOption]) -> StorageResult<R> {
        let stored = record.clone();
        self.mutate(|table| {
            table.insert(stored.clone())?;
            Ok(((), Operation::insert(vec![stored])))
        })?;
        debug!(table = %R::TABLE, id = %record.id(), "inserted record");
        Ok(record)
    }

    async fn insert_all(&self, records: Vec<R>, _options: &[QueryOption]) -> StorageResult<Vec<R>> {
        let stored = records.clone();
        self.mutate(|table| {
            table.insert_all(stored.clone())?;
            Ok(((), Operation::insert(stored)))
        })?;
        debug!(table = %R::TABLE, count = records.len(), "inserted records");
        Ok(records)
    }

    async fn update(&self, record: R, _options: &[QueryOption]) -> StorageResult<R> {
        let stored = record.clone();
        self.mutate(|table| {
            let previous = table.replace(stored.clone())?;
            Ok(((), Operation::update(vec![stored], vec![previous])))
        })?;
        debug!(table = %R::TABLE, id = %record.id(), "updated record");
        Ok(record)
    }

    async fn update_all(&self, records: Vec<R>, _options: &[QueryOption]) -> StorageResult<Vec<R>> {
        let stored = records.clone();
        self.mutate(|table| {
            let previous = table.replace_all(stored.clone())?;
            Ok(((), Operation::update(stored, previous)))
        })?;
        debug!(table = %R::TABLE, count = records.len(), "updated records");
        Ok(records)
    }

    async fn delete(&self, id: &str, _options: &[QueryOption]) -> StorageResult<bool> {
        self.mutate(|table| {
            let removed = table.remove(id)?;
            Ok(((), Operation::delete(vec![removed])))
        })?;
        debug!(table = %R::TABLE, id = %id, "deleted record");
        Ok(true)
    }

    async fn delete_all(&self, ids: &[String], _options: &[QueryOption]) -> StorageResult<bool> {
        let removed = self.mutate(|table| {
            let removed = table.remove_all(ids);
            Ok((removed.len(), Operation::delete(removed)))
        })?;
        debug!(
            table = %R::TABLE,
            requested = ids.len(),
            removed,
            "deleted records"
        );
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Table, Value};
    use crate::query::Expression;

    #[derive(Debug, Clone, PartialEq)]
    struct Owner {
        id: String,
        name: String,
    }

    impl Viewable for Owner {
        const TABLE: Table = Table::new("owners", "owner_id");

        fn id(&self) -> &str {
            &self.id
        }

        fn field(&self, key: &str) -> Value {
            match key {
                "name" => Value::from(&self.name),
                _ => Value::Null,
            }
        }
    }

    impl Storable for Owner {}

    fn owner(id: &str, name: &str) -> Owner {
        Owner {
            id: id.into(),
            name: name.into(),
        }
    }

    #[test]
    fn insert_all_rejects_duplicates_within_batch() {
        let mut table = MemoryTable::new();
        let result = table.insert_all(vec![owner("o1", "a"), owner("o1", "b")]);
        assert!(matches!(result, Err(StorageError::InsertFailed(_))));
        assert!(table.is_empty());
    }

    #[test]
    fn replace_moves_record_to_the_end() {
        let mut table =
            MemoryTable::from_records(vec![owner("o1", "a"), owner("o2", "b")]).unwrap();
        let previous = table.replace(owner("o1", "z")).unwrap();
        assert_eq!(previous.name, "a");
        assert_eq!(table.records()[1], owner("o1", "z"));
    }

    #[test]
    fn remove_all_skips_missing_ids() {
        let mut table =
            MemoryTable::from_records(vec![owner("o1", "a"), owner("o2", "b")]).unwrap();
        let removed = table.remove_all(&["o2".to_string(), "nope".to_string()]);
        assert_eq!(removed, vec![owner("o2", "b")]);
        assert_eq!(table.len(), 1);
    }

    #[tokio::test]
    async fn update_all_is_atomic() {
        let adapter = MemoryAdapter::with_records(vec![owner("o1", "a")]).unwrap();
        let result = adapter
            .update_all(vec![owner("o1", "changed"), owner("o9", "ghost")], &[])
            .await;
        assert!(matches!(result, Err(StorageError::UpdateFailed(_))));
        assert_eq!(adapter.find("o1", &[]).await.unwrap().name, "a");
        assert!(!adapter.can_undo().unwrap());
    }

    #[tokio::test]
    async fn update_all_rejects_repeated_ids() {
        let adapter = MemoryAdapter::with_records(vec![owner("o1", "a")]).unwrap();
        let result = adapter
            .update_all(vec![owner("o1", "b"), owner("o1", "c")], &[])
            .await;
        assert!(matches!(result, Err(StorageError::UpdateFailed(_))));
        assert_eq!(adapter.find("o1", &[]).await.unwrap().name, "a");
    }

    #[tokio::test]
    async fn empty_batches_leave_no_history() {
        let adapter = MemoryAdapter::<Owner>::new();
        adapter.insert_all(Vec::new(), &[]).await.unwrap();
        adapter.update_all(Vec::new(), &[]).await.unwrap();
        adapter.delete_all(&[], &[]).await.unwrap();
        assert!(!adapter.can_undo().unwrap());
        assert!(!adapter.undo().unwrap());
    }

    #[derive(Debug, Clone, PartialEq)]
    struct Pet {
        id: String,
        owner_id: String,
    }

    impl Viewable for Pet {
        const TABLE: Table = Table::new("pets", "pet_id");

        fn id(&self) -> &str {
            &self.id
        }

        fn field(&self, key: &str) -> Value {
            match key {
                "owner_id" => Value::from(&self.owner_id),
                _ => Value::Null,
            }
        }
    }

    impl Storable for Pet {}

    #[tokio::test]
    async fn store_undo_spans_tables() {
        let store = MemoryStore::new();
        let owners = store.adapter::<Owner>();
        let pets = store.adapter::<Pet>();

        owners.insert(owner("o1", "a"), &[]).await.unwrap();
        pets.insert(
            Pet {
                id: "p1".into(),
                owner_id: "o1".into(),
            },
            &[],
        )
        .await
        .unwrap();

        // The latest mutation touched pets, even though undo goes through owners.
        assert!(owners.undo().unwrap());
        assert_eq!(pets.count(None, &[]).await.unwrap(), 0);
        assert_eq!(owners.count(None, &[]).await.unwrap(), 1);

        assert!(store.undo().unwrap());
        assert_eq!(owners.count(None, &[]).await.unwrap(), 0);
        assert!(!store.can_undo().unwrap());

        assert!(pets.redo().unwrap());
        assert_eq!(owners.count(None, &[]).await.unwrap(), 1);
        assert_eq!(pets.count(None, &[]).await.unwrap(), 0);
        assert!(store.redo().unwrap());
        assert_eq!(pets.find("p1", &[]).await.unwrap().owner_id, "o1");
    }

    #[tokio::test]
    async fn registered_views_share_the_store() {
        let store = MemoryStore::new();
        store.seed(vec![owner("o1", "a")]).unwrap();
        let mut context = StoreContext::new();
        store.register::<Owner>(&mut context);

        let reader = context.reader::<Owner>().unwrap();
        assert_eq!(reader.find("o1", &[]).await.unwrap().name, "a");

        store.adapter::<Owner>().delete("o1", &[]).await.unwrap();
        assert!(matches!(
            reader.find("o1", &[]).await,
            Err(StorageError::NoResult(_))
        ));
        assert_eq!(store.snapshot::<Owner>().unwrap(), Vec::<Owner>::new());
    }

    #[tokio::test]
    async fn count_with_and_without_query() {
        let adapter =
            MemoryAdapter::with_records(vec![owner("o1", "a"), owner("o2", "b")]).unwrap();
        assert_eq!(adapter.count(None, &[]).await.unwrap(), 2);
        let query = Query::expression(Expression::equal("name", "b"));
        assert_eq!(adapter.count(Some(&query), &[]).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn find_all_sorts_and_pages_existing_ids() {
        let adapter = MemoryAdapter::with_records(vec![
            owner("o1", "a"),
            owner("o2", "b"),
            owner("o3", "c"),
        ])
        .unwrap();
        let ids = vec!["o1".to_string(), "o3".to_string(), "missing".to_string()];
        let found = adapter
            .find_all(&ids, &[Sort::descending("name")], QueryWindow::limit(1), &[])
            .await
            .unwrap();
        assert_eq!(found, vec![owner("o3", "c")]);
    }
}
