//! Store-wide undo/redo log for in-memory mutations.
//!
//! Every table of a [`MemoryStore`](crate::MemoryStore) shares one log, so undo reverts
//! the latest mutation regardless of which record type it touched.

use crate::memory::{MemoryTable, Tables};
use crate::model::{Table, Viewable};
use crate::StorageResult;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Insert,
    Update,
    Delete,
}

/// One logged mutation.
///
/// For updates, `previous` holds the snapshots that `records` replaced.
#[derive(Debug, Clone)]
pub struct Operation<R> {
    pub kind: OperationKind,
    pub records: Vec<R>,
    pub previous: Vec<R>,
    pub table: Table,
}

impl<R: Viewable> Operation<R> {
    pub fn insert(records: Vec<R>) -> Self {
        Self {
            kind: OperationKind::Insert,
            records,
            previous: Vec::new(),
            table: R::TABLE,
        }
    }

    pub fn update(records: Vec<R>, previous: Vec<R>) -> Self {
        Self {
            kind: OperationKind::Update,
            records,
            previous,
            table: R::TABLE,
        }
    }

    pub fn delete(records: Vec<R>) -> Self {
        Self {
            kind: OperationKind::Delete,
            records,
            previous: Vec::new(),
            table: R::TABLE,
        }
    }

    pub fn inverse(self) -> Self {
        match self.kind {
            OperationKind::Insert => Self {
                kind: OperationKind::Delete,
                ..self
            },
            OperationKind::Delete => Self {
                kind: OperationKind::Insert,
                ..self
            },
            OperationKind::Update => Self {
                kind: OperationKind::Update,
                records: self.previous,
                previous: self.records,
                table: self.table,
            },
        }
    }

    pub(crate) fn apply(&self, table: &mut MemoryTable<R>) -> StorageResult<()> {
        match self.kind {
            OperationKind::Insert => table.insert_all(self.records.clone()),
            OperationKind::Update => table.replace_all(self.records.clone()).map(|_| ()),
            OperationKind::Delete => {
                let ids: Vec<String> = self.records.iter().map(|r| r.id().to_string()).collect();
                table.remove_all(&ids);
                Ok(())
            }
        }
    }
}

/// An [`Operation`] with its record type erased.
pub(crate) trait LoggedOperation: Send + Sync {
    fn kind(&self) -> OperationKind;

    fn table(&self) -> &Table;

    fn apply_to(&self, tables: &mut Tables) -> StorageResult<()>;

    fn inverted(self: Box<Self>) -> Box<dyn LoggedOperation>;
}

impl<R: Viewable> LoggedOperation for Operation<R> {
    fn kind(&self) -> OperationKind {
        self.kind
    }

    fn table(&self) -> &Table {
        &self.table
    }

    fn apply_to(&self, tables: &mut Tables) -> StorageResult<()> {
        self.apply(tables.table_mut::<R>()?)
    }

    fn inverted(self: Box<Self>) -> Box<dyn LoggedOperation> {
        Box::new((*self).inverse())
    }
}

/// Two-stack operation log shared by every table of a store.
#[derive(Default)]
pub struct OperationLog {
    undo: Vec<Box<dyn LoggedOperation>>,
    redo: Vec<Box<dyn LoggedOperation>>,
}

impl OperationLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Log a fresh mutation and discard pending redo history. Operations that touch no
    /// records are not logged.
    pub fn record<R: Viewable>(&mut self, operation: Operation<R>) {
        if operation.records.is_empty() {
            return;
        }
        self.undo.push(Box::new(operation));
        self.redo.clear();
    }

    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    /// Kind and table of the operation `undo` would revert.
    pub fn next_undo(&self) -> Option<(OperationKind, &Table)> {
        self.undo.last().map(|op| (op.kind(), op.table()))
    }

    /// Kind and table of the operation `redo` would re-apply.
    pub fn next_redo(&self) -> Option<(OperationKind, &Table)> {
        self.redo.last().map(|op| (op.kind(), op.table()))
    }

    pub fn clear(&mut self) {
        self.undo.clear();
        self.redo.clear();
    }

    /// Revert the latest operation. Returns `false` when there is nothing to undo.
    pub(crate) fn undo(&mut self, tables: &mut Tables) -> StorageResult<bool> {
        let Some(operation) = self.undo.pop() else {
            return Ok(false);
        };
        let inverse = operation.inverted();
        if let Err(error) = inverse.apply_to(tables) {
            self.undo.push(inverse.inverted());
            return Err(error);
        }
        self.redo.push(inverse);
        Ok(true)
    }

    /// Re-apply the latest undone operation. Returns `false` when there is nothing to redo.
    pub(crate) fn redo(&mut self, tables: &mut Tables) -> StorageResult<bool> {
        let Some(operation) = self.redo.pop() else {
            return Ok(false);
        };
        let inverse = operation.inverted();
        if let Err(error) = inverse.apply_to(tables) {
            self.redo.push(inverse.inverted());
            return Err(error);
        }
        self.undo.push(inverse);
        Ok(true)
    }
}

impl fmt::Debug for OperationLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationLog")
            .field("undo", &self.undo.len())
            .field("redo", &self.redo.len())
            .finish()
    }
}
