use crate::model::{Storable, Viewable};
use crate::query::{Query, QueryOption, Sort};
use crate::StorageResult;
use async_trait::async_trait;

/// Generic query window for paged reads. `limit == 0` means unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryWindow {
    pub limit: usize,
    pub offset: usize,
}

impl QueryWindow {
    pub const ALL: QueryWindow = QueryWindow {
        limit: 0,
        offset: 0,
    };

    pub fn new(limit: usize, offset: usize) -> Self {
        Self { limit, offset }
    }

    pub fn limit(limit: usize) -> Self {
        Self { limit, offset: 0 }
    }
}

/// Backend lifecycle. Backends without a connection step succeed trivially.
#[async_trait]
pub trait Connection: Send + Sync {
    async fn connect(&self) -> StorageResult<bool>;

    async fn disconnect(&self) -> StorageResult<bool>;
}

/// Read side of the adapter contract for one record type.
#[async_trait]
pub trait ReadAdapter<R: Viewable>: Connection {
    /// Fetch exactly one record; a missing id is [`StorageError::NoResult`](crate::StorageError::NoResult).
    async fn find(&self, id: &str, options: &[QueryOption]) -> StorageResult<R>;

    /// Fetch the existing records among `ids`, sorted and paged.
    async fn find_all(
        &self,
        ids: &[String],
        sorts: &[Sort],
        window: QueryWindow,
        options: &[QueryOption],
    ) -> StorageResult<Vec<R>>;

    /// General filter/sort/page read. `None` matches every record.
    async fn fetch(
        &self,
        query: Option<&Query>,
        sorts: &[Sort],
        window: QueryWindow,
        options: &[QueryOption],
    ) -> StorageResult<Vec<R>>;

    async fn count(&self, query: Option<&Query>, options: &[QueryOption]) -> StorageResult<usize>;
}

/// Full read-write adapter contract for one record type.
#[async_trait]
pub trait Adapter<R: Storable>: ReadAdapter<R> {
    async fn insert(&self, record: R, options: &[QueryOption]) -> StorageResult<R>;

    /// Insert every record or none of them.
    async fn insert_all(&self, records: Vec<R>, options: &[QueryOption]) -> StorageResult<Vec<R>>;

    /// Replace the stored record sharing `record.id()`.
    async fn update(&self, record: R, options: &[QueryOption]) -> StorageResult<R>;

    /// Replace every record; all must already exist or nothing changes.
    async fn update_all(&self, records: Vec<R>, options: &[QueryOption]) -> StorageResult<Vec<R>>;

    async fn delete(&self, id: &str, options: &[QueryOption]) -> StorageResult<bool>;

    async fn delete_all(&self, ids: &[String], options: &[QueryOption]) -> StorageResult<bool>;
}
