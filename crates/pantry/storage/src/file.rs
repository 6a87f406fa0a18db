//! JSON-file adapter: one `<table>.json` array per table.
//!
//! The table is loaded on [`Connection::connect`] and kept in memory; queries run through
//! the same evaluator as [`MemoryAdapter`](crate::MemoryAdapter). Every mutation is
//! applied to a copy, written to `<table>.json.tmp`, renamed over the table file, and only
//! then committed. Holding the write lock across the write makes mutations strictly
//! one-at-a-time.

use crate::config::FileConfig;
use crate::memory::MemoryTable;
use crate::model::{Storable, Viewable};
use crate::query::{Query, QueryOption, Sort};
use crate::traits::{Adapter, Connection, QueryWindow, ReadAdapter};
use crate::{StorageError, StorageResult};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, info};

pub struct FileAdapter<R> {
    directory: PathBuf,
    pretty: bool,
    table: RwLock<Option<MemoryTable<R>>>,
    _record: PhantomData<fn() -> R>,
}

impl<R> FileAdapter<R>
where
    R: Viewable + Serialize + DeserializeOwned,
{
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            pretty: false,
            table: RwLock::new(None),
            _record: PhantomData,
        }
    }

    pub fn from_config(config: &FileConfig) -> Self {
        Self::new(config.directory.clone()).with_pretty(config.pretty)
    }

    /// Pretty-print the table file.
    pub fn with_pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Path of the table file.
    pub fn path(&self) -> PathBuf {
        self.directory.join(format!("{}.json", R::TABLE.name()))
    }

    pub async fn is_connected(&self) -> bool {
        self.table.read().await.is_some()
    }

    async fn load(&self) -> StorageResult<MemoryTable<R>> {
        tokio::fs::create_dir_all(&self.directory)
            .await
            .map_err(|err| {
                StorageError::NoDirectory(format!("{}: {err}", self.directory.display()))
            })?;

        let path = self.path();
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(MemoryTable::new());
            }
            Err(err) => return Err(err.into()),
        };
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(MemoryTable::new());
        }
        let records: Vec<R> = serde_json::from_slice(&bytes)
            .map_err(|err| StorageError::DecodeFailed(format!("{}: {err}", path.display())))?;
        MemoryTable::from_records(records)
    }

    async fn persist(&self, table: &MemoryTable<R>) -> StorageResult<()> {
        let bytes = if self.pretty {
            serde_json::to_vec_pretty(table.records())
        } else {
            serde_json::to_vec(table.records())
        }
        .map_err(|err| StorageError::EncodeFailed(err.to_string()))?;

        let path = self.path();
        let staging = path.with_extension("json.tmp");
        let written = match tokio::fs::write(&staging, &bytes).await {
            Ok(()) => tokio::fs::rename(&staging, &path).await,
            Err(err) => Err(err),
        };
        if let Err(err) = written {
            if let Err(cleanup) = tokio::fs::remove_file(&staging).await {
                debug!(path = %staging.display(), error = %cleanup, "staging file not removed");
            }
            return Err(err.into());
        }
        debug!(table = %R::TABLE, path = %path.display(), bytes = bytes.len(), "wrote table file");
        Ok(())
    }

    async fn read_table<T>(
        &self,
        f: impl FnOnce(&MemoryTable<R>) -> StorageResult<T>,
    ) -> StorageResult<T> {
        let guard = self.table.read().await;
        let table = guard.as_ref().ok_or(StorageError::NotConnected)?;
        f(table)
    }

    /// Apply `f` to a copy of the table, persist it, then commit.
    async fn mutate<T>(
        &self,
        f: impl FnOnce(&mut MemoryTable<R>) -> StorageResult<T>,
    ) -> StorageResult<T> {
        let mut guard = self.table.write().await;
        let current = guard.as_ref().ok_or(StorageError::NotConnected)?;
        let mut next = current.clone();
        let output = f(&mut next)?;
        self.persist(&next).await?;
        *guard = Some(next);
        Ok(output)
    }
}

#[async_trait]
impl<R> Connection for FileAdapter<R>
where
    R: Viewable + Serialize + DeserializeOwned,
{
    async fn connect(&self) -> StorageResult<bool> {
        let mut guard = self.table.write().await;
        if guard.is_none() {
            let table = self.load().await?;
            info!(
                table = %R::TABLE,
                path = %self.path().display(),
                records = table.len(),
                "loaded table file"
            );
            *guard = Some(table);
        }
        Ok(true)
    }

    async fn disconnect(&self) -> StorageResult<bool> {
        let was_connected = self.table.write().await.take().is_some();
        info!(table = %R::TABLE, was_connected, "disconnected file adapter");
        Ok(true)
    }
}

#[async_trait]
impl<R> ReadAdapter<R> for FileAdapter<R>
where
    R: Viewable + Serialize + DeserializeOwned,
{
    async fn find(&self, id: &str, _options: &[QueryOption]) -> StorageResult<R> {
        self.read_table(|table| table.get(id)).await
    }

    async fn find_all(
        &self,
        ids: &[String],
        sorts: &[Sort],
        window: QueryWindow,
        _options: &[QueryOption],
    ) -> StorageResult<Vec<R>> {
        self.read_table(|table| Ok(table.select_ids(ids, sorts, window)))
            .await
    }

    async fn fetch(
        &self,
        query: Option<&Query>,
        sorts: &[Sort],
        window: QueryWindow,
        _options: &[QueryOption],
    ) -> StorageResult<Vec<R>> {
        let records = self
            .read_table(|table| Ok(table.select(query, sorts, window)))
            .await?;
        debug!(table = %R::TABLE, results = records.len(), "fetched records");
        Ok(records)
    }

    async fn count(&self, query: Option<&Query>, _options: &[QueryOption]) -> StorageResult<usize> {
        self.read_table(|table| Ok(table.count(query))).await
    }
}

#[async_trait]
impl<R> Adapter<R> for FileAdapter<R>
where
    R: Storable + Serialize + DeserializeOwned,
{
    async fn insert(&self, record: R, _options: &[QueryOption]) -> StorageResult<R> {
        let stored = record.clone();
        self.mutate(move |table| table.insert(stored)).await?;
        debug!(table = %R::TABLE, id = %record.id(), "inserted record");
        Ok(record)
    }

    async fn insert_all(&self, records: Vec<R>, _options: &[QueryOption]) -> StorageResult<Vec<R>> {
        let stored = records.clone();
        self.mutate(move |table| table.insert_all(stored)).await?;
        debug!(table = %R::TABLE, count = records.len(), "inserted records");
        Ok(records)
    }

    async fn update(&self, record: R, _options: &[QueryOption]) -> StorageResult<R> {
        let stored = record.clone();
        self.mutate(move |table| table.replace(stored)).await?;
        debug!(table = %R::TABLE, id = %record.id(), "updated record");
        Ok(record)
    }

    async fn update_all(&self, records: Vec<R>, _options: &[QueryOption]) -> StorageResult<Vec<R>> {
        let stored = records.clone();
        self.mutate(move |table| table.replace_all(stored)).await?;
        debug!(table = %R::TABLE, count = records.len(), "updated records");
        Ok(records)
    }

    async fn delete(&self, id: &str, _options: &[QueryOption]) -> StorageResult<bool> {
        self.mutate(|table| table.remove(id)).await?;
        debug!(table = %R::TABLE, id = %id, "deleted record");
        Ok(true)
    }

    async fn delete_all(&self, ids: &[String], _options: &[QueryOption]) -> StorageResult<bool> {
        let removed = self.mutate(|table| Ok(table.remove_all(ids).len())).await?;
        debug!(table = %R::TABLE, requested = ids.len(), removed, "deleted records");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::base64_bytes;
    use crate::model::{Table, Value};
    use chrono::{DateTime, TimeZone, Utc};
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Photo {
        id: String,
        pet_id: String,
        #[serde(with = "base64_bytes")]
        thumbnail: Vec<u8>,
        #[serde(with = "chrono::serde::ts_seconds")]
        taken_at: DateTime<Utc>,
    }

    impl Viewable for Photo {
        const TABLE: Table = Table::new("photos", "photo_id");

        fn id(&self) -> &str {
            &self.id
        }

        fn field(&self, key: &str) -> Value {
            match key {
                "pet_id" => Value::from(&self.pet_id),
                "thumbnail" => Value::from(self.thumbnail.clone()),
                "taken_at" => Value::from(self.taken_at),
                _ => Value::Null,
            }
        }
    }

    impl Storable for Photo {}

    fn photo(id: &str) -> Photo {
        Photo {
            id: id.to_string(),
            pet_id: "p1".to_string(),
            thumbnail: vec![1, 2, 3],
            taken_at: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn operations_before_connect_fail() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = FileAdapter::<Photo>::new(dir.path());
        assert!(matches!(
            adapter.find("x", &[]).await,
            Err(StorageError::NotConnected)
        ));
        assert!(matches!(
            adapter.insert(photo("x"), &[]).await,
            Err(StorageError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn writes_snake_case_json_with_encoded_fields() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = FileAdapter::<Photo>::new(dir.path());
        adapter.connect().await.unwrap();
        adapter.insert(photo("ph1"), &[]).await.unwrap();

        let raw = std::fs::read_to_string(dir.path().join("photos.json")).unwrap();
        let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(json[0]["pet_id"], "p1");
        assert_eq!(json[0]["thumbnail"], "AQID");
        assert_eq!(json[0]["taken_at"], 1_700_000_000);
        assert!(!dir.path().join("photos.json.tmp").exists());
    }

    #[tokio::test]
    async fn reconnect_reloads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        {
            let adapter = FileAdapter::<Photo>::new(dir.path()).with_pretty(true);
            adapter.connect().await.unwrap();
            adapter
                .insert_all(vec![photo("a"), photo("b")], &[])
                .await
                .unwrap();
            adapter.delete("a", &[]).await.unwrap();
        }

        let adapter = FileAdapter::<Photo>::new(dir.path());
        adapter.connect().await.unwrap();
        assert_eq!(adapter.count(None, &[]).await.unwrap(), 1);
        assert_eq!(adapter.find("b", &[]).await.unwrap(), photo("b"));
    }

    #[tokio::test]
    async fn failed_mutation_leaves_table_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = FileAdapter::<Photo>::new(dir.path());
        adapter.connect().await.unwrap();
        adapter.insert(photo("a"), &[]).await.unwrap();

        let result = adapter.insert_all(vec![photo("b"), photo("a")], &[]).await;
        assert!(matches!(result, Err(StorageError::InsertFailed(_))));
        assert_eq!(adapter.count(None, &[]).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn failed_rename_removes_staging_file() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = FileAdapter::<Photo>::new(dir.path());
        adapter.connect().await.unwrap();

        // A non-empty directory at the table path makes the rename fail.
        let target = dir.path().join("photos.json");
        std::fs::create_dir(&target).unwrap();
        std::fs::write(target.join("keep"), b"x").unwrap();

        let result = adapter.insert(photo("a"), &[]).await;
        assert!(matches!(result, Err(StorageError::Io(_))));
        assert!(!dir.path().join("photos.json.tmp").exists());
        assert_eq!(adapter.count(None, &[]).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn unusable_directory_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"not a directory").unwrap();

        let adapter = FileAdapter::<Photo>::new(blocker.join("tables"));
        assert!(matches!(
            adapter.connect().await,
            Err(StorageError::NoDirectory(_))
        ));
        assert!(!adapter.is_connected().await);
    }

    #[tokio::test]
    async fn corrupt_file_is_a_decode_failure() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("photos.json"), b"{not json").unwrap();
        let adapter = FileAdapter::<Photo>::new(dir.path());
        assert!(matches!(
            adapter.connect().await,
            Err(StorageError::DecodeFailed(_))
        ));
    }

    #[tokio::test]
    async fn disconnect_requires_reconnect() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = FileAdapter::<Photo>::from_config(&FileConfig {
            directory: dir.path().to_path_buf(),
            pretty: false,
        });
        adapter.connect().await.unwrap();
        adapter.disconnect().await.unwrap();
        assert!(matches!(
            adapter.count(None, &[]).await,
            Err(StorageError::NotConnected)
        ));
    }
}
