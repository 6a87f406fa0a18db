use crate::model::Viewable;
use crate::traits::ReadAdapter;
use crate::{StorageError, StorageResult};
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Explicit adapter registry threaded through relationship resolvers.
///
/// Keys are record types; each entry holds the `Arc<dyn ReadAdapter<R>>` registered
/// for that type.
#[derive(Default)]
pub struct StoreContext {
    readers: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl StoreContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the adapter serving `R`, replacing any previous one.
    pub fn register<R, A>(&mut self, adapter: Arc<A>) -> &mut Self
    where
        R: Viewable,
        A: ReadAdapter<R> + 'static,
    {
        let reader: Arc<dyn ReadAdapter<R>> = adapter;
        self.readers.insert(TypeId::of::<R>(), Box::new(reader));
        self
    }

    /// Builder-style [`StoreContext::register`].
    pub fn with<R, A>(mut self, adapter: Arc<A>) -> Self
    where
        R: Viewable,
        A: ReadAdapter<R> + 'static,
    {
        self.register::<R, A>(adapter);
        self
    }

    pub fn contains<R: Viewable>(&self) -> bool {
        self.readers.contains_key(&TypeId::of::<R>())
    }

    /// Adapter registered for `R`, or [`StorageError::NoAdapter`].
    pub fn reader<R: Viewable>(&self) -> StorageResult<Arc<dyn ReadAdapter<R>>> {
        self.readers
            .get(&TypeId::of::<R>())
            .and_then(|entry| entry.downcast_ref::<Arc<dyn ReadAdapter<R>>>())
            .cloned()
            .ok_or_else(|| StorageError::NoAdapter(R::TABLE.name().to_string()))
    }
}

impl fmt::Debug for StoreContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreContext")
            .field("adapters", &self.readers.len())
            .finish()
    }
}
