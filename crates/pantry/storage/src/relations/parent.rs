use super::{distinct, foreign_key_of};
use crate::context::StoreContext;
use crate::future::StoreFuture;
use crate::model::Viewable;
use crate::query::Sort;
use crate::traits::{QueryWindow, ReadAdapter};
use crate::{StorageError, StorageResult};
use std::marker::PhantomData;
use std::sync::Arc;

/// Resolve the single parent `P` of a child `C` through `P::TABLE.foreign_key`.
pub struct Parent<C, P: Viewable> {
    parent_id: StoreFuture<String>,
    adapter: StorageResult<Arc<dyn ReadAdapter<P>>>,
    _child: PhantomData<fn() -> C>,
}

impl<C: Viewable, P: Viewable> Parent<C, P> {
    /// Parent known by identifier.
    pub fn new(context: &StoreContext, parent_id: impl Into<String>) -> Self {
        let parent_id = parent_id.into();
        let parent_id = if parent_id.is_empty() {
            StoreFuture::failure(StorageError::NoIdentifier(format!(
                "empty {} identifier",
                P::TABLE
            )))
        } else {
            StoreFuture::success(parent_id)
        };
        Self::from_id_future(context, parent_id)
    }

    /// Parent of a child that is still being resolved.
    pub fn from_child(context: &StoreContext, child: StoreFuture<C>) -> Self {
        let parent_id = child.transform(|child| foreign_key_of(&child, P::TABLE.foreign_key()));
        Self::from_id_future(context, parent_id)
    }

    /// Parent of an optional child; `None` fails with `NoIdentifier`.
    pub fn from_optional_child(context: &StoreContext, child: StoreFuture<Option<C>>) -> Self {
        let parent_id = child.transform(|child| match child {
            Some(child) => foreign_key_of(&child, P::TABLE.foreign_key()),
            None => Err(StorageError::NoIdentifier(format!(
                "no {} to resolve {} from",
                C::TABLE,
                P::TABLE
            ))),
        });
        Self::from_id_future(context, parent_id)
    }

    fn from_id_future(context: &StoreContext, parent_id: StoreFuture<String>) -> Self {
        Self {
            parent_id,
            adapter: context.reader::<P>(),
            _child: PhantomData,
        }
    }

    pub fn get(self) -> StoreFuture<P> {
        let adapter = match self.adapter {
            Ok(adapter) => adapter,
            Err(error) => return StoreFuture::failure(error),
        };
        self.parent_id.then(move |id| {
            StoreFuture::new(async move { adapter.find(&id, &[]).await })
        })
    }
}

/// Resolve the distinct parents of several children.
pub struct Parents<C, P: Viewable> {
    parent_ids: StoreFuture<Vec<String>>,
    adapter: StorageResult<Arc<dyn ReadAdapter<P>>>,
    _child: PhantomData<fn() -> C>,
}

impl<C: Viewable, P: Viewable> Parents<C, P> {
    /// Children without the foreign key are skipped.
    pub fn from_children(context: &StoreContext, children: StoreFuture<Vec<C>>) -> Self {
        let parent_ids = children.map(|children| {
            distinct(
                children
                    .iter()
                    .filter_map(|child| foreign_key_of(child, P::TABLE.foreign_key()).ok()),
            )
        });
        Self {
            parent_ids,
            adapter: context.reader::<P>(),
            _child: PhantomData,
        }
    }

    pub fn all(self) -> StoreFuture<Vec<P>> {
        self.fetch(Vec::new(), QueryWindow::ALL)
    }

    pub fn fetch(self, sorts: Vec<Sort>, window: QueryWindow) -> StoreFuture<Vec<P>> {
        let adapter = match self.adapter {
            Ok(adapter) => adapter,
            Err(error) => return StoreFuture::failure(error),
        };
        self.parent_ids.then(move |ids| {
            if ids.is_empty() {
                return StoreFuture::success(Vec::new());
            }
            StoreFuture::new(async move { adapter.find_all(&ids, &sorts, window, &[]).await })
        })
    }
}
