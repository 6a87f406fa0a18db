use super::{distinct, foreign_key_of, membership_query};
use crate::context::StoreContext;
use crate::future::StoreFuture;
use crate::model::Viewable;
use crate::query::{Expression, Query, QueryOption, Sort};
use crate::traits::{QueryWindow, ReadAdapter};
use crate::{StorageError, StorageResult};
use std::marker::PhantomData;
use std::sync::Arc;

/// Many-to-many traversal from an origin `O` to destinations `D` through join rows `T`.
///
/// Join rows carry `O::TABLE.foreign_key` and `D::TABLE.foreign_key`. Resolution first
/// reads the join rows of the origin, then the destinations whose identifier is among
/// the projected destination keys.
pub struct Siblings<O, D: Viewable, T: Viewable> {
    origin_id: StoreFuture<String>,
    through: StorageResult<Arc<dyn ReadAdapter<T>>>,
    destination: StorageResult<Arc<dyn ReadAdapter<D>>>,
    _origin: PhantomData<fn() -> O>,
}

impl<O: Viewable, D: Viewable, T: Viewable> Siblings<O, D, T> {
    pub fn new(context: &StoreContext, origin_id: impl Into<String>) -> Self {
        let origin_id = origin_id.into();
        let origin_id = if origin_id.is_empty() {
            StoreFuture::failure(StorageError::NoIdentifier(format!(
                "empty {} identifier",
                O::TABLE
            )))
        } else {
            StoreFuture::success(origin_id)
        };
        Self::from_id_future(context, origin_id)
    }

    /// Siblings of an origin that is still being resolved.
    pub fn from_origin(context: &StoreContext, origin: StoreFuture<O>) -> Self {
        Self::from_id_future(context, origin.map(|origin| origin.id().to_string()))
    }

    fn from_id_future(context: &StoreContext, origin_id: StoreFuture<String>) -> Self {
        Self {
            origin_id,
            through: context.reader::<T>(),
            destination: context.reader::<D>(),
            _origin: PhantomData,
        }
    }

    /// Every destination linked to the origin.
    pub fn all(self) -> StoreFuture<Vec<D>> {
        self.fetch(None, Vec::new(), QueryWindow::ALL, Vec::new())
    }

    /// Linked destinations that also match `query`, sorted and paged.
    pub fn fetch(
        self,
        query: Option<Query>,
        sorts: Vec<Sort>,
        window: QueryWindow,
        options: Vec<QueryOption>,
    ) -> StoreFuture<Vec<D>> {
        let destination = match self.destination {
            Ok(adapter) => adapter,
            Err(error) => return StoreFuture::failure(error),
        };
        let through = match self.through {
            Ok(adapter) => adapter,
            Err(error) => return StoreFuture::failure(error),
        };
        destination_ids::<O, D, T>(self.origin_id, through).then(move |ids| {
            if ids.is_empty() {
                return StoreFuture::success(Vec::new());
            }
            let query = scoped_query::<D>(ids, query);
            StoreFuture::new(async move {
                destination
                    .fetch(Some(&query), &sorts, window, &options)
                    .await
            })
        })
    }

    /// Direct lookup on the destination adapter; the join rows are not consulted.
    pub fn find(self, id: impl Into<String>) -> StoreFuture<D> {
        let destination = match self.destination {
            Ok(adapter) => adapter,
            Err(error) => return StoreFuture::failure(error),
        };
        let id = id.into();
        StoreFuture::new(async move { destination.find(&id, &[]).await })
    }

    /// Number of linked destinations matching `query`.
    pub fn count(self, query: Option<Query>) -> StoreFuture<usize> {
        let destination = match self.destination {
            Ok(adapter) => adapter,
            Err(error) => return StoreFuture::failure(error),
        };
        let through = match self.through {
            Ok(adapter) => adapter,
            Err(error) => return StoreFuture::failure(error),
        };
        destination_ids::<O, D, T>(self.origin_id, through).then(move |ids| {
            if ids.is_empty() {
                return StoreFuture::success(0);
            }
            let query = scoped_query::<D>(ids, query);
            StoreFuture::new(async move { destination.count(Some(&query), &[]).await })
        })
    }
}

/// Phase one: read the origin's join rows and project the destination keys.
fn destination_ids<O: Viewable, D: Viewable, T: Viewable>(
    origin_id: StoreFuture<String>,
    through: Arc<dyn ReadAdapter<T>>,
) -> StoreFuture<Vec<String>> {
    origin_id.then(move |origin_id| {
        StoreFuture::new(async move {
            let links = membership_query(O::TABLE.foreign_key(), &[origin_id]);
            let rows = through
                .fetch(Some(&links), &[], QueryWindow::ALL, &[])
                .await?;
            Ok(distinct(
                rows.iter()
                    .filter_map(|row| foreign_key_of(row, D::TABLE.foreign_key()).ok()),
            ))
        })
    })
}

fn scoped_query<D: Viewable>(ids: Vec<String>, extra: Option<Query>) -> Query {
    let membership = Query::expression(Expression::inside(D::ID_KEY, ids));
    match extra {
        Some(extra) => membership.and_query(extra),
        None => membership,
    }
}
