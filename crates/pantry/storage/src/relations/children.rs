use super::membership_query;
use crate::context::StoreContext;
use crate::future::StoreFuture;
use crate::model::Viewable;
use crate::query::{Expression, Query, QueryOption, Sort};
use crate::traits::{QueryWindow, ReadAdapter};
use crate::{StorageError, StorageResult};
use std::marker::PhantomData;
use std::sync::Arc;

/// Resolve the children `C` of one or more parents `P`.
///
/// A child belongs to a parent when `child[P::TABLE.foreign_key] == parent.id()`.
pub struct Children<P, C: Viewable> {
    parent_ids: StoreFuture<Vec<String>>,
    adapter: StorageResult<Arc<dyn ReadAdapter<C>>>,
    _parent: PhantomData<fn() -> P>,
}

impl<P: Viewable, C: Viewable> Children<P, C> {
    /// Children of parents known by identifier. No identifiers at all is a
    /// `NoIdentifier` failure.
    pub fn new<I, S>(context: &StoreContext, parent_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let parent_ids: Vec<String> = parent_ids.into_iter().map(Into::into).collect();
        let parent_ids = if parent_ids.is_empty() {
            StoreFuture::failure(StorageError::NoIdentifier(format!(
                "no {} identifiers to resolve {} from",
                P::TABLE,
                C::TABLE
            )))
        } else {
            StoreFuture::success(parent_ids)
        };
        Self::from_id_future(context, parent_ids)
    }

    /// Children of parents that are still being resolved. An empty parent list yields
    /// no children.
    pub fn from_parents(context: &StoreContext, parents: StoreFuture<Vec<P>>) -> Self {
        let parent_ids = parents.map(|parents| {
            parents
                .iter()
                .map(|parent| parent.id().to_string())
                .collect()
        });
        Self::from_id_future(context, parent_ids)
    }

    /// Children of an optional parent; `None` fails with `NoIdentifier`.
    pub fn from_optional_parent(context: &StoreContext, parent: StoreFuture<Option<P>>) -> Self {
        let parent_ids = parent.transform(|parent| match parent {
            Some(parent) => Ok(vec![parent.id().to_string()]),
            None => Err(StorageError::NoIdentifier(format!(
                "no {} to resolve {} from",
                P::TABLE,
                C::TABLE
            ))),
        });
        Self::from_id_future(context, parent_ids)
    }

    fn from_id_future(context: &StoreContext, parent_ids: StoreFuture<Vec<String>>) -> Self {
        Self {
            parent_ids,
            adapter: context.reader::<C>(),
            _parent: PhantomData,
        }
    }

    /// Every child of the parents.
    pub fn all(self) -> StoreFuture<Vec<C>> {
        self.fetch(None, Vec::new(), QueryWindow::ALL, Vec::new())
    }

    /// Children matching `query` as well as parent membership.
    pub fn fetch(
        self,
        query: Option<Query>,
        sorts: Vec<Sort>,
        window: QueryWindow,
        options: Vec<QueryOption>,
    ) -> StoreFuture<Vec<C>> {
        let adapter = match self.adapter {
            Ok(adapter) => adapter,
            Err(error) => return StoreFuture::failure(error),
        };
        self.parent_ids.then(move |ids| {
            if ids.is_empty() {
                return StoreFuture::success(Vec::new());
            }
            let query = scoped_query::<P>(&ids, query);
            StoreFuture::new(async move {
                adapter
                    .fetch(Some(&query), &sorts, window, &options)
                    .await
            })
        })
    }

    /// The child with `id`, provided it belongs to one of the parents.
    pub fn find(self, id: impl Into<String>) -> StoreFuture<C> {
        let id = id.into();
        let id_query = Query::expression(Expression::equal(C::ID_KEY, id.as_str()));
        self.fetch(Some(id_query), Vec::new(), QueryWindow::limit(1), Vec::new())
            .transform(move |children| {
                children.into_iter().next().ok_or_else(|| {
                    StorageError::NoResult(format!("{} {id} not found among children", C::TABLE))
                })
            })
    }

    /// Number of children matching `query`.
    pub fn count(self, query: Option<Query>) -> StoreFuture<usize> {
        let adapter = match self.adapter {
            Ok(adapter) => adapter,
            Err(error) => return StoreFuture::failure(error),
        };
        self.parent_ids.then(move |ids| {
            if ids.is_empty() {
                return StoreFuture::success(0);
            }
            let query = scoped_query::<P>(&ids, query);
            StoreFuture::new(async move { adapter.count(Some(&query), &[]).await })
        })
    }
}

fn scoped_query<P: Viewable>(parent_ids: &[String], extra: Option<Query>) -> Query {
    let membership = membership_query(P::TABLE.foreign_key(), parent_ids);
    match extra {
        Some(extra) => membership.and_query(extra),
        None => membership,
    }
}
