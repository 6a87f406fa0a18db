//! Object-graph traversal over foreign-key conventions.
//!
//! Resolvers never touch storage directly: each one turns an edge of the graph into
//! queries against adapters taken from a [`StoreContext`](crate::StoreContext), and
//! returns a [`StoreFuture`](crate::StoreFuture) so results can feed the next resolver.

mod children;
mod parent;
mod siblings;

pub use children::Children;
pub use parent::{Parent, Parents};
pub use siblings::Siblings;

use crate::model::Viewable;
use crate::query::{Expression, Query};
use crate::{StorageError, StorageResult};

/// `foreign_key == id` for any of `ids`.
pub(crate) fn membership_query(foreign_key: &str, ids: &[String]) -> Query {
    Query::or(ids.iter().flat_map(|id| identifier_matches(foreign_key, id)))
}

/// Equalities matching `key` against `id` stored either as text or, when `id` is
/// numeric, as an integer. Mirrors [`Value::as_identifier`](crate::Value::as_identifier).
pub(crate) fn identifier_matches(key: &str, id: &str) -> Vec<Expression> {
    let mut matches = vec![Expression::equal(key, id)];
    if let Ok(number) = id.parse::<i64>() {
        if number.to_string() == id {
            matches.push(Expression::equal(key, number));
        }
    }
    matches
}

/// Read a foreign key off a record.
pub(crate) fn foreign_key_of<R: Viewable>(record: &R, key: &str) -> StorageResult<String> {
    record.value(key).as_identifier().ok_or_else(|| {
        StorageError::NoIdentifier(format!("{} {} has no {key}", R::TABLE, record.id()))
    })
}

/// Distinct values in first-seen order.
pub(crate) fn distinct(ids: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    ids.into_iter().filter(|id| seen.insert(id.clone())).collect()
}
