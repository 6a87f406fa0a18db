//! Pantry: backend-agnostic record storage.
//!
//! This crate defines a persistence contract for typed records:
//! - a structured query language (`Expression`, `Query`, `Sort`) with reference evaluation
//! - deferred, chainable results (`StoreFuture`)
//! - per-record-type adapter traits with in-memory, file and HTTP backends
//! - foreign-key relationship resolvers (`Parent`, `Children`, `Siblings`)
//! - an undo/redo operation log for the in-memory backend
//!
//! Design stance:
//! - The in-memory adapter defines the query semantics; other backends must match it.
//! - Adapters are passed explicitly through a `StoreContext`, never looked up globally.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]
#![warn(rust_2018_idioms)]

pub mod codec;
pub mod config;
mod context;
mod error;
pub mod eval;
#[cfg(feature = "file")]
pub mod file;
mod future;
#[cfg(feature = "http")]
pub mod http;
pub mod memory;
mod model;
mod query;
pub mod relations;
pub mod stack;
pub mod telemetry;
mod traits;

pub use crate::config::{FileConfig, HttpConfig, LoggingConfig, StoreConfig};
pub use context::StoreContext;
pub use error::{StorageError, StorageResult};
#[cfg(feature = "file")]
pub use file::FileAdapter;
pub use future::{Resolver, StoreFuture};
#[cfg(feature = "http")]
pub use http::HttpAdapter;
pub use memory::{MemoryAdapter, MemoryStore, MemoryTable};
pub use model::{Storable, Table, Value, Viewable};
pub use query::{
    ComparisonOperator, ComparisonOptions, Expression, Predicate, Query, QueryOption, Sort,
    SortOrder,
};
pub use relations::{Children, Parent, Parents, Siblings};
pub use stack::{Operation, OperationKind, OperationLog};
pub use traits::{Adapter, Connection, QueryWindow, ReadAdapter};
