//! # Quarry
//!
//! Fluent, provider-agnostic query construction.
//!
//! A [`Query`] accumulates filters, relation loads, ordering, selection,
//! caching and paging into a [`QuerySpec`]: a plain, serializable
//! intermediate form. Translators lower that form into one store's native
//! query, and reject what the store cannot express instead of guessing.
//!
//! ```rust,ignore
//! let schema = Schema::new()
//!     .register::<User>()
//!     .register::<Photo>()
//!     .validate()?;
//!
//! let spec = Query::of::<User>(&schema)?
//!     .where_eq("status", "active")?
//!     .where_gt("photos.likes", 10)?
//!     .where_in("role", ["admin", "owner"])?
//!     // only shaping is allowed past this point
//!     .sort_desc("created_at")?
//!     .limit(20)
//!     .into_spec();
//!
//! let statement = PostgresTranslator.translate(&schema, &spec)?;
//! ```
//!
//! ## Paths
//! `"photos.likes"` walks the `photos` relation of `User` and filters on
//! `likes` of the related `Photo`. Every hop is checked against the
//! [`Schema`], and the relations a path walks are declared for loading.
//!
//! ## Terminal calls
//! `where_in` and `where_or` return a [`TerminalQuery`], which only keeps
//! the shaping calls. For chains assembled at runtime, [`DynamicQuery`]
//! applies the same rules and reports violations as
//! [`ChainViolation`](error::ChainViolation).
//!
//! ## Absent values
//! `where_eq(path, None)` filters for null and `where_ne(path, None)` for
//! not-null. Every other comparison given `None` adds nothing.

pub mod adapters;
pub mod config;
pub mod cursor;
pub mod error;
pub mod merge;
pub mod operator;
pub mod path;
pub mod query;
pub mod repository;
pub mod schema;
pub mod tree;
pub mod value;

pub use crate::adapters::{
    DocumentQuery, DocumentTranslator, Executor, MemoryStore, PgStatement, PostgresTranslator,
    Translator,
};
#[cfg(feature = "postgres")]
pub use crate::adapters::PgExecutor;
pub use crate::config::QueryConfig;
pub use crate::cursor::PageCursor;
pub use crate::error::{ChainViolation, Error, Result};
pub use crate::operator::Operator;
pub use crate::query::{
    Alternatives, CacheDirective, Direction, Directive, DynamicQuery, Materialize, PageRequest,
    Query, QuerySpec, SubQuery, TerminalQuery,
};
pub use crate::repository::{Page, Repository};
pub use crate::schema::{Cardinality, Entity, Field, FieldKind, Relation, Schema, Shape};
pub use crate::value::{ToValue, Value};

#[cfg(feature = "derive")]
pub use quarry_derive::*;
