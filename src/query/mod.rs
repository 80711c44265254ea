//! Fluent query construction.
//!
//! A [`Query`] accepts every directive. `where_in` and `where_or` close the
//! chain and hand back a [`TerminalQuery`], which only keeps the shaping
//! directives (ordering, selection, relation loading, caching, paging).
//! Both materialize into the same [`QuerySpec`].

/// Directives shared by the open and terminal builders.
macro_rules! shaping_directives {
    () => {
        pub fn sort_asc(mut self, field: &str) -> $crate::error::Result<Self> {
            self.state
                .order("sort_asc", field, $crate::query::Direction::Asc)?;
            Ok(self)
        }

        pub fn sort_desc(mut self, field: &str) -> $crate::error::Result<Self> {
            self.state
                .order("sort_desc", field, $crate::query::Direction::Desc)?;
            Ok(self)
        }

        pub fn select(mut self, field: &str) -> $crate::error::Result<Self> {
            self.state.select(field)?;
            Ok(self)
        }

        /// Eager-load a relation chain, one hop per item (`["author", "company"]`).
        pub fn fetch_relation<I, S>(mut self, hops: I) -> $crate::error::Result<Self>
        where
            I: IntoIterator<Item = S>,
            S: AsRef<str>,
        {
            self.state.fetch_relation(hops)?;
            Ok(self)
        }

        pub fn load_relation_ids(mut self) -> Self {
            self.state.load_relation_ids();
            self
        }

        pub fn cache(mut self, directive: impl Into<$crate::query::CacheDirective>) -> Self {
            self.state.cache(directive.into());
            self
        }

        /// Resume from an opaque page token. An empty token is ignored.
        pub fn next(mut self, token: &str) -> $crate::error::Result<Self> {
            self.state.next(token)?;
            Ok(self)
        }

        /// Page size override. `0` leaves it unset.
        pub fn limit(mut self, limit: u64) -> Self {
            self.state.limit(Some(limit));
            self
        }

        pub fn pagination(
            mut self,
            request: $crate::query::PageRequest,
        ) -> $crate::error::Result<Self> {
            self.state.pagination(request)?;
            Ok(self)
        }

        /// Continue with runtime-checked directives.
        pub fn dynamic(self) -> $crate::query::DynamicQuery<'s> {
            $crate::query::DynamicQuery::from_state(self.state)
        }
    };
}

mod builder;
mod directive;
mod state;
mod terminal;


use std::{collections::BTreeSet, time::Duration};

use serde::{Deserialize, Serialize};

pub use builder::{Alternatives, Query, SubQuery};
pub use directive::{Directive, DynamicQuery};
pub use terminal::TerminalQuery;

use crate::{
    cursor::PageCursor,
    schema::Shape,
    tree::{Predicate, RelationTree},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    pub fn as_sql(self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderBy {
    pub field: String,
    pub direction: Direction,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheDirective {
    #[default]
    Disabled,
    /// Cache with the repository's configured TTL.
    Default,
    Ttl(Duration),
}

impl CacheDirective {
    pub fn resolve(&self, default: Duration) -> Option<Duration> {
        match self {
            CacheDirective::Disabled => None,
            CacheDirective::Default => Some(default),
            CacheDirective::Ttl(ttl) => Some(*ttl),
        }
    }
}

impl From<bool> for CacheDirective {
    fn from(enabled: bool) -> Self {
        if enabled {
            CacheDirective::Default
        } else {
            CacheDirective::Disabled
        }
    }
}

impl From<Duration> for CacheDirective {
    fn from(ttl: Duration) -> Self {
        CacheDirective::Ttl(ttl)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Pagination {
    pub cursor: Option<PageCursor>,
    /// Explicit page size; wins over the cursor's.
    pub limit: Option<u64>,
}

impl Pagination {
    pub fn offset(&self) -> Option<u64> {
        self.cursor.map(|c| c.offset)
    }

    pub fn page_size(&self) -> Option<u64> {
        self.limit.or(self.cursor.map(|c| c.limit))
    }
}

/// Combined `next` + `limit`, e.g. straight from request parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PageRequest {
    pub next: Option<String>,
    pub limit: Option<u64>,
}

/// Provider-agnostic query IR.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QuerySpec {
    pub entity: String,
    pub predicate: Predicate,
    pub relations: RelationTree,
    /// Insertion order is the sort-key priority.
    pub order: Vec<OrderBy>,
    /// Empty means every field.
    pub selection: BTreeSet<String>,
    pub pagination: Pagination,
    pub cache: CacheDirective,
    pub load_relation_ids: bool,
}

impl QuerySpec {
    pub(crate) fn for_entity(shape: &Shape) -> Self {
        Self {
            entity: shape.name.clone(),
            ..Self::default()
        }
    }
}

pub trait Materialize {
    /// Snapshot of the accumulated IR. Does not change the builder.
    fn materialize(&self) -> QuerySpec;

    fn into_spec(self) -> QuerySpec
    where
        Self: Sized,
    {
        self.materialize()
    }
}

impl Materialize for QuerySpec {
    fn materialize(&self) -> QuerySpec {
        self.clone()
    }

    fn into_spec(self) -> QuerySpec {
        self
    }
}
