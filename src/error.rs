use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("{0}")]
    Chain(#[from] ChainViolation),
    #[error("unknown entity `{0}`")]
    UnknownEntity(String),
    #[error("`{entity}` has no field `{field}`")]
    UnknownField { entity: String, field: String },
    #[error("`{field}` on `{entity}` is not a relation, so `{path}` cannot traverse it")]
    NotARelation {
        entity: String,
        field: String,
        path: String,
    },
    #[error(
        "`{path}` ends on the relation `{field}` of `{entity}`; \
         name a field of the related entity, e.g. `{path}.id`"
    )]
    RelationLeaf {
        entity: String,
        field: String,
        path: String,
    },
    #[error("`{call}` takes a direct field, got `{path}`")]
    NestedPath { call: &'static str, path: String },
    #[error("invalid field path `{0}`")]
    InvalidPath(String),
    #[error("invalid value: {0}")]
    InvalidValue(String),
    #[error("{operation} is not supported by the {provider} provider")]
    Unsupported {
        provider: &'static str,
        operation: String,
    },
    #[error("invalid pagination token")]
    InvalidToken,
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("storage error: {0}")]
    Storage(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn unsupported(provider: &'static str, operation: impl Into<String>) -> Self {
        Error::Unsupported {
            provider,
            operation: operation.into(),
        }
    }
}

/// A call made at a point of the chain where it cannot be honoured.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainViolation {
    /// A predicate, join or OR was added after `where_in` or `where_or` closed the chain.
    #[error("`{call}` cannot be chained after `{terminal}`; move `{terminal}` to the end of the chain")]
    AfterTerminal {
        call: &'static str,
        terminal: &'static str,
    },
    #[error(
        "`where_in` is not allowed inside `where_join(\"{relation}\")`; \
         filter on an explicit foreign-key field of the parent instead"
    )]
    InInsideJoin { relation: String },
    #[error(
        "`where_in` is not allowed inside a `where_or` branch; \
         use one branch per value with `where_eq`"
    )]
    InInsideOr,
    /// A join sub-query finished as an OR-list, which cannot be nested under a relation.
    #[error(
        "`where_or` is not allowed inside `where_join(\"{relation}\")`; \
         use `where_or` on the parent query with nested paths"
    )]
    OrInsideJoin { relation: String },
    /// A `where_join` or `where_or` closure returned a builder other than the
    /// one it was handed.
    #[error(
        "the `{call}` closure must return the builder it was given; \
         chain the conditions onto its argument instead of starting a new query"
    )]
    ForeignBuilder { call: &'static str },
}
