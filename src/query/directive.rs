use serde::Deserialize;

use crate::{
    error::Result,
    schema::Schema,
    value::Value,
};

use super::{CacheDirective, Materialize, QuerySpec, state::QueryState};

/// One builder call as data, for queries assembled at runtime (request
/// payloads, saved filters).
///
/// ```json
/// [{"op": "eq", "path": "status", "value": "active"},
///  {"op": "in", "path": "role", "values": ["admin", "owner"]},
///  {"op": "sort_desc", "field": "age"}]
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Directive {
    Eq {
        path: String,
        #[serde(default)]
        value: Value,
    },
    Ne {
        path: String,
        #[serde(default)]
        value: Value,
    },
    Gt {
        path: String,
        #[serde(default)]
        value: Value,
    },
    Gte {
        path: String,
        #[serde(default)]
        value: Value,
    },
    Lt {
        path: String,
        #[serde(default)]
        value: Value,
    },
    Lte {
        path: String,
        #[serde(default)]
        value: Value,
    },
    NotGt {
        path: String,
        #[serde(default)]
        value: Value,
    },
    NotGte {
        path: String,
        #[serde(default)]
        value: Value,
    },
    NotLt {
        path: String,
        #[serde(default)]
        value: Value,
    },
    NotLte {
        path: String,
        #[serde(default)]
        value: Value,
    },
    Between {
        path: String,
        #[serde(default)]
        from: Value,
        #[serde(default)]
        to: Value,
    },
    StartsWith {
        path: String,
        #[serde(default)]
        value: Value,
    },
    EndsWith {
        path: String,
        #[serde(default)]
        value: Value,
    },
    Contains {
        path: String,
        #[serde(default)]
        value: Value,
    },
    #[serde(rename = "istarts_with")]
    IStartsWith {
        path: String,
        #[serde(default)]
        value: Value,
    },
    #[serde(rename = "iends_with")]
    IEndsWith {
        path: String,
        #[serde(default)]
        value: Value,
    },
    #[serde(rename = "icontains")]
    IContains {
        path: String,
        #[serde(default)]
        value: Value,
    },
    Null {
        path: String,
    },
    NotNull {
        path: String,
    },
    ArrayContains {
        path: String,
        #[serde(default)]
        value: Value,
    },
    ArrayContainsAny {
        path: String,
        values: Vec<Value>,
    },
    In {
        path: String,
        values: Vec<Value>,
    },
    Join {
        relation: String,
        #[serde(default)]
        directives: Vec<Directive>,
    },
    Or {
        branches: Vec<Vec<Directive>>,
    },
    SortAsc {
        field: String,
    },
    SortDesc {
        field: String,
    },
    Select {
        field: String,
    },
    FetchRelation {
        hops: Vec<String>,
    },
    LoadRelationIds,
    Cache {
        #[serde(default = "cache_enabled")]
        cache: CacheDirective,
    },
    Next {
        token: String,
    },
    Limit {
        limit: u64,
    },
}

fn cache_enabled() -> CacheDirective {
    CacheDirective::Default
}

impl Directive {
    pub fn from_json(raw: &str) -> Result<Vec<Directive>> {
        serde_json::from_str(raw).map_err(|e| crate::error::Error::InvalidValue(e.to_string()))
    }
}

/// Builder that applies [`Directive`]s with the same rules as
/// [`Query`](super::Query), checked at runtime instead of by the type.
///
/// Once `in` or `or` has been applied, any further predicate fails with
/// [`ChainViolation::AfterTerminal`](crate::error::ChainViolation::AfterTerminal).
#[derive(Debug, Clone)]
pub struct DynamicQuery<'s> {
    state: QueryState<'s>,
}

impl<'s> DynamicQuery<'s> {
    pub fn new(schema: &'s Schema, entity: &str) -> Result<Self> {
        let shape = schema.shape(entity)?;
        Ok(Self::from_state(QueryState::new(schema, shape)))
    }

    pub(crate) fn from_state(state: QueryState<'s>) -> Self {
        Self { state }
    }

    pub fn apply(mut self, directive: Directive) -> Result<Self> {
        self.state.apply(directive)?;
        Ok(self)
    }

    pub fn apply_all(mut self, directives: impl IntoIterator<Item = Directive>) -> Result<Self> {
        for directive in directives {
            self.state.apply(directive)?;
        }
        Ok(self)
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn entity(&self) -> &str {
        &self.state.shape().name
    }
}

impl Materialize for DynamicQuery<'_> {
    fn materialize(&self) -> QuerySpec {
        self.state.spec.clone()
    }

    fn into_spec(self) -> QuerySpec {
        self.state.spec
    }
}
