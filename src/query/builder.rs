use crate::{
    error::Result,
    schema::{Entity, Schema, Shape},
    value::ToValue,
};

use super::{Directive, Materialize, QuerySpec, TerminalQuery, state::QueryState};

pub(super) mod sealed {
    use super::QueryState;

    pub trait Sealed<'s> {
        fn into_state(self) -> QueryState<'s>;
    }
}

use sealed::Sealed;

/// What a `where_join` or `where_or` closure hands back: the builder it was
/// given, with conditions chained onto it. Implemented by [`Query`] and
/// [`TerminalQuery`] only.
pub trait SubQuery<'s>: Sealed<'s> {}

/// Open query builder.
///
/// ```ignore
/// let spec = Query::new(&schema, "User")?
///     .where_eq("status", "active")?
///     .where_gt("photos.likes", 10)?
///     .sort_desc("age")?
///     .limit(20)
///     .into_spec();
/// ```
#[derive(Debug, Clone)]
pub struct Query<'s> {
    state: QueryState<'s>,
}

impl<'s> Query<'s> {
    pub fn new(schema: &'s Schema, entity: &str) -> Result<Self> {
        let shape = schema.shape(entity)?;
        Ok(Self {
            state: QueryState::new(schema, shape),
        })
    }

    pub fn of<E: Entity>(schema: &'s Schema) -> Result<Self> {
        Self::new(schema, E::NAME)
    }

    pub(crate) fn from_shape(schema: &'s Schema, shape: &'s Shape) -> Self {
        Self {
            state: QueryState::new(schema, shape),
        }
    }

    fn apply(mut self, directive: Directive) -> Result<Self> {
        self.state.apply(directive)?;
        Ok(self)
    }

    // ==================== Comparison ====================

    /// `None` matches rows where the field is null.
    pub fn where_eq(self, path: &str, value: impl ToValue) -> Result<Self> {
        self.apply(Directive::Eq {
            path: path.to_string(),
            value: value.to_value(),
        })
    }

    /// `None` matches rows where the field is not null.
    pub fn where_ne(self, path: &str, value: impl ToValue) -> Result<Self> {
        self.apply(Directive::Ne {
            path: path.to_string(),
            value: value.to_value(),
        })
    }

    pub fn where_gt(self, path: &str, value: impl ToValue) -> Result<Self> {
        self.apply(Directive::Gt {
            path: path.to_string(),
            value: value.to_value(),
        })
    }

    pub fn where_gte(self, path: &str, value: impl ToValue) -> Result<Self> {
        self.apply(Directive::Gte {
            path: path.to_string(),
            value: value.to_value(),
        })
    }

    pub fn where_lt(self, path: &str, value: impl ToValue) -> Result<Self> {
        self.apply(Directive::Lt {
            path: path.to_string(),
            value: value.to_value(),
        })
    }

    pub fn where_lte(self, path: &str, value: impl ToValue) -> Result<Self> {
        self.apply(Directive::Lte {
            path: path.to_string(),
            value: value.to_value(),
        })
    }

    pub fn where_not_gt(self, path: &str, value: impl ToValue) -> Result<Self> {
        self.apply(Directive::NotGt {
            path: path.to_string(),
            value: value.to_value(),
        })
    }

    pub fn where_not_gte(self, path: &str, value: impl ToValue) -> Result<Self> {
        self.apply(Directive::NotGte {
            path: path.to_string(),
            value: value.to_value(),
        })
    }

    pub fn where_not_lt(self, path: &str, value: impl ToValue) -> Result<Self> {
        self.apply(Directive::NotLt {
            path: path.to_string(),
            value: value.to_value(),
        })
    }

    pub fn where_not_lte(self, path: &str, value: impl ToValue) -> Result<Self> {
        self.apply(Directive::NotLte {
            path: path.to_string(),
            value: value.to_value(),
        })
    }

    /// Inclusive range. A `None` bound leaves that side open.
    pub fn where_between(self, path: &str, from: impl ToValue, to: impl ToValue) -> Result<Self> {
        self.apply(Directive::Between {
            path: path.to_string(),
            from: from.to_value(),
            to: to.to_value(),
        })
    }

    // ==================== Patterns ====================

    pub fn where_starts_with(self, path: &str, value: impl ToValue) -> Result<Self> {
        self.apply(Directive::StartsWith {
            path: path.to_string(),
            value: value.to_value(),
        })
    }

    pub fn where_ends_with(self, path: &str, value: impl ToValue) -> Result<Self> {
        self.apply(Directive::EndsWith {
            path: path.to_string(),
            value: value.to_value(),
        })
    }

    pub fn where_contains(self, path: &str, value: impl ToValue) -> Result<Self> {
        self.apply(Directive::Contains {
            path: path.to_string(),
            value: value.to_value(),
        })
    }

    pub fn where_istarts_with(self, path: &str, value: impl ToValue) -> Result<Self> {
        self.apply(Directive::IStartsWith {
            path: path.to_string(),
            value: value.to_value(),
        })
    }

    pub fn where_iends_with(self, path: &str, value: impl ToValue) -> Result<Self> {
        self.apply(Directive::IEndsWith {
            path: path.to_string(),
            value: value.to_value(),
        })
    }

    pub fn where_icontains(self, path: &str, value: impl ToValue) -> Result<Self> {
        self.apply(Directive::IContains {
            path: path.to_string(),
            value: value.to_value(),
        })
    }

    // ==================== Null & arrays ====================

    pub fn where_null(self, path: &str) -> Result<Self> {
        self.apply(Directive::Null {
            path: path.to_string(),
        })
    }

    pub fn where_not_null(self, path: &str) -> Result<Self> {
        self.apply(Directive::NotNull {
            path: path.to_string(),
        })
    }

    pub fn where_array_contains(self, path: &str, value: impl ToValue) -> Result<Self> {
        self.apply(Directive::ArrayContains {
            path: path.to_string(),
            value: value.to_value(),
        })
    }

    pub fn where_array_contains_any<I, V>(self, path: &str, values: I) -> Result<Self>
    where
        I: IntoIterator<Item = V>,
        V: ToValue,
    {
        self.apply(Directive::ArrayContainsAny {
            path: path.to_string(),
            values: values.into_iter().map(|v| v.to_value()).collect(),
        })
    }

    // ==================== Composition ====================

    /// Filter on a related entity. The closure receives a builder rooted at
    /// the relation target; its conditions are nested under `relation` and
    /// the relation is eager-loaded.
    ///
    /// `where_in` and `where_or` are rejected inside the closure.
    pub fn where_join<F, R>(mut self, relation: &str, build: F) -> Result<Self>
    where
        F: FnOnce(Query<'s>) -> Result<R>,
        R: SubQuery<'s>,
    {
        let (path, sub) = self.state.join_scope(relation)?;
        let sub = build(Query { state: sub })?.into_state();
        self.state.join(&path, sub)?;
        Ok(self)
    }

    /// Closes the chain with a membership test on `path`.
    pub fn where_in<I, V>(mut self, path: &str, values: I) -> Result<TerminalQuery<'s>>
    where
        I: IntoIterator<Item = V>,
        V: ToValue,
    {
        let values = values.into_iter().map(|v| v.to_value()).collect();
        self.state.membership(path, values)?;
        Ok(TerminalQuery::from_state(self.state))
    }

    /// Closes the chain with a disjunction. Every branch starts from the
    /// conditions accumulated so far, so `a AND (b OR c)` materializes as
    /// `[a AND b, a AND c]`.
    ///
    /// ```ignore
    /// Query::new(&schema, "User")?
    ///     .where_eq("status", "active")?
    ///     .where_or(|alt| {
    ///         alt.branch(|q| q.where_eq("role", "admin"))?
    ///             .branch(|q| q.where_gt("age", 30))
    ///     })?;
    /// ```
    pub fn where_or<F>(mut self, build: F) -> Result<TerminalQuery<'s>>
    where
        F: FnOnce(Alternatives<'s>) -> Result<Alternatives<'s>>,
    {
        let seed = self.state.branch_scope()?;
        let alternatives = build(Alternatives {
            seed,
            branches: Vec::new(),
        })?;
        self.state.or(alternatives.branches)?;
        Ok(TerminalQuery::from_state(self.state))
    }

    shaping_directives!();
}

impl Materialize for Query<'_> {
    fn materialize(&self) -> QuerySpec {
        self.state.spec.clone()
    }

    fn into_spec(self) -> QuerySpec {
        self.state.spec
    }
}

impl<'s> Sealed<'s> for Query<'s> {
    fn into_state(self) -> QueryState<'s> {
        self.state
    }
}

impl<'s> SubQuery<'s> for Query<'s> {}

/// Collects the branches of a `where_or`.
#[derive(Debug)]
pub struct Alternatives<'s> {
    seed: QueryState<'s>,
    branches: Vec<QueryState<'s>>,
}

impl<'s> Alternatives<'s> {
    pub fn branch<F, R>(mut self, build: F) -> Result<Self>
    where
        F: FnOnce(Query<'s>) -> Result<R>,
        R: SubQuery<'s>,
    {
        let query = Query {
            state: self.seed.clone(),
        };
        self.branches.push(build(query)?.into_state());
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.branches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.branches.is_empty()
    }
}
