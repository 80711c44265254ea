use crate::{
    cursor::PageCursor,
    error::{ChainViolation, Error, Result},
    merge::Merge,
    operator::{self, PatternKind},
    path::{self, FieldPath},
    schema::{Schema, Shape},
    tree::{Condition, Predicate, PredicateTree, RelationNode},
    value::Value,
};

use super::{CacheDirective, Direction, Directive, OrderBy, PageRequest, QuerySpec};

/// Where a builder sits relative to its parent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Scope {
    Root,
    Join(String),
    OrBranch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Stage {
    Open,
    /// Closed by the named call; predicates can no longer be added.
    Terminal(&'static str),
}

/// Shared state behind [`Query`](super::Query), [`TerminalQuery`](super::TerminalQuery)
/// and [`DynamicQuery`](super::DynamicQuery).
#[derive(Debug, Clone)]
pub struct QueryState<'s> {
    schema: &'s Schema,
    shape: &'s Shape,
    scope: Scope,
    stage: Stage,
    pub(crate) spec: QuerySpec,
}

impl<'s> QueryState<'s> {
    pub(crate) fn new(schema: &'s Schema, shape: &'s Shape) -> Self {
        Self {
            schema,
            shape,
            scope: Scope::Root,
            stage: Stage::Open,
            spec: QuerySpec::for_entity(shape),
        }
    }

    pub(crate) fn shape(&self) -> &'s Shape {
        self.shape
    }

    pub(crate) fn is_terminal(&self) -> bool {
        matches!(self.stage, Stage::Terminal(_))
    }

    fn ensure_open(&self, call: &'static str) -> Result<()> {
        match self.stage {
            Stage::Open => Ok(()),
            Stage::Terminal(terminal) => {
                Err(ChainViolation::AfterTerminal { call, terminal }.into())
            }
        }
    }

    fn close(&mut self, by: &'static str) {
        self.stage = Stage::Terminal(by);
        tracing::debug!(entity = %self.shape.name, by, "query chain closed");
    }

    fn tree_mut(&mut self, call: &'static str) -> Result<&mut PredicateTree> {
        match &mut self.spec.predicate {
            Predicate::All(tree) => Ok(tree),
            Predicate::Any(_) => Err(ChainViolation::AfterTerminal {
                call,
                terminal: "where_or",
            }
            .into()),
        }
    }

    // ==================== Predicates ====================

    /// Writes `condition` at `raw`, declaring the relations a nested path
    /// traverses.
    pub(crate) fn condition(
        &mut self,
        call: &'static str,
        raw: &str,
        condition: Condition,
    ) -> Result<()> {
        self.ensure_open(call)?;
        let path = FieldPath::parse(raw)?;
        path.resolve(self.schema, self.shape)?;
        if let Some(prefix) = path.relation_prefix() {
            self.spec
                .relations
                .merge(path::build_relation_declaration(&prefix));
        }
        let fragment = path::build_nested_predicate(&path, condition);
        self.tree_mut(call)?.merge(fragment);
        Ok(())
    }

    /// Null values skip the predicate.
    fn compare(
        &mut self,
        call: &'static str,
        raw: &str,
        value: Value,
        build: fn(Value) -> operator::Operator,
    ) -> Result<()> {
        if value.is_null() {
            self.ensure_open(call)?;
            return Ok(());
        }
        self.condition(call, raw, build(value).into())
    }

    fn pattern(
        &mut self,
        call: &'static str,
        raw: &str,
        value: Value,
        kind: PatternKind,
        case_insensitive: bool,
    ) -> Result<()> {
        if value.is_null() {
            self.ensure_open(call)?;
            return Ok(());
        }
        let text = value
            .to_text()
            .ok_or_else(|| Error::InvalidValue(format!("`{call}` needs a scalar, got {value:?}")))?;
        self.condition(
            call,
            raw,
            operator::like(kind, text, case_insensitive).into(),
        )
    }

    fn between(&mut self, raw: &str, from: Value, to: Value) -> Result<()> {
        let call = "where_between";
        let op = match (from.is_null(), to.is_null()) {
            (true, true) => {
                self.ensure_open(call)?;
                return Ok(());
            }
            (false, true) => operator::more_than_or_equal(from),
            (true, false) => operator::less_than_or_equal(to),
            (false, false) => operator::between(from, to),
        };
        self.condition(call, raw, op.into())
    }

    pub(crate) fn membership(&mut self, raw: &str, values: Vec<Value>) -> Result<()> {
        let call = "where_in";
        self.ensure_open(call)?;
        match &self.scope {
            Scope::Join(relation) => {
                return Err(ChainViolation::InInsideJoin {
                    relation: relation.clone(),
                }
                .into());
            }
            Scope::OrBranch => return Err(ChainViolation::InInsideOr.into()),
            Scope::Root => {}
        }
        self.condition(call, raw, operator::one_of(values).into())?;
        self.close(call);
        Ok(())
    }

    /// Sub-builder for `where_join`, bound to the entity at the end of `relation`.
    pub(crate) fn join_scope(&self, relation: &str) -> Result<(FieldPath, QueryState<'s>)> {
        self.ensure_open("where_join")?;
        let path = FieldPath::parse(relation)?;
        let target = path.resolve_relations(self.schema, self.shape)?;
        let sub = QueryState {
            schema: self.schema,
            shape: target,
            scope: Scope::Join(path.to_string()),
            stage: Stage::Open,
            spec: QuerySpec::for_entity(target),
        };
        Ok((path, sub))
    }

    pub(crate) fn join(&mut self, path: &FieldPath, sub: QueryState<'s>) -> Result<()> {
        let call = "where_join";
        self.ensure_open(call)?;
        let target = path.resolve_relations(self.schema, self.shape)?;
        if sub.scope != Scope::Join(path.to_string()) || !std::ptr::eq(sub.shape, target) {
            return Err(ChainViolation::ForeignBuilder { call }.into());
        }
        let sub = sub.spec;
        let tree = match sub.predicate {
            Predicate::All(tree) => tree,
            Predicate::Any(_) => {
                return Err(ChainViolation::OrInsideJoin {
                    relation: path.to_string(),
                }
                .into());
            }
        };
        let deepest = if sub.relations.is_empty() {
            RelationNode::Load
        } else {
            RelationNode::Nested(sub.relations)
        };
        self.spec
            .relations
            .merge(path::build_relation_declaration_with(path, deepest));
        if !tree.is_empty() {
            let fragment = path::build_nested_predicate(path, Condition::Nested(tree));
            self.tree_mut(call)?.merge(fragment);
        }
        Ok(())
    }

    /// Sub-builder for one `where_or` branch, seeded with a copy of the
    /// conjunction accumulated so far.
    pub(crate) fn branch_scope(&self) -> Result<QueryState<'s>> {
        let call = "where_or";
        self.ensure_open(call)?;
        let seed = match &self.spec.predicate {
            Predicate::All(tree) => tree.clone(),
            Predicate::Any(_) => {
                return Err(ChainViolation::AfterTerminal {
                    call,
                    terminal: call,
                }
                .into());
            }
        };
        let mut spec = QuerySpec::for_entity(self.shape);
        spec.predicate = Predicate::All(seed);
        Ok(QueryState {
            schema: self.schema,
            shape: self.shape,
            scope: Scope::OrBranch,
            stage: Stage::Open,
            spec,
        })
    }

    pub(crate) fn or(&mut self, branches: Vec<QueryState<'s>>) -> Result<()> {
        let call = "where_or";
        self.ensure_open(call)?;
        if branches.is_empty() {
            return Err(Error::InvalidValue(
                "`where_or` needs at least one branch".to_string(),
            ));
        }
        // each branch must have grown from the seed handed out by `branch_scope`
        if branches
            .iter()
            .any(|b| b.scope != Scope::OrBranch || !std::ptr::eq(b.shape, self.shape))
        {
            return Err(ChainViolation::ForeignBuilder { call }.into());
        }
        let mut alternatives = Vec::with_capacity(branches.len());
        for branch in branches.into_iter().map(|b| b.spec) {
            self.spec.relations.merge(branch.relations);
            match branch.predicate {
                Predicate::All(tree) => alternatives.push(tree),
                // an OR inside a branch is already distributed over the seed
                Predicate::Any(trees) => alternatives.extend(trees),
            }
        }
        self.spec.predicate = Predicate::Any(alternatives);
        self.close(call);
        Ok(())
    }

    // ==================== Shaping ====================

    fn direct_field(&self, call: &'static str, raw: &str) -> Result<String> {
        let path = FieldPath::parse(raw)?;
        if path.is_nested() {
            return Err(Error::NestedPath {
                call,
                path: raw.to_string(),
            });
        }
        if self.shape.require_field(raw)?.is_relation() {
            return Err(Error::RelationLeaf {
                entity: self.shape.name.clone(),
                field: raw.to_string(),
                path: raw.to_string(),
            });
        }
        Ok(raw.to_string())
    }

    pub(crate) fn order(&mut self, call: &'static str, raw: &str, direction: Direction) -> Result<()> {
        let field = self.direct_field(call, raw)?;
        match self.spec.order.iter_mut().find(|o| o.field == field) {
            Some(existing) => existing.direction = direction,
            None => self.spec.order.push(OrderBy { field, direction }),
        }
        Ok(())
    }

    pub(crate) fn select(&mut self, raw: &str) -> Result<()> {
        let field = self.direct_field("select", raw)?;
        self.spec.selection.insert(field);
        Ok(())
    }

    pub(crate) fn fetch_relation<I, S>(&mut self, hops: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let path = FieldPath::from_segments(hops)?;
        path.resolve_relations(self.schema, self.shape)?;
        self.spec
            .relations
            .merge(path::build_relation_declaration(&path));
        Ok(())
    }

    pub(crate) fn load_relation_ids(&mut self) {
        self.spec.load_relation_ids = true;
    }

    pub(crate) fn cache(&mut self, directive: CacheDirective) {
        self.spec.cache = directive;
    }

    pub(crate) fn next(&mut self, token: &str) -> Result<()> {
        if token.trim().is_empty() {
            return Ok(());
        }
        self.spec.pagination.cursor = Some(PageCursor::decode(token)?);
        Ok(())
    }

    pub(crate) fn limit(&mut self, limit: Option<u64>) {
        if let Some(limit) = limit.filter(|l| *l > 0) {
            self.spec.pagination.limit = Some(limit);
        }
    }

    pub(crate) fn pagination(&mut self, request: PageRequest) -> Result<()> {
        if let Some(token) = request.next.as_deref() {
            self.next(token)?;
        }
        self.limit(request.limit);
        Ok(())
    }

    // ==================== Directives ====================

    pub(crate) fn apply(&mut self, directive: Directive) -> Result<()> {
        use crate::operator as op;

        match directive {
            Directive::Eq { path, value } => {
                let condition = if value.is_null() {
                    op::is_null().into()
                } else {
                    Condition::Value(value)
                };
                self.condition("where_eq", &path, condition)
            }
            Directive::Ne { path, value } => {
                let condition = if value.is_null() {
                    op::is_not_null()
                } else {
                    op::not_equal(value)
                };
                self.condition("where_ne", &path, condition.into())
            }
            Directive::Gt { path, value } => self.compare("where_gt", &path, value, op::more_than),
            Directive::Gte { path, value } => {
                self.compare("where_gte", &path, value, op::more_than_or_equal)
            }
            Directive::Lt { path, value } => self.compare("where_lt", &path, value, op::less_than),
            Directive::Lte { path, value } => {
                self.compare("where_lte", &path, value, op::less_than_or_equal)
            }
            Directive::NotGt { path, value } => {
                self.compare("where_not_gt", &path, value, op::not_more_than)
            }
            Directive::NotGte { path, value } => {
                self.compare("where_not_gte", &path, value, op::not_more_than_or_equal)
            }
            Directive::NotLt { path, value } => {
                self.compare("where_not_lt", &path, value, op::not_less_than)
            }
            Directive::NotLte { path, value } => {
                self.compare("where_not_lte", &path, value, op::not_less_than_or_equal)
            }
            Directive::Between { path, from, to } => self.between(&path, from, to),
            Directive::StartsWith { path, value } => {
                self.pattern("where_starts_with", &path, value, PatternKind::Prefix, false)
            }
            Directive::EndsWith { path, value } => {
                self.pattern("where_ends_with", &path, value, PatternKind::Suffix, false)
            }
            Directive::Contains { path, value } => {
                self.pattern("where_contains", &path, value, PatternKind::Contains, false)
            }
            Directive::IStartsWith { path, value } => {
                self.pattern("where_istarts_with", &path, value, PatternKind::Prefix, true)
            }
            Directive::IEndsWith { path, value } => {
                self.pattern("where_iends_with", &path, value, PatternKind::Suffix, true)
            }
            Directive::IContains { path, value } => {
                self.pattern("where_icontains", &path, value, PatternKind::Contains, true)
            }
            Directive::Null { path } => self.condition("where_null", &path, op::is_null().into()),
            Directive::NotNull { path } => {
                self.condition("where_not_null", &path, op::is_not_null().into())
            }
            Directive::ArrayContains { path, value } => {
                self.compare("where_array_contains", &path, value, op::array_contains)
            }
            Directive::ArrayContainsAny { path, values } => self.condition(
                "where_array_contains_any",
                &path,
                op::array_contains_any(values).into(),
            ),
            Directive::In { path, values } => self.membership(&path, values),
            Directive::Join {
                relation,
                directives,
            } => {
                let (path, mut sub) = self.join_scope(&relation)?;
                for directive in directives {
                    sub.apply(directive)?;
                }
                self.join(&path, sub)
            }
            Directive::Or { branches } => {
                let mut states = Vec::with_capacity(branches.len());
                for directives in branches {
                    let mut sub = self.branch_scope()?;
                    for directive in directives {
                        sub.apply(directive)?;
                    }
                    states.push(sub);
                }
                self.or(states)
            }
            Directive::SortAsc { field } => self.order("sort_asc", &field, Direction::Asc),
            Directive::SortDesc { field } => self.order("sort_desc", &field, Direction::Desc),
            Directive::Select { field } => self.select(&field),
            Directive::FetchRelation { hops } => self.fetch_relation(hops),
            Directive::LoadRelationIds => {
                self.load_relation_ids();
                Ok(())
            }
            Directive::Cache { cache } => {
                self.cache(cache);
                Ok(())
            }
            Directive::Next { token } => self.next(&token),
            Directive::Limit { limit } => {
                self.limit(Some(limit));
                Ok(())
            }
        }
    }
}
