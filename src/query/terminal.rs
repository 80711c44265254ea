use super::{
    Materialize, QuerySpec,
    builder::{SubQuery, sealed::Sealed},
    state::QueryState,
};

/// Builder returned by `where_in` and `where_or`. Predicates can no longer be
/// added; ordering, selection, relation loading, caching and paging still can.
#[derive(Debug, Clone)]
pub struct TerminalQuery<'s> {
    state: QueryState<'s>,
}

impl<'s> TerminalQuery<'s> {
    pub(crate) fn from_state(state: QueryState<'s>) -> Self {
        Self { state }
    }

    shaping_directives!();
}

impl Materialize for TerminalQuery<'_> {
    fn materialize(&self) -> QuerySpec {
        self.state.spec.clone()
    }

    fn into_spec(self) -> QuerySpec {
        self.state.spec
    }
}

impl<'s> Sealed<'s> for TerminalQuery<'s> {
    fn into_state(self) -> QueryState<'s> {
        self.state
    }
}

impl<'s> SubQuery<'s> for TerminalQuery<'s> {}
