//! Leaf predicate constructors.
//!
//! An [`Operator`] is an opaque leaf: the structural merge never descends
//! into one, and each adapter pattern-matches on it independently.

use serde::{Deserialize, Serialize};

use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PatternKind {
    Prefix,
    Suffix,
    Contains,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    pub kind: PatternKind,
    pub text: String,
    pub case_insensitive: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "camelCase")]
pub enum Operator {
    Equal(Value),
    MoreThan(Value),
    MoreThanOrEqual(Value),
    LessThan(Value),
    LessThanOrEqual(Value),
    Between(Value, Value),
    Like(Pattern),
    In(Vec<Value>),
    IsNull,
    ArrayContains(Value),
    ArrayContainsAny(Vec<Value>),
    Not(Box<Operator>),
}

impl Operator {
    /// Discriminator used in diagnostics and unsupported-operation errors.
    pub fn kind(&self) -> &'static str {
        match self {
            Operator::Equal(_) => "equal",
            Operator::MoreThan(_) => "moreThan",
            Operator::MoreThanOrEqual(_) => "moreThanOrEqual",
            Operator::LessThan(_) => "lessThan",
            Operator::LessThanOrEqual(_) => "lessThanOrEqual",
            Operator::Between(..) => "between",
            Operator::Like(p) => match (p.kind, p.case_insensitive) {
                (PatternKind::Prefix, false) => "startsWith",
                (PatternKind::Suffix, false) => "endsWith",
                (PatternKind::Contains, false) => "contains",
                (PatternKind::Prefix, true) => "iStartsWith",
                (PatternKind::Suffix, true) => "iEndsWith",
                (PatternKind::Contains, true) => "iContains",
            },
            Operator::In(_) => "in",
            Operator::IsNull => "isNull",
            Operator::ArrayContains(_) => "arrayContains",
            Operator::ArrayContainsAny(_) => "arrayContainsAny",
            Operator::Not(_) => "not",
        }
    }

    /// Exact logical complement of a negated operator, when a primitive
    /// exists for it. Returns `None` for non-negations and for negations
    /// that can only be expressed with a wrapper.
    ///
    /// `Not(Equal)`, `Not(IsNull)` and `Not(In)` stay negations: adapters
    /// have direct forms for them, so they are matched as such.
    pub fn complement(&self) -> Option<Operator> {
        let Operator::Not(inner) = self else {
            return None;
        };
        match inner.as_ref() {
            Operator::MoreThan(v) => Some(Operator::LessThanOrEqual(v.clone())),
            Operator::MoreThanOrEqual(v) => Some(Operator::LessThan(v.clone())),
            Operator::LessThan(v) => Some(Operator::MoreThanOrEqual(v.clone())),
            Operator::LessThanOrEqual(v) => Some(Operator::MoreThan(v.clone())),
            Operator::Not(op) => Some(op.as_ref().clone()),
            _ => None,
        }
    }
}

pub fn equal(value: Value) -> Operator {
    Operator::Equal(value)
}

pub fn not_equal(value: Value) -> Operator {
    not(equal(value))
}

pub fn more_than(value: Value) -> Operator {
    Operator::MoreThan(value)
}

pub fn more_than_or_equal(value: Value) -> Operator {
    Operator::MoreThanOrEqual(value)
}

pub fn less_than(value: Value) -> Operator {
    Operator::LessThan(value)
}

pub fn less_than_or_equal(value: Value) -> Operator {
    Operator::LessThanOrEqual(value)
}

pub fn not_more_than(value: Value) -> Operator {
    not(more_than(value))
}

pub fn not_more_than_or_equal(value: Value) -> Operator {
    not(more_than_or_equal(value))
}

pub fn not_less_than(value: Value) -> Operator {
    not(less_than(value))
}

pub fn not_less_than_or_equal(value: Value) -> Operator {
    not(less_than_or_equal(value))
}

/// Inclusive on both ends.
pub fn between(from: Value, to: Value) -> Operator {
    Operator::Between(from, to)
}

pub fn like(kind: PatternKind, text: impl Into<String>, case_insensitive: bool) -> Operator {
    Operator::Like(Pattern {
        kind,
        text: text.into(),
        case_insensitive,
    })
}

pub fn one_of(values: Vec<Value>) -> Operator {
    Operator::In(values)
}

pub fn is_null() -> Operator {
    Operator::IsNull
}

pub fn is_not_null() -> Operator {
    not(is_null())
}

pub fn array_contains(value: Value) -> Operator {
    Operator::ArrayContains(value)
}

pub fn array_contains_any(values: Vec<Value>) -> Operator {
    Operator::ArrayContainsAny(values)
}

pub fn not(op: Operator) -> Operator {
    Operator::Not(Box::new(op))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negated_comparisons_rewrite_to_their_complement() {
        let n = Value::Int(5);
        assert_eq!(
            not_more_than(n.clone()).complement(),
            Some(less_than_or_equal(n.clone()))
        );
        assert_eq!(
            not_more_than_or_equal(n.clone()).complement(),
            Some(less_than(n.clone()))
        );
        assert_eq!(
            not_less_than(n.clone()).complement(),
            Some(more_than_or_equal(n.clone()))
        );
        assert_eq!(
            not_less_than_or_equal(n.clone()).complement(),
            Some(more_than(n))
        );
    }

    #[test]
    fn double_negation_cancels() {
        assert_eq!(not(is_not_null()).complement(), Some(is_null()));
    }

    #[test]
    fn wrapper_only_negations_have_no_complement() {
        assert_eq!(not_equal(Value::Int(1)).complement(), None);
        assert_eq!(is_not_null().complement(), None);
        assert_eq!(more_than(Value::Int(1)).complement(), None);
    }

    #[test]
    fn kind_tags() {
        assert_eq!(like(PatternKind::Suffix, "x", true).kind(), "iEndsWith");
        assert_eq!(one_of(vec![]).kind(), "in");
        assert_eq!(is_not_null().kind(), "not");
    }

    #[test]
    fn serializes_as_tagged_leaf() {
        let json = serde_json::to_value(more_than(Value::Int(5))).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "moreThan", "value": 5}));
    }
}
