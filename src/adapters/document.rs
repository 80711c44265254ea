//! Translation to a Firestore-style document query.
//!
//! Document stores filter one collection at a time and only match prefixes
//! through ranges, so several constructs are rejected here instead of being
//! approximated.

use std::time::Duration;

use serde::Serialize;

use crate::{
    config::DEFAULT_CACHE,
    error::{Error, Result},
    operator::{Operator, PatternKind},
    query::{Direction, QuerySpec},
    schema::{Schema, Shape},
    tree::{Condition, Predicate, PredicateTree},
    value::Value,
};

use super::Translator;

const PROVIDER: &str = "document";

/// Upper bound appended to a prefix to turn it into a half-open range.
const PREFIX_END: char = '\u{f8ff}';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FieldOp {
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    ArrayContains,
    ArrayContainsAny,
    In,
    NotIn,
    IsNull,
    IsNotNull,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum DocumentFilter {
    Field {
        field: String,
        op: FieldOp,
        value: serde_json::Value,
    },
    And {
        filters: Vec<DocumentFilter>,
    },
    Or {
        filters: Vec<DocumentFilter>,
    },
}

impl DocumentFilter {
    fn field(field: &str, op: FieldOp, value: serde_json::Value) -> Self {
        DocumentFilter::Field {
            field: field.to_string(),
            op,
            value,
        }
    }

    fn all(mut filters: Vec<DocumentFilter>) -> Self {
        if filters.len() == 1 {
            return filters.remove(0);
        }
        DocumentFilter::And { filters }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentOrder {
    pub field: String,
    pub direction: Direction,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentQuery {
    pub collection: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<DocumentFilter>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub order_by: Vec<DocumentOrder>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub select: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache: Option<Duration>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DocumentTranslator;

impl Translator for DocumentTranslator {
    const PROVIDER: &'static str = PROVIDER;

    type Output = DocumentQuery;

    fn translate(&self, schema: &Schema, spec: &QuerySpec) -> Result<DocumentQuery> {
        let shape = schema.shape(&spec.entity)?;

        let filter = match &spec.predicate {
            Predicate::All(tree) => {
                let filters = conjunction(shape, tree)?;
                (!filters.is_empty()).then(|| DocumentFilter::all(filters))
            }
            Predicate::Any(branches) => {
                let mut filters = Vec::with_capacity(branches.len());
                for branch in branches {
                    filters.push(DocumentFilter::all(conjunction(shape, branch)?));
                }
                Some(DocumentFilter::Or { filters })
            }
        };

        if !spec.relations.is_empty() {
            return Err(Error::unsupported(PROVIDER, "relation loading"));
        }
        if spec.load_relation_ids {
            return Err(Error::unsupported(PROVIDER, "load_relation_ids"));
        }

        let mut order_by = Vec::with_capacity(spec.order.len());
        for order in &spec.order {
            shape.require_field(&order.field)?;
            order_by.push(DocumentOrder {
                field: order.field.clone(),
                direction: order.direction,
            });
        }

        let mut select = Vec::with_capacity(spec.selection.len());
        for field in &spec.selection {
            shape.require_field(field)?;
            select.push(field.clone());
        }

        Ok(DocumentQuery {
            collection: shape.table.clone(),
            filter,
            order_by,
            select,
            offset: spec.pagination.offset().filter(|o| *o > 0),
            limit: spec.pagination.page_size(),
            cache: spec.cache.resolve(DEFAULT_CACHE),
        })
    }
}

fn conjunction(shape: &Shape, tree: &PredicateTree) -> Result<Vec<DocumentFilter>> {
    let mut filters = Vec::new();
    for (key, condition) in tree.iter() {
        let field = shape.require_field(key)?;
        match condition {
            Condition::Nested(_) => {
                let operation = if field.is_relation() {
                    format!("filtering through relation `{key}`")
                } else {
                    format!("nested path under `{key}`")
                };
                return Err(Error::unsupported(PROVIDER, operation));
            }
            Condition::Value(value) if value.is_null() => {
                filters.push(DocumentFilter::field(key, FieldOp::IsNull, serde_json::Value::Null));
            }
            Condition::Value(value) => {
                filters.push(DocumentFilter::field(key, FieldOp::Equal, value.to_json()));
            }
            Condition::Op(op) => filters.push(operator(key, op)?),
        }
    }
    Ok(filters)
}

fn list(values: &[Value]) -> serde_json::Value {
    serde_json::Value::Array(values.iter().map(Value::to_json).collect())
}

fn operator(field: &str, op: &Operator) -> Result<DocumentFilter> {
    let filter = match op {
        Operator::Equal(v) if v.is_null() => {
            DocumentFilter::field(field, FieldOp::IsNull, serde_json::Value::Null)
        }
        Operator::Equal(v) => DocumentFilter::field(field, FieldOp::Equal, v.to_json()),
        Operator::MoreThan(v) => DocumentFilter::field(field, FieldOp::GreaterThan, v.to_json()),
        Operator::MoreThanOrEqual(v) => {
            DocumentFilter::field(field, FieldOp::GreaterThanOrEqual, v.to_json())
        }
        Operator::LessThan(v) => DocumentFilter::field(field, FieldOp::LessThan, v.to_json()),
        Operator::LessThanOrEqual(v) => {
            DocumentFilter::field(field, FieldOp::LessThanOrEqual, v.to_json())
        }
        Operator::Between(from, to) => DocumentFilter::And {
            filters: vec![
                DocumentFilter::field(field, FieldOp::GreaterThanOrEqual, from.to_json()),
                DocumentFilter::field(field, FieldOp::LessThanOrEqual, to.to_json()),
            ],
        },
        Operator::Like(pattern) if pattern.kind == PatternKind::Prefix && !pattern.case_insensitive => {
            let upper = format!("{}{PREFIX_END}", pattern.text);
            DocumentFilter::And {
                filters: vec![
                    DocumentFilter::field(
                        field,
                        FieldOp::GreaterThanOrEqual,
                        serde_json::Value::String(pattern.text.clone()),
                    ),
                    DocumentFilter::field(field, FieldOp::LessThan, serde_json::Value::String(upper)),
                ],
            }
        }
        Operator::In(values) | Operator::ArrayContainsAny(values) if values.is_empty() => {
            return Err(Error::unsupported(PROVIDER, format!("empty `{}` list", op.kind())));
        }
        Operator::In(values) => DocumentFilter::field(field, FieldOp::In, list(values)),
        Operator::IsNull => DocumentFilter::field(field, FieldOp::IsNull, serde_json::Value::Null),
        Operator::ArrayContains(v) => {
            DocumentFilter::field(field, FieldOp::ArrayContains, v.to_json())
        }
        Operator::ArrayContainsAny(values) => {
            DocumentFilter::field(field, FieldOp::ArrayContainsAny, list(values))
        }
        Operator::Not(inner) => {
            if let Some(complement) = op.complement() {
                return operator(field, &complement);
            }
            match inner.as_ref() {
                Operator::Equal(v) if v.is_null() => {
                    DocumentFilter::field(field, FieldOp::IsNotNull, serde_json::Value::Null)
                }
                Operator::Equal(v) => DocumentFilter::field(field, FieldOp::NotEqual, v.to_json()),
                Operator::IsNull => {
                    DocumentFilter::field(field, FieldOp::IsNotNull, serde_json::Value::Null)
                }
                Operator::In(values) if !values.is_empty() => {
                    DocumentFilter::field(field, FieldOp::NotIn, list(values))
                }
                other => {
                    return Err(Error::unsupported(PROVIDER, format!("not({})", other.kind())));
                }
            }
        }
        Operator::Like(_) => return Err(Error::unsupported(PROVIDER, op.kind())),
    };
    Ok(filter)
}
