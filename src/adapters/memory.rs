use std::{cmp::Ordering, collections::BTreeMap, sync::RwLock};

use async_trait::async_trait;

use super::{
    Executor,
    document::{DocumentFilter, DocumentQuery, DocumentTranslator, FieldOp},
};
use crate::{
    error::{Error, Result},
    query::Direction,
};

/// In-process document store. Evaluates [`DocumentQuery`]s against JSON
/// documents grouped by collection.
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: RwLock<BTreeMap<String, Vec<serde_json::Value>>>,
    translator: DocumentTranslator,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, collection: &str, document: serde_json::Value) -> Result<()> {
        let mut collections = self
            .collections
            .write()
            .map_err(|_| Error::Storage("memory store lock poisoned".to_string()))?;
        collections
            .entry(collection.to_string())
            .or_default()
            .push(document);
        Ok(())
    }

    pub fn insert_many(
        &self,
        collection: &str,
        documents: impl IntoIterator<Item = serde_json::Value>,
    ) -> Result<()> {
        for document in documents {
            self.insert(collection, document)?;
        }
        Ok(())
    }

    pub fn len(&self, collection: &str) -> usize {
        self.collections
            .read()
            .map(|c| c.get(collection).map_or(0, Vec::len))
            .unwrap_or(0)
    }

    fn run(&self, query: &DocumentQuery) -> Result<Vec<serde_json::Value>> {
        let collections = self
            .collections
            .read()
            .map_err(|_| Error::Storage("memory store lock poisoned".to_string()))?;
        let Some(documents) = collections.get(&query.collection) else {
            return Ok(Vec::new());
        };

        let mut rows: Vec<&serde_json::Value> = documents
            .iter()
            .filter(|doc| query.filter.as_ref().is_none_or(|f| satisfies(doc, f)))
            .collect();

        if !query.order_by.is_empty() {
            rows.sort_by(|a, b| {
                for order in &query.order_by {
                    let ordering = total_cmp(field(a, &order.field), field(b, &order.field));
                    let ordering = match order.direction {
                        Direction::Asc => ordering,
                        Direction::Desc => ordering.reverse(),
                    };
                    if ordering != Ordering::Equal {
                        return ordering;
                    }
                }
                Ordering::Equal
            });
        }

        let offset = query.offset.unwrap_or(0) as usize;
        let limit = query.limit.map_or(usize::MAX, |l| l as usize);
        Ok(rows
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|doc| project(doc, &query.select))
            .collect())
    }
}

#[async_trait]
impl Executor for MemoryStore {
    type Translator = DocumentTranslator;

    fn translator(&self) -> &DocumentTranslator {
        &self.translator
    }

    async fn execute(&self, query: DocumentQuery) -> Result<Vec<serde_json::Value>> {
        self.run(&query)
    }
}

fn field<'d>(doc: &'d serde_json::Value, name: &str) -> &'d serde_json::Value {
    doc.get(name).unwrap_or(&serde_json::Value::Null)
}

fn project(doc: &serde_json::Value, select: &[String]) -> serde_json::Value {
    if select.is_empty() {
        return doc.clone();
    }
    let map = select
        .iter()
        .filter_map(|name| doc.get(name).map(|v| (name.clone(), v.clone())))
        .collect();
    serde_json::Value::Object(map)
}

fn satisfies(doc: &serde_json::Value, filter: &DocumentFilter) -> bool {
    match filter {
        DocumentFilter::And { filters } => filters.iter().all(|f| satisfies(doc, f)),
        DocumentFilter::Or { filters } => filters.iter().any(|f| satisfies(doc, f)),
        DocumentFilter::Field {
            field: name,
            op,
            value,
        } => {
            let actual = field(doc, name);
            match op {
                FieldOp::Equal => same(actual, value),
                // missing and null fields never match an inequality
                FieldOp::NotEqual => !actual.is_null() && !same(actual, value),
                FieldOp::LessThan => partial_cmp(actual, value) == Some(Ordering::Less),
                FieldOp::LessThanOrEqual => matches!(
                    partial_cmp(actual, value),
                    Some(Ordering::Less | Ordering::Equal)
                ),
                FieldOp::GreaterThan => partial_cmp(actual, value) == Some(Ordering::Greater),
                FieldOp::GreaterThanOrEqual => matches!(
                    partial_cmp(actual, value),
                    Some(Ordering::Greater | Ordering::Equal)
                ),
                FieldOp::ArrayContains => actual
                    .as_array()
                    .is_some_and(|items| items.iter().any(|i| same(i, value))),
                FieldOp::ArrayContainsAny => actual.as_array().is_some_and(|items| {
                    candidates(value).any(|c| items.iter().any(|i| same(i, c)))
                }),
                FieldOp::In => candidates(value).any(|c| same(actual, c)),
                FieldOp::NotIn => !actual.is_null() && !candidates(value).any(|c| same(actual, c)),
                FieldOp::IsNull => actual.is_null(),
                FieldOp::IsNotNull => !actual.is_null(),
            }
        }
    }
}

fn candidates(value: &serde_json::Value) -> impl Iterator<Item = &serde_json::Value> {
    value.as_array().into_iter().flatten()
}

fn same(a: &serde_json::Value, b: &serde_json::Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

/// Comparison within one type; mixed types are incomparable.
fn partial_cmp(a: &serde_json::Value, b: &serde_json::Value) -> Option<Ordering> {
    use serde_json::Value as J;
    match (a, b) {
        (J::Number(_), J::Number(_)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (J::String(x), J::String(y)) => Some(x.cmp(y)),
        (J::Bool(x), J::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// Sort order across types: null, booleans, numbers, strings, then the rest.
fn total_cmp(a: &serde_json::Value, b: &serde_json::Value) -> Ordering {
    fn rank(v: &serde_json::Value) -> u8 {
        match v {
            serde_json::Value::Null => 0,
            serde_json::Value::Bool(_) => 1,
            serde_json::Value::Number(_) => 2,
            serde_json::Value::String(_) => 3,
            serde_json::Value::Array(_) => 4,
            serde_json::Value::Object(_) => 5,
        }
    }
    partial_cmp(a, b).unwrap_or_else(|| rank(a).cmp(&rank(b)))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{
        adapters::Translator,
        query::{Materialize, Query, QuerySpec},
        schema::fixtures,
    };

    fn store() -> MemoryStore {
        let store = MemoryStore::new();
        store
            .insert_many(
                "users",
                [
                    json!({"id": 1, "name": "Ada", "age": 36, "role": "admin", "labels": ["vip"]}),
                    json!({"id": 2, "name": "Bob", "age": 17, "role": "guest"}),
                    json!({"id": 3, "name": "Joan", "age": 52, "role": "owner", "labels": []}),
                    json!({"id": 4, "name": "Jon", "age": 29, "role": null}),
                ],
            )
            .unwrap();
        store
    }

    fn ids(rows: &[serde_json::Value]) -> Vec<i64> {
        rows.iter().filter_map(|r| r["id"].as_i64()).collect()
    }

    fn run(spec: QuerySpec) -> Vec<i64> {
        let schema = fixtures::schema();
        let store = store();
        let query = store.translator().translate(&schema, &spec).unwrap();
        ids(&store.run(&query).unwrap())
    }

    #[test]
    fn filters_sort_and_page() {
        let schema = fixtures::schema();
        let spec = Query::new(&schema, "User")
            .unwrap()
            .where_gte("age", 18)
            .unwrap()
            .sort_desc("age")
            .unwrap()
            .limit(2)
            .into_spec();
        assert_eq!(run(spec), vec![3, 1]);
    }

    #[test]
    fn prefix_range_matches_like_starts_with() {
        let schema = fixtures::schema();
        let spec = Query::new(&schema, "User")
            .unwrap()
            .where_starts_with("name", "Jo")
            .unwrap()
            .sort_asc("id")
            .unwrap()
            .into_spec();
        assert_eq!(run(spec), vec![3, 4]);
    }

    #[test]
    fn null_checks_and_membership() {
        let schema = fixtures::schema();
        let spec = Query::new(&schema, "User")
            .unwrap()
            .where_eq("role", None::<&str>)
            .unwrap()
            .into_spec();
        assert_eq!(run(spec), vec![4]);

        let spec = Query::new(&schema, "User")
            .unwrap()
            .where_in("role", ["admin", "owner"])
            .unwrap()
            .sort_asc("id")
            .unwrap()
            .into_spec();
        assert_eq!(run(spec), vec![1, 3]);
    }

    #[test]
    fn or_with_array_contains() {
        let schema = fixtures::schema();
        let spec = Query::new(&schema, "User")
            .unwrap()
            .where_or(|alt| {
                alt.branch(|q| q.where_array_contains("labels", "vip"))?
                    .branch(|q| q.where_lt("age", 18))
            })
            .unwrap()
            .sort_asc("id")
            .unwrap()
            .into_spec();
        assert_eq!(run(spec), vec![1, 2]);
    }

    #[test]
    fn selection_projects_fields() {
        let schema = fixtures::schema();
        let store = store();
        let spec = Query::new(&schema, "User")
            .unwrap()
            .where_eq("id", 2)
            .unwrap()
            .select("name")
            .unwrap()
            .into_spec();
        let query = store.translator().translate(&schema, &spec).unwrap();
        assert_eq!(store.run(&query).unwrap(), vec![json!({"name": "Bob"})]);
    }

    #[test]
    fn unknown_collection_is_empty() {
        assert_eq!(store().len("photos"), 0);
        assert_eq!(store().len("users"), 4);
    }
}
