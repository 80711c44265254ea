use std::collections::BTreeMap;

use serde::{Serialize, Serializer};

use crate::{operator::Operator, value::Value};

/// -----------------------------
/// Predicate trees
/// -----------------------------

/// Value stored under one key of a [`PredicateTree`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Condition {
    Value(Value),
    Op(Operator),
    /// The key names a relation; the tree applies to the related entity.
    Nested(PredicateTree),
}

impl Condition {
    pub fn as_nested(&self) -> Option<&PredicateTree> {
        match self {
            Condition::Nested(tree) => Some(tree),
            _ => None,
        }
    }

    pub fn as_op(&self) -> Option<&Operator> {
        match self {
            Condition::Op(op) => Some(op),
            _ => None,
        }
    }
}

impl From<Value> for Condition {
    fn from(value: Value) -> Self {
        Condition::Value(value)
    }
}

impl From<Operator> for Condition {
    fn from(op: Operator) -> Self {
        Condition::Op(op)
    }
}

impl From<PredicateTree> for Condition {
    fn from(tree: PredicateTree) -> Self {
        Condition::Nested(tree)
    }
}

/// Conjunction of per-field conditions.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct PredicateTree(pub BTreeMap<String, Condition>);

impl PredicateTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn get(&self, key: &str) -> Option<&Condition> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, condition: impl Into<Condition>) {
        self.0.insert(key.into(), condition.into());
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Condition)> {
        self.0.iter()
    }

    pub fn with(mut self, key: impl Into<String>, condition: impl Into<Condition>) -> Self {
        self.insert(key, condition);
        self
    }
}

/// The `predicate` of a query: one conjunction, or an OR-list of
/// conjunctions produced by `where_or`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Predicate {
    All(PredicateTree),
    Any(Vec<PredicateTree>),
}

impl Default for Predicate {
    fn default() -> Self {
        Predicate::All(PredicateTree::default())
    }
}

impl Predicate {
    pub fn is_empty(&self) -> bool {
        match self {
            Predicate::All(tree) => tree.is_empty(),
            Predicate::Any(branches) => branches.is_empty(),
        }
    }

    /// Alternatives as a flat list; a single conjunction is one alternative.
    pub fn alternatives(&self) -> Vec<&PredicateTree> {
        match self {
            Predicate::All(tree) => vec![tree],
            Predicate::Any(branches) => branches.iter().collect(),
        }
    }
}

/// -----------------------------
/// Relation declarations
/// -----------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum RelationNode {
    /// Eager-load this relation and nothing below it.
    Load,
    Nested(RelationTree),
}

impl Serialize for RelationNode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            RelationNode::Load => serializer.serialize_bool(true),
            RelationNode::Nested(tree) => tree.serialize(serializer),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct RelationTree(pub BTreeMap<String, RelationNode>);

impl RelationTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&RelationNode> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, node: RelationNode) {
        self.0.insert(key.into(), node);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &RelationNode)> {
        self.0.iter()
    }

    pub fn with(mut self, key: impl Into<String>, node: RelationNode) -> Self {
        self.insert(key, node);
        self
    }

    /// Every declared relation chain, parents before children.
    pub fn paths(&self) -> Vec<Vec<String>> {
        let mut out = Vec::new();
        collect_paths(self, &mut Vec::new(), &mut out);
        out
    }

    pub fn contains_path(&self, path: &[String]) -> bool {
        let Some((head, rest)) = path.split_first() else {
            return true;
        };
        match self.0.get(head) {
            None => false,
            Some(RelationNode::Load) => rest.is_empty(),
            Some(RelationNode::Nested(tree)) => tree.contains_path(rest),
        }
    }
}

fn collect_paths(tree: &RelationTree, prefix: &mut Vec<String>, out: &mut Vec<Vec<String>>) {
    for (name, node) in tree.iter() {
        prefix.push(name.clone());
        out.push(prefix.clone());
        if let RelationNode::Nested(child) = node {
            collect_paths(child, prefix, out);
        }
        prefix.pop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relation_tree_serializes_markers_as_true() {
        let tree = RelationTree::new()
            .with("author", RelationNode::Nested(RelationTree::new().with("company", RelationNode::Load)))
            .with("tags", RelationNode::Load);
        assert_eq!(
            serde_json::to_value(&tree).unwrap(),
            serde_json::json!({"author": {"company": true}, "tags": true})
        );
    }

    #[test]
    fn relation_paths_are_listed_parent_first() {
        let tree = RelationTree::new().with(
            "a",
            RelationNode::Nested(RelationTree::new().with("b", RelationNode::Load)),
        );
        assert_eq!(
            tree.paths(),
            vec![vec!["a".to_string()], vec!["a".to_string(), "b".to_string()]]
        );
        assert!(tree.contains_path(&["a".to_string(), "b".to_string()]));
        assert!(!tree.contains_path(&["b".to_string()]));
    }
}
