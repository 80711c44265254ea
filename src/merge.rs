//! Non-destructive deep merge of predicate and relation trees.
//!
//! Only nested trees are merged into. Literals (lists and timestamps
//! included) and operator values are leaves: a later write to the same key
//! replaces them wholesale.

use crate::tree::{Condition, PredicateTree, RelationNode, RelationTree};

pub trait Merge {
    fn merge(&mut self, source: Self);
}

impl Merge for PredicateTree {
    fn merge(&mut self, source: Self) {
        for (key, incoming) in source.0 {
            let child = match incoming {
                Condition::Nested(child) => child,
                leaf => {
                    self.0.insert(key, leaf);
                    continue;
                }
            };
            if let Some(Condition::Nested(existing)) = self.0.get_mut(&key) {
                existing.merge(child);
                continue;
            }
            self.0.insert(key, Condition::Nested(child));
        }
    }
}

/// A load marker is the empty declaration below a relation, so it never
/// removes a deeper declaration and is absorbed by one.
impl Merge for RelationTree {
    fn merge(&mut self, source: Self) {
        for (key, incoming) in source.0 {
            if let Some(RelationNode::Nested(existing)) = self.0.get_mut(&key) {
                if let RelationNode::Nested(child) = incoming {
                    existing.merge(child);
                }
                continue;
            }
            self.0.insert(key, incoming);
        }
    }
}

pub fn merged<T: Merge>(mut target: T, source: T) -> T {
    target.merge(source);
    target
}
