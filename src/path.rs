//! Dot-separated field references.
//!
//! `"name"` is a direct field. `"author.company.name"` traverses the
//! `author` and `company` relations and ends on the `name` field of the
//! last related entity.

use std::fmt;

use crate::{
    error::{Error, Result},
    schema::{Field, Shape, ShapeLookup},
    tree::{Condition, PredicateTree, RelationNode, RelationTree},
};

pub const SEPARATOR: char = '.';

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPath {
    segments: Vec<String>,
}

impl FieldPath {
    pub fn parse(raw: &str) -> Result<Self> {
        let segments: Vec<String> = raw.split(SEPARATOR).map(str::to_string).collect();
        if segments.iter().any(|s| s.is_empty()) {
            return Err(Error::InvalidPath(raw.to_string()));
        }
        Ok(Self { segments })
    }

    pub fn from_segments<I, S>(segments: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut out = Vec::new();
        for segment in segments {
            out.extend(Self::parse(segment.as_ref())?.segments);
        }
        if out.is_empty() {
            return Err(Error::InvalidPath(String::new()));
        }
        Ok(Self { segments: out })
    }

    pub fn is_nested(&self) -> bool {
        self.segments.len() > 1
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn leaf(&self) -> &str {
        // parse/from_segments never yield an empty path
        &self.segments[self.segments.len() - 1]
    }

    /// The path without its last segment; `None` for a direct field.
    pub fn relation_prefix(&self) -> Option<FieldPath> {
        if !self.is_nested() {
            return None;
        }
        Some(FieldPath {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    /// Walks the path from `root`, checking that every segment but the last
    /// is a relation and that the leaf is a plain field of the final entity.
    pub fn resolve<'s, L: ShapeLookup>(
        &self,
        lookup: &'s L,
        root: &'s Shape,
    ) -> Result<ResolvedPath<'s>> {
        let mut shape = root;
        let (leaf, hops) = self
            .segments
            .split_last()
            .ok_or_else(|| Error::InvalidPath(self.to_string()))?;
        for hop in hops {
            shape = self.step(lookup, shape, hop)?;
        }
        let field = shape.require_field(leaf)?;
        if field.is_relation() {
            return Err(Error::RelationLeaf {
                entity: shape.name.clone(),
                field: leaf.clone(),
                path: self.to_string(),
            });
        }
        Ok(ResolvedPath { shape, field })
    }

    /// Like [`resolve`](Self::resolve) but every segment, the leaf included,
    /// must be a relation. Returns the shape at the end of the chain.
    pub fn resolve_relations<'s, L: ShapeLookup>(
        &self,
        lookup: &'s L,
        root: &'s Shape,
    ) -> Result<&'s Shape> {
        let mut shape = root;
        for hop in &self.segments {
            shape = self.step(lookup, shape, hop)?;
        }
        Ok(shape)
    }

    fn step<'s, L: ShapeLookup>(
        &self,
        lookup: &'s L,
        shape: &'s Shape,
        hop: &str,
    ) -> Result<&'s Shape> {
        shape.require_field(hop)?;
        if !lookup.is_relation_field(shape, hop) {
            return Err(Error::NotARelation {
                entity: shape.name.clone(),
                field: hop.to_string(),
                path: self.to_string(),
            });
        }
        lookup
            .related_shape_of(shape, hop)
            .ok_or_else(|| match shape.field(hop).and_then(Field::relation) {
                Some(rel) => Error::UnknownEntity(rel.target.clone()),
                None => Error::InvalidPath(self.to_string()),
            })
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("."))
    }
}

/// Leaf of a validated path.
#[derive(Debug, Clone, Copy)]
pub struct ResolvedPath<'s> {
    /// Entity owning the leaf field.
    pub shape: &'s Shape,
    pub field: &'s Field,
}

/// `a.b` becomes `{a: {b: true}}`.
pub fn build_relation_declaration(prefix: &FieldPath) -> RelationTree {
    build_relation_declaration_with(prefix, RelationNode::Load)
}

/// Same as [`build_relation_declaration`] with `deepest` under the last segment.
pub fn build_relation_declaration_with(prefix: &FieldPath, deepest: RelationNode) -> RelationTree {
    let mut node = deepest;
    for segment in prefix.segments.iter().skip(1).rev() {
        node = RelationNode::Nested(RelationTree::new().with(segment.clone(), node));
    }
    RelationTree::new().with(prefix.segments[0].clone(), node)
}

/// `a.b.c` with `V` becomes `{a: {b: {c: V}}}`. The leaf is not inspected.
pub fn build_nested_predicate(path: &FieldPath, leaf: impl Into<Condition>) -> PredicateTree {
    let mut condition = leaf.into();
    for segment in path.segments.iter().skip(1).rev() {
        condition = Condition::Nested(PredicateTree::new().with(segment.clone(), condition));
    }
    PredicateTree::new().with(path.segments[0].clone(), condition)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{schema::fixtures, value::Value};

    fn path(raw: &str) -> FieldPath {
        FieldPath::parse(raw).unwrap()
    }

    #[test]
    fn single_segment_is_not_nested() {
        let p = path("name");
        assert!(!p.is_nested());
        assert_eq!(p.relation_prefix(), None);
        assert_eq!(p.leaf(), "name");
    }

    #[test]
    fn nested_prefix_drops_the_leaf() {
        let p = path("a.b.c");
        assert!(p.is_nested());
        assert_eq!(p.segments(), ["a", "b", "c"]);
        assert_eq!(p.relation_prefix(), Some(path("a.b")));
    }

    #[test]
    fn empty_segments_are_rejected() {
        for raw in ["", ".a", "a.", "a..b"] {
            assert!(matches!(FieldPath::parse(raw), Err(Error::InvalidPath(_))), "{raw}");
        }
    }

    #[test]
    fn from_segments_flattens_dotted_hops() {
        let p = FieldPath::from_segments(["photos.tags", "x"]).unwrap();
        assert_eq!(p.to_string(), "photos.tags.x");
        assert!(FieldPath::from_segments(Vec::<&str>::new()).is_err());
    }

    #[test]
    fn relation_declaration_ends_in_marker() {
        let tree = build_relation_declaration(&path("a.b"));
        assert_eq!(
            serde_json::to_value(&tree).unwrap(),
            serde_json::json!({"a": {"b": true}})
        );
        let tree = build_relation_declaration(&path("a"));
        assert_eq!(serde_json::to_value(&tree).unwrap(), serde_json::json!({"a": true}));
    }

    #[test]
    fn nested_predicate_wraps_the_leaf() {
        let tree = build_nested_predicate(&path("a.b.c"), Value::Int(7));
        assert_eq!(
            serde_json::to_value(&tree).unwrap(),
            serde_json::json!({"a": {"b": {"c": 7}}})
        );
    }

    #[test]
    fn resolve_walks_relations() {
        let schema = fixtures::schema();
        let user = schema.shape("User").unwrap();
        let resolved = path("photos.tags.label").resolve(&schema, user).unwrap();
        assert_eq!(resolved.shape.name, "Tag");
        assert_eq!(resolved.field.name, "label");
    }

    #[test]
    fn resolve_rejects_scalar_hop() {
        let schema = fixtures::schema();
        let user = schema.shape("User").unwrap();
        let err = path("name.first").resolve(&schema, user).unwrap_err();
        assert!(matches!(
            err,
            Error::NotARelation { ref entity, ref field, .. } if entity == "User" && field == "name"
        ));
    }

    #[test]
    fn resolve_rejects_unknown_leaf() {
        let schema = fixtures::schema();
        let user = schema.shape("User").unwrap();
        let err = path("company.missing").resolve(&schema, user).unwrap_err();
        assert!(matches!(
            err,
            Error::UnknownField { ref entity, ref field } if entity == "Company" && field == "missing"
        ));
    }

    #[test]
    fn resolve_rejects_relation_leaf() {
        let schema = fixtures::schema();
        let user = schema.shape("User").unwrap();
        let err = path("photos.user").resolve(&schema, user).unwrap_err();
        assert!(matches!(
            err,
            Error::RelationLeaf { ref entity, ref field, ref path } if entity == "Photo" && field == "user" && path == "photos.user"
        ));
        assert!(matches!(
            path("company").resolve(&schema, user),
            Err(Error::RelationLeaf { .. })
        ));
    }

    #[test]
    fn resolve_relations_requires_relation_leaf() {
        let schema = fixtures::schema();
        let user = schema.shape("User").unwrap();
        assert_eq!(
            path("photos.tags").resolve_relations(&schema, user).unwrap().name,
            "Tag"
        );
        assert!(path("photos.url").resolve_relations(&schema, user).is_err());
    }
}
