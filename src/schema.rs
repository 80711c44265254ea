use std::collections::BTreeMap;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    One,
    Many,
}

/// Join metadata for a relation-valued field: the related row matches when
/// `related.foreign_key = owner.local_key`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relation {
    pub target: String,
    pub cardinality: Cardinality,
    pub local_key: String,
    pub foreign_key: String,
}

impl Relation {
    /// Owner holds the key, e.g. `post.author_id -> user.id`.
    pub fn one(
        target: impl Into<String>,
        local_key: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        Self {
            target: target.into(),
            cardinality: Cardinality::One,
            local_key: local_key.into(),
            foreign_key: foreign_key.into(),
        }
    }

    /// Related rows hold the key, e.g. `user.id <- photo.user_id`.
    pub fn many(
        target: impl Into<String>,
        local_key: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        Self {
            target: target.into(),
            cardinality: Cardinality::Many,
            local_key: local_key.into(),
            foreign_key: foreign_key.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind {
    Scalar,
    Array,
    Relation(Relation),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    pub kind: FieldKind,
}

impl Field {
    pub fn relation(&self) -> Option<&Relation> {
        match &self.kind {
            FieldKind::Relation(rel) => Some(rel),
            _ => None,
        }
    }

    pub fn is_relation(&self) -> bool {
        self.relation().is_some()
    }
}

/// Field layout of one entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shape {
    pub name: String,
    /// Table for the relational adapter, collection for the document adapter.
    pub table: String,
    pub primary_key: String,
    pub fields: Vec<Field>,
}

impl Shape {
    pub fn new(name: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: table.into(),
            primary_key: "id".to_string(),
            fields: Vec::new(),
        }
    }

    pub fn with_primary_key(mut self, key: impl Into<String>) -> Self {
        self.primary_key = key.into();
        self
    }

    pub fn with_field(self, name: impl Into<String>) -> Self {
        self.push(name, FieldKind::Scalar)
    }

    pub fn with_array_field(self, name: impl Into<String>) -> Self {
        self.push(name, FieldKind::Array)
    }

    pub fn with_relation(self, name: impl Into<String>, relation: Relation) -> Self {
        self.push(name, FieldKind::Relation(relation))
    }

    fn push(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        let name = name.into();
        self.fields.retain(|f| f.name != name);
        self.fields.push(Field { name, kind });
        self
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub(crate) fn require_field(&self, name: &str) -> Result<&Field> {
        self.field(name).ok_or_else(|| Error::UnknownField {
            entity: self.name.clone(),
            field: name.to_string(),
        })
    }
}

/// Implemented by `#[derive(Entity)]`.
pub trait Entity {
    const NAME: &'static str;

    fn shape() -> Shape;
}

/// Entity metadata lookup consumed by path resolution.
pub trait ShapeLookup {
    fn shape_of(&self, entity: &str) -> Option<&Shape>;

    fn is_relation_field(&self, shape: &Shape, field: &str) -> bool {
        shape.field(field).is_some_and(Field::is_relation)
    }

    fn related_shape_of(&self, shape: &Shape, field: &str) -> Option<&Shape> {
        let relation = shape.field(field)?.relation()?;
        self.shape_of(&relation.target)
    }
}

/// Explicitly constructed registry of entity shapes.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    shapes: BTreeMap<String, Shape>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_shape(mut self, shape: Shape) -> Self {
        self.shapes.insert(shape.name.clone(), shape);
        self
    }

    pub fn register<E: Entity>(self) -> Self {
        self.with_shape(E::shape())
    }

    /// Every relation must point at a registered entity.
    pub fn validate(self) -> Result<Self> {
        for shape in self.shapes.values() {
            for field in &shape.fields {
                if let Some(rel) = field.relation() {
                    if !self.shapes.contains_key(&rel.target) {
                        return Err(Error::UnknownEntity(rel.target.clone()));
                    }
                }
            }
        }
        Ok(self)
    }

    pub fn shape(&self, entity: &str) -> Result<&Shape> {
        self.shapes
            .get(entity)
            .ok_or_else(|| Error::UnknownEntity(entity.to_string()))
    }

    pub fn shapes(&self) -> impl Iterator<Item = &Shape> {
        self.shapes.values()
    }
}

impl ShapeLookup for Schema {
    fn shape_of(&self, entity: &str) -> Option<&Shape> {
        self.shapes.get(entity)
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    /// User 1-n Photo, Photo n-1 User, User n-1 Company, Photo 1-n Tag.
    pub fn schema() -> Schema {
        Schema::new()
            .with_shape(
                Shape::new("User", "users")
                    .with_field("id")
                    .with_field("name")
                    .with_field("age")
                    .with_field("role")
                    .with_field("status")
                    .with_field("company_id")
                    .with_array_field("labels")
                    .with_relation("photos", Relation::many("Photo", "id", "user_id"))
                    .with_relation("company", Relation::one("Company", "company_id", "id")),
            )
            .with_shape(
                Shape::new("Photo", "photos")
                    .with_field("id")
                    .with_field("url")
                    .with_field("user_id")
                    .with_relation("user", Relation::one("User", "user_id", "id"))
                    .with_relation("tags", Relation::many("Tag", "id", "photo_id")),
            )
            .with_shape(
                Shape::new("Company", "companies")
                    .with_field("id")
                    .with_field("name")
                    .with_field("country"),
            )
            .with_shape(
                Shape::new("Tag", "tags")
                    .with_field("id")
                    .with_field("label")
                    .with_field("photo_id"),
            )
            .validate()
            .expect("fixture schema is consistent")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_classifies_fields() {
        let schema = fixtures::schema();
        let user = schema.shape("User").unwrap();
        assert!(schema.is_relation_field(user, "photos"));
        assert!(!schema.is_relation_field(user, "name"));
        assert!(!schema.is_relation_field(user, "missing"));
        assert_eq!(
            schema.related_shape_of(user, "company").map(|s| s.table.as_str()),
            Some("companies")
        );
    }

    #[test]
    fn validate_rejects_dangling_relation() {
        let err = Schema::new()
            .with_shape(Shape::new("A", "a").with_relation("b", Relation::one("B", "b_id", "id")))
            .validate()
            .unwrap_err();
        assert!(matches!(err, Error::UnknownEntity(name) if name == "B"));
    }

    #[test]
    fn redeclaring_a_field_replaces_it() {
        let shape = Shape::new("A", "a").with_field("x").with_array_field("x");
        assert_eq!(shape.fields.len(), 1);
        assert_eq!(shape.field("x").unwrap().kind, FieldKind::Array);
    }
}
