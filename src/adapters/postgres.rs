use std::time::Duration;

use serde::Serialize;

use crate::{
    config::DEFAULT_CACHE,
    error::{Error, Result},
    operator::{Operator, Pattern, PatternKind},
    query::QuerySpec,
    schema::{Relation, Schema, Shape},
    tree::{Condition, Predicate, PredicateTree, RelationNode, RelationTree},
    value::Value,
};

use super::Translator;

const ROOT: &str = "root";

/// Parameterised SQL produced by [`PostgresTranslator`]. `$n` placeholders
/// refer to `params[n - 1]`.
///
/// Relations are joined with `LEFT JOIN`s aliased `root.<relation path>`
/// and come back as one JSON column per relation, named by its path.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PgStatement {
    pub sql: String,
    pub params: Vec<Value>,
    pub cache: Option<Duration>,
}

impl PgStatement {
    pub fn sql(&self) -> &str {
        &self.sql
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresTranslator;

impl Translator for PostgresTranslator {
    const PROVIDER: &'static str = "postgres";

    type Output = PgStatement;

    fn translate(&self, schema: &Schema, spec: &QuerySpec) -> Result<PgStatement> {
        let shape = schema.shape(&spec.entity)?;
        let mut writer = SqlWriter {
            schema,
            relations: &spec.relations,
            params: Vec::new(),
        };

        let mut joined = Vec::new();
        writer.collect_joins(shape, &spec.relations, "", &mut joined)?;

        let mut columns = Vec::new();
        if spec.selection.is_empty() {
            columns.push(format!("{}.*", quote(ROOT)));
        } else {
            for field in &spec.selection {
                shape.require_field(field)?;
                columns.push(column(ROOT, field));
            }
        }
        for join in &joined {
            let alias = alias_of(&join.path);
            if spec.load_relation_ids {
                columns.push(format!(
                    "{} AS {}",
                    column(&alias, &join.shape.primary_key),
                    quote(&join.path)
                ));
            } else {
                columns.push(format!("to_jsonb({}.*) AS {}", quote(&alias), quote(&join.path)));
            }
        }

        let mut sql = format!(
            "SELECT {} FROM {} AS {}",
            columns.join(", "),
            quote(&shape.table),
            quote(ROOT)
        );
        for join in &joined {
            let alias = alias_of(&join.path);
            sql.push_str(&format!(
                " LEFT JOIN {} AS {} ON {} = {}",
                quote(&join.shape.table),
                quote(&alias),
                column(&alias, &join.relation.foreign_key),
                column(&join.parent_alias, &join.relation.local_key)
            ));
        }

        if let Some(clause) = writer.where_clause(shape, &spec.predicate)? {
            sql.push_str(" WHERE ");
            sql.push_str(&clause);
        }

        if !spec.order.is_empty() {
            let mut keys = Vec::with_capacity(spec.order.len());
            for order in &spec.order {
                shape.require_field(&order.field)?;
                keys.push(format!(
                    "{} {}",
                    column(ROOT, &order.field),
                    order.direction.as_sql()
                ));
            }
            sql.push_str(" ORDER BY ");
            sql.push_str(&keys.join(", "));
        }

        if let Some(limit) = spec.pagination.page_size() {
            sql.push_str(&format!(" LIMIT {limit}"));
        }
        if let Some(offset) = spec.pagination.offset().filter(|o| *o > 0) {
            sql.push_str(&format!(" OFFSET {offset}"));
        }

        Ok(PgStatement {
            sql,
            params: writer.params,
            cache: spec.cache.resolve(DEFAULT_CACHE),
        })
    }
}

struct Join<'s> {
    path: String,
    parent_alias: String,
    shape: &'s Shape,
    relation: &'s Relation,
}

struct SqlWriter<'a> {
    schema: &'a Schema,
    relations: &'a RelationTree,
    params: Vec<Value>,
}

impl<'a> SqlWriter<'a> {
    fn bind(&mut self, value: Value) -> String {
        self.params.push(value);
        format!("${}", self.params.len())
    }

    fn bind_all(&mut self, values: &[Value]) -> String {
        values
            .iter()
            .map(|v| self.bind(v.clone()))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn relation_of<'s>(&self, shape: &'s Shape, field: &str, path: &str) -> Result<&'s Relation> {
        shape
            .require_field(field)?
            .relation()
            .ok_or_else(|| Error::NotARelation {
                entity: shape.name.clone(),
                field: field.to_string(),
                path: path.to_string(),
            })
    }

    fn collect_joins(
        &self,
        shape: &'a Shape,
        tree: &RelationTree,
        parent: &str,
        out: &mut Vec<Join<'a>>,
    ) -> Result<()> {
        for (name, node) in tree.iter() {
            let path = join_path(parent, name);
            let relation: &'a Relation = self.relation_of(shape, name, &path)?;
            let target = self.schema.shape(&relation.target)?;
            out.push(Join {
                path: path.clone(),
                parent_alias: if parent.is_empty() {
                    ROOT.to_string()
                } else {
                    alias_of(parent)
                },
                shape: target,
                relation,
            });
            if let RelationNode::Nested(child) = node {
                self.collect_joins(target, child, &path, out)?;
            }
        }
        Ok(())
    }

    fn where_clause(&mut self, shape: &Shape, predicate: &Predicate) -> Result<Option<String>> {
        match predicate {
            Predicate::All(tree) => {
                let terms = self.conjunction(shape, "", tree)?;
                Ok((!terms.is_empty()).then(|| terms.join(" AND ")))
            }
            Predicate::Any(branches) if branches.is_empty() => Ok(Some("FALSE".to_string())),
            Predicate::Any(branches) => {
                let mut alternatives = Vec::with_capacity(branches.len());
                for branch in branches {
                    let terms = self.conjunction(shape, "", branch)?;
                    alternatives.push(match terms.len() {
                        0 => "TRUE".to_string(),
                        1 => terms.join(""),
                        _ => format!("({})", terms.join(" AND ")),
                    });
                }
                Ok(Some(alternatives.join(" OR ")))
            }
        }
    }

    fn conjunction(&mut self, shape: &Shape, parent: &str, tree: &PredicateTree) -> Result<Vec<String>> {
        let alias = if parent.is_empty() {
            ROOT.to_string()
        } else {
            alias_of(parent)
        };
        let mut terms = Vec::new();
        for (key, condition) in tree.iter() {
            match condition {
                Condition::Nested(sub) => {
                    let path = join_path(parent, key);
                    let relation = self.relation_of(shape, key, &path)?;
                    let segments: Vec<String> = path.split('.').map(str::to_string).collect();
                    if !self.relations.contains_path(&segments) {
                        // filtering on a relation that is not joined
                        return Err(Error::InvalidPath(path));
                    }
                    let target = self.schema.shape(&relation.target)?;
                    terms.extend(self.conjunction(target, &path, sub)?);
                }
                Condition::Value(value) => {
                    shape.require_field(key)?;
                    terms.push(self.equality(&column(&alias, key), value));
                }
                Condition::Op(op) => {
                    shape.require_field(key)?;
                    terms.push(self.operator(&column(&alias, key), op));
                }
            }
        }
        Ok(terms)
    }

    fn equality(&mut self, col: &str, value: &Value) -> String {
        if value.is_null() {
            return format!("{col} IS NULL");
        }
        format!("{col} = {}", self.bind(value.clone()))
    }

    fn operator(&mut self, col: &str, op: &Operator) -> String {
        match op {
            Operator::Equal(v) => self.equality(col, v),
            Operator::MoreThan(v) => format!("{col} > {}", self.bind(v.clone())),
            Operator::MoreThanOrEqual(v) => format!("{col} >= {}", self.bind(v.clone())),
            Operator::LessThan(v) => format!("{col} < {}", self.bind(v.clone())),
            Operator::LessThanOrEqual(v) => format!("{col} <= {}", self.bind(v.clone())),
            Operator::Between(from, to) => {
                let from = self.bind(from.clone());
                let to = self.bind(to.clone());
                format!("{col} BETWEEN {from} AND {to}")
            }
            Operator::Like(pattern) => {
                let keyword = if pattern.case_insensitive {
                    "ILIKE"
                } else {
                    "LIKE"
                };
                format!(
                    "{col} {keyword} {}",
                    self.bind(Value::String(like_pattern(pattern)))
                )
            }
            Operator::In(values) if values.is_empty() => "FALSE".to_string(),
            Operator::In(values) => format!("{col} IN ({})", self.bind_all(values)),
            Operator::IsNull => format!("{col} IS NULL"),
            Operator::ArrayContains(v) => format!("{} = ANY({col})", self.bind(v.clone())),
            Operator::ArrayContainsAny(values) if values.is_empty() => "FALSE".to_string(),
            Operator::ArrayContainsAny(values) => {
                format!("{col} && ARRAY[{}]", self.bind_all(values))
            }
            Operator::Not(inner) => {
                if let Some(complement) = op.complement() {
                    return self.operator(col, &complement);
                }
                match inner.as_ref() {
                    Operator::Equal(v) if v.is_null() => format!("{col} IS NOT NULL"),
                    Operator::Equal(v) => format!("{col} <> {}", self.bind(v.clone())),
                    Operator::IsNull => format!("{col} IS NOT NULL"),
                    Operator::In(values) if values.is_empty() => "TRUE".to_string(),
                    Operator::In(values) => format!("{col} NOT IN ({})", self.bind_all(values)),
                    other => format!("NOT ({})", self.operator(col, other)),
                }
            }
        }
    }
}

fn join_path(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{parent}.{name}")
    }
}

fn alias_of(path: &str) -> String {
    format!("{ROOT}.{path}")
}

fn quote(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

fn column(alias: &str, field: &str) -> String {
    format!("{}.{}", quote(alias), quote(field))
}

fn like_pattern(pattern: &Pattern) -> String {
    let escaped = pattern
        .text
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    match pattern.kind {
        PatternKind::Prefix => format!("{escaped}%"),
        PatternKind::Suffix => format!("%{escaped}"),
        PatternKind::Contains => format!("%{escaped}%"),
    }
}

/// -----------------------------
/// Execution
/// -----------------------------

#[cfg(feature = "postgres")]
mod executor {
    use async_trait::async_trait;
    use sqlx::{
        PgPool, Postgres, Row,
        postgres::PgArguments,
        query::Query as PgQuery,
    };

    use super::{PgStatement, PostgresTranslator};
    use crate::{
        adapters::Executor,
        error::{Error, Result},
        value::Value,
    };

    /// Runs [`PgStatement`]s on a pool. Each row is returned as the JSON
    /// object of its columns.
    pub struct PgExecutor {
        pub(crate) pool: PgPool,
        translator: PostgresTranslator,
    }

    impl PgExecutor {
        pub fn new(pool: PgPool) -> Self {
            Self {
                pool,
                translator: PostgresTranslator,
            }
        }
    }

    #[async_trait]
    impl Executor for PgExecutor {
        type Translator = PostgresTranslator;

        fn translator(&self) -> &PostgresTranslator {
            &self.translator
        }

        async fn execute(&self, statement: PgStatement) -> Result<Vec<serde_json::Value>> {
            let sql = format!("SELECT to_jsonb(q) AS row FROM ({}) AS q", statement.sql);
            let mut query = sqlx::query(&sql);
            for param in statement.params {
                query = bind_value(query, param);
            }
            let rows = query
                .fetch_all(&self.pool)
                .await
                .map_err(|e| Error::Storage(e.to_string()))?;
            rows.into_iter()
                .map(|row| {
                    row.try_get::<serde_json::Value, _>("row")
                        .map_err(|e| Error::Storage(e.to_string()))
                })
                .collect()
        }
    }

    fn bind_value<'q>(
        query: PgQuery<'q, Postgres, PgArguments>,
        value: Value,
    ) -> PgQuery<'q, Postgres, PgArguments> {
        match value {
            Value::Null => query.bind(None::<String>),
            Value::Bool(b) => query.bind(b),
            Value::Int(i) => query.bind(i),
            Value::Float(f) => query.bind(f),
            Value::String(s) => query.bind(s),
            Value::Uuid(u) => query.bind(u),
            Value::Timestamp(t) => query.bind(t),
            Value::List(items) => {
                if let Some(ints) = items.iter().map(Value::as_int).collect::<Option<Vec<_>>>() {
                    query.bind(ints)
                } else if let Some(strings) = items
                    .iter()
                    .map(|v| v.as_str().map(str::to_string))
                    .collect::<Option<Vec<_>>>()
                {
                    query.bind(strings)
                } else {
                    query.bind(Value::List(items).to_json())
                }
            }
        }
    }
}

#[cfg(feature = "postgres")]
pub use executor::PgExecutor;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        query::{CacheDirective, Materialize, Query},
        schema::fixtures,
    };

    fn translate(spec: QuerySpec) -> PgStatement {
        PostgresTranslator
            .translate(&fixtures::schema(), &spec)
            .unwrap()
    }

    #[test]
    fn plain_filters_bind_parameters() {
        let schema = fixtures::schema();
        let spec = Query::new(&schema, "User")
            .unwrap()
            .where_eq("status", "active")
            .unwrap()
            .where_gte("age", 18)
            .unwrap()
            .sort_desc("age")
            .unwrap()
            .limit(10)
            .into_spec();
        let statement = translate(spec);
        assert_eq!(
            statement.sql(),
            r#"SELECT "root".* FROM "users" AS "root" WHERE "root"."age" >= $1 AND "root"."status" = $2 ORDER BY "root"."age" DESC LIMIT 10"#
        );
        assert_eq!(
            statement.params,
            vec![Value::Int(18), Value::String("active".to_string())]
        );
        assert_eq!(statement.cache, None);
    }

    #[test]
    fn nested_paths_join_their_relations() {
        let schema = fixtures::schema();
        let spec = Query::new(&schema, "User")
            .unwrap()
            .where_eq("photos.tags.label", "sea")
            .unwrap()
            .into_spec();
        let statement = translate(spec);
        assert_eq!(
            statement.sql(),
            concat!(
                r#"SELECT "root".*, to_jsonb("root.photos".*) AS "photos", "#,
                r#"to_jsonb("root.photos.tags".*) AS "photos.tags" FROM "users" AS "root" "#,
                r#"LEFT JOIN "photos" AS "root.photos" ON "root.photos"."user_id" = "root"."id" "#,
                r#"LEFT JOIN "tags" AS "root.photos.tags" ON "root.photos.tags"."photo_id" = "root.photos"."id" "#,
                r#"WHERE "root.photos.tags"."label" = $1"#
            )
        );
    }

    #[test]
    fn relation_ids_select_only_keys() {
        let schema = fixtures::schema();
        let spec = Query::new(&schema, "User")
            .unwrap()
            .select("name")
            .unwrap()
            .fetch_relation(["company"])
            .unwrap()
            .load_relation_ids()
            .into_spec();
        assert_eq!(
            translate(spec).sql(),
            concat!(
                r#"SELECT "root"."name", "root.company"."id" AS "company" FROM "users" AS "root" "#,
                r#"LEFT JOIN "companies" AS "root.company" ON "root.company"."id" = "root"."company_id""#
            )
        );
    }

    #[test]
    fn or_renders_parenthesised_alternatives() {
        let schema = fixtures::schema();
        let spec = Query::new(&schema, "User")
            .unwrap()
            .where_eq("status", "active")
            .unwrap()
            .where_or(|alt| {
                alt.branch(|q| q.where_eq("role", "admin"))?
                    .branch(|q| q.where_lt("age", 30))
            })
            .unwrap()
            .into_spec();
        let statement = translate(spec);
        assert_eq!(
            statement.sql(),
            r#"SELECT "root".* FROM "users" AS "root" WHERE ("root"."role" = $1 AND "root"."status" = $2) OR ("root"."age" < $3 AND "root"."status" = $4)"#
        );
        assert_eq!(statement.params.len(), 4);
    }

    #[test]
    fn negations_use_complements_or_direct_forms() {
        let schema = fixtures::schema();
        let spec = Query::new(&schema, "User")
            .unwrap()
            .where_not_gt("age", 65)
            .unwrap()
            .where_ne("role", "guest")
            .unwrap()
            .where_not_null("name")
            .unwrap()
            .into_spec();
        assert_eq!(
            translate(spec).sql(),
            r#"SELECT "root".* FROM "users" AS "root" WHERE "root"."age" <= $1 AND "root"."name" IS NOT NULL AND "root"."role" <> $2"#
        );
    }

    #[test]
    fn other_negations_fall_back_to_a_wrapper() {
        let mut spec = QuerySpec {
            entity: "User".to_string(),
            ..QuerySpec::default()
        };
        spec.predicate = Predicate::All(PredicateTree::new().with(
            "name",
            crate::operator::not(crate::operator::like(PatternKind::Contains, "bot", true)),
        ));
        let statement = translate(spec);
        assert_eq!(
            statement.sql(),
            r#"SELECT "root".* FROM "users" AS "root" WHERE NOT ("root"."name" ILIKE $1)"#
        );
        assert_eq!(statement.params, vec![Value::String("%bot%".to_string())]);
    }

    #[test]
    fn patterns_escape_wildcards() {
        let schema = fixtures::schema();
        let spec = Query::new(&schema, "User")
            .unwrap()
            .where_starts_with("name", "50%_off")
            .unwrap()
            .into_spec();
        assert_eq!(
            translate(spec).params,
            vec![Value::String("50\\%\\_off%".to_string())]
        );
    }

    #[test]
    fn membership_and_paging() {
        let schema = fixtures::schema();
        let token = crate::cursor::PageCursor::new(40, 20).encode();
        let spec = Query::new(&schema, "User")
            .unwrap()
            .where_in("role", ["admin", "owner"])
            .unwrap()
            .next(&token)
            .unwrap()
            .cache(CacheDirective::Default)
            .into_spec();
        let statement = translate(spec);
        assert_eq!(
            statement.sql(),
            r#"SELECT "root".* FROM "users" AS "root" WHERE "root"."role" IN ($1, $2) LIMIT 20 OFFSET 40"#
        );
        assert_eq!(statement.cache, Some(DEFAULT_CACHE));
    }

    #[test]
    fn array_operators() {
        let schema = fixtures::schema();
        let spec = Query::new(&schema, "User")
            .unwrap()
            .where_array_contains("labels", "vip")
            .unwrap()
            .into_spec();
        assert_eq!(
            translate(spec).sql(),
            r#"SELECT "root".* FROM "users" AS "root" WHERE $1 = ANY("root"."labels")"#
        );
    }

    #[test]
    fn unjoined_nested_filter_is_rejected() {
        let mut spec = QuerySpec {
            entity: "User".to_string(),
            ..QuerySpec::default()
        };
        spec.predicate = Predicate::All(
            PredicateTree::new().with("company", PredicateTree::new().with("name", Value::from("x"))),
        );
        let err = PostgresTranslator
            .translate(&fixtures::schema(), &spec)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidPath(_)));
    }
}
