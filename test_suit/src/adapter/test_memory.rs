#[cfg(test)]
mod tests {
    use quarry::{
        ChainViolation, Directive, Error, MemoryStore, Page, Query, QueryConfig, Repository,
        Schema,
    };
    use serde_json::json;

    use crate::{Author, Post, schema};

    fn seeded() -> MemoryStore {
        let store = MemoryStore::new();
        store
            .insert_many(
                "authors",
                [
                    json!({"id": 1, "name": "Ada", "country": "UK", "karma": 50, "tags": ["math", "poet"]}),
                    json!({"id": 2, "name": "Grace", "country": "US", "karma": 80, "tags": ["navy"]}),
                    json!({"id": 3, "name": "Linus", "country": "FI", "karma": 30, "tags": []}),
                    json!({"id": 4, "name": "Ken", "country": "US", "karma": 60, "tags": ["unix"]}),
                    json!({"id": 5, "name": "Barbara", "country": "US", "karma": null}),
                ],
            )
            .unwrap();
        store
            .insert_many(
                "posts",
                [
                    json!({"id": 10, "title": "Notes on the engine", "likes": 12, "published": true, "author_id": 1}),
                    json!({"id": 11, "title": "Compilers", "likes": 40, "published": true, "author_id": 2}),
                    json!({"id": 12, "title": "Draft", "likes": 0, "published": false, "author_id": 3}),
                ],
            )
            .unwrap();
        store
    }

    fn ids(rows: &[serde_json::Value]) -> Vec<i64> {
        rows.iter().filter_map(|r| r["id"].as_i64()).collect()
    }

    #[tokio::test]
    async fn test_filter_and_sort() {
        let schema = schema().unwrap();
        let repo = Repository::of::<Author>(&schema, seeded()).unwrap();

        let rows = repo
            .find(
                repo.query()
                    .where_eq("country", "US")
                    .unwrap()
                    .where_gte("karma", 50)
                    .unwrap()
                    .sort_desc("karma")
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(ids(&rows), [2, 4]);
    }

    #[tokio::test]
    async fn test_absent_values() {
        let schema = schema().unwrap();
        let repo = Repository::of::<Author>(&schema, seeded()).unwrap();
        let none: Option<i64> = None;

        let rows = repo
            .find(repo.query().where_eq("karma", none).unwrap())
            .await
            .unwrap();
        assert_eq!(ids(&rows), [5]);

        let rows = repo
            .find(repo.query().where_ne("karma", none).unwrap().sort_asc("id").unwrap())
            .await
            .unwrap();
        assert_eq!(ids(&rows), [1, 2, 3, 4]);

        // no-op instead of `karma > null`
        let rows = repo
            .find(repo.query().where_gt("karma", none).unwrap())
            .await
            .unwrap();
        assert_eq!(rows.len(), 5);
    }

    #[tokio::test]
    async fn test_where_in_then_shaping() {
        let schema = schema().unwrap();
        let repo = Repository::of::<Author>(&schema, seeded()).unwrap();

        let rows = repo
            .find(
                repo.query()
                    .where_in("id", [1i64, 3, 5])
                    .unwrap()
                    .sort_asc("name")
                    .unwrap()
                    .select("name")
                    .unwrap()
                    .select("id")
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(
            rows,
            [
                json!({"id": 1, "name": "Ada"}),
                json!({"id": 5, "name": "Barbara"}),
                json!({"id": 3, "name": "Linus"}),
            ]
        );
    }

    #[tokio::test]
    async fn test_where_or_distributes_prior_filters() {
        let schema = schema().unwrap();
        let repo = Repository::of::<Author>(&schema, seeded()).unwrap();

        let query = repo
            .query()
            .where_eq("country", "US")
            .unwrap()
            .where_or(|alt| {
                alt.branch(|q| q.where_gte("karma", 70))?
                    .branch(|q| q.where_null("karma"))
            })
            .unwrap()
            .sort_asc("id")
            .unwrap();
        let rows = repo.find(query).await.unwrap();
        // Ada is excluded by the shared country filter
        assert_eq!(ids(&rows), [2, 5]);
    }

    #[tokio::test]
    async fn test_array_filters() {
        let schema = schema().unwrap();
        let repo = Repository::of::<Author>(&schema, seeded()).unwrap();

        let rows = repo
            .find(repo.query().where_array_contains("tags", "poet").unwrap())
            .await
            .unwrap();
        assert_eq!(ids(&rows), [1]);

        let rows = repo
            .find(
                repo.query()
                    .where_array_contains_any("tags", ["unix", "navy"])
                    .unwrap()
                    .sort_asc("id")
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(ids(&rows), [2, 4]);
    }

    #[tokio::test]
    async fn test_prefix_match_on_document_store() {
        let schema = schema().unwrap();
        let repo = Repository::of::<Post>(&schema, seeded()).unwrap();

        let rows = repo
            .find(repo.query().where_starts_with("title", "Co").unwrap())
            .await
            .unwrap();
        assert_eq!(ids(&rows), [11]);

        let err = repo
            .find(repo.query().where_contains("title", "engine").unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Unsupported { provider: "document", .. }));
    }

    #[tokio::test]
    async fn test_relation_filters_are_rejected() {
        let schema = schema().unwrap();
        let repo = Repository::of::<Author>(&schema, seeded()).unwrap();

        let err = repo
            .find(repo.query().where_gt("posts.likes", 10).unwrap())
            .await
            .unwrap_err();
        assert!(
            matches!(&err, Error::Unsupported { operation, .. } if operation.contains("posts")),
            "{err}"
        );

        let err = repo
            .find(repo.query().fetch_relation(["posts"]).unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Unsupported { .. }));
    }

    #[tokio::test]
    async fn test_pagination_walks_every_row() {
        let schema = schema().unwrap();
        let repo = Repository::of::<Author>(&schema, seeded())
            .unwrap()
            .with_config(QueryConfig {
                default_page_size: 2,
                ..QueryConfig::default()
            });

        let mut seen = Vec::new();
        let mut token: Option<String> = None;
        loop {
            let mut query = repo.query().sort_asc("id").unwrap();
            if let Some(token) = &token {
                query = query.next(token).unwrap();
            }
            let Page { rows, next } = repo.find_page(query).await.unwrap();
            seen.extend(ids(&rows));
            match next {
                Some(next) => token = Some(next),
                None => break,
            }
        }
        assert_eq!(seen, [1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn test_dynamic_directives() {
        let schema = schema().unwrap();
        let repo = Repository::of::<Author>(&schema, seeded()).unwrap();

        let directives = Directive::from_json(
            r#"[
                {"op": "eq", "path": "country", "value": "US"},
                {"op": "in", "path": "id", "values": [2, 5]},
                {"op": "sort_desc", "field": "id"}
            ]"#,
        )
        .unwrap();
        let query = repo.dynamic().apply_all(directives).unwrap();
        assert!(query.is_terminal());
        assert_eq!(ids(&repo.find(query).await.unwrap()), [5, 2]);

        let err = repo
            .dynamic()
            .apply_all(
                Directive::from_json(
                    r#"[
                        {"op": "in", "path": "id", "values": [1]},
                        {"op": "gt", "path": "karma", "value": 10}
                    ]"#,
                )
                .unwrap(),
            )
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Chain(ChainViolation::AfterTerminal {
                call: "where_gt",
                terminal: "where_in"
            })
        ));
    }

    #[tokio::test]
    async fn test_repository_rejects_other_entities() {
        let schema = schema().unwrap();
        let repo = Repository::of::<Author>(&schema, seeded()).unwrap();
        let foreign = Query::of::<Post>(&schema).unwrap();
        assert!(matches!(
            repo.find(foreign).await,
            Err(Error::InvalidValue(_))
        ));

        let empty = Schema::new();
        assert!(matches!(
            Repository::of::<Author>(&empty, MemoryStore::new()),
            Err(Error::UnknownEntity(_))
        ));
    }
}
