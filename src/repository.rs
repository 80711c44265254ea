use std::{
    collections::HashMap,
    sync::Mutex,
    time::{Duration, Instant},
};

use metrics::{counter, histogram};

use crate::{
    adapters::{Executor, Translator},
    config::QueryConfig,
    cursor::PageCursor,
    error::{Error, Result},
    query::{CacheDirective, DynamicQuery, Materialize, Query, QuerySpec},
    schema::{Entity, Schema, Shape},
};

/// One page of rows and the token for the page after it.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub rows: Vec<serde_json::Value>,
    /// `None` when this page came back short.
    pub next: Option<String>,
}

struct CachedRows {
    expires_at: Instant,
    rows: Vec<serde_json::Value>,
}

/// Binds one entity of a [`Schema`] to an executor.
pub struct Repository<'s, X: Executor> {
    schema: &'s Schema,
    shape: &'s Shape,
    executor: X,
    config: QueryConfig,
    cache: Mutex<HashMap<String, CachedRows>>,
}

impl<'s, X: Executor> Repository<'s, X> {
    pub fn new(schema: &'s Schema, entity: &str, executor: X) -> Result<Self> {
        Ok(Self {
            schema,
            shape: schema.shape(entity)?,
            executor,
            config: QueryConfig::default(),
            cache: Mutex::new(HashMap::new()),
        })
    }

    pub fn of<E: Entity>(schema: &'s Schema, executor: X) -> Result<Self> {
        Self::new(schema, E::NAME, executor)
    }

    pub fn with_config(mut self, config: QueryConfig) -> Self {
        self.config = config;
        self
    }

    pub fn executor(&self) -> &X {
        &self.executor
    }

    pub fn query(&self) -> Query<'s> {
        Query::from_shape(self.schema, self.shape)
    }

    pub fn dynamic(&self) -> DynamicQuery<'s> {
        self.query().dynamic()
    }

    /// Applies the configured defaults: page size, page size clamp and the
    /// TTL behind `cache(true)`.
    pub fn prepare(&self, mut spec: QuerySpec) -> Result<QuerySpec> {
        if spec.entity != self.shape.name {
            return Err(Error::InvalidValue(format!(
                "query for `{}` given to the `{}` repository",
                spec.entity, self.shape.name
            )));
        }

        if spec.pagination.page_size().is_none() && self.config.default_page_size > 0 {
            spec.pagination.limit = Some(self.config.default_page_size);
        }
        if let Some(size) = spec.pagination.page_size() {
            let max = self.config.max_page_size;
            if max > 0 && size > max {
                tracing::warn!(
                    entity = %self.shape.name,
                    requested = size,
                    max,
                    "page size clamped"
                );
                spec.pagination.limit = Some(max);
            }
        }

        if spec.cache == CacheDirective::Default {
            spec.cache = CacheDirective::Ttl(self.config.default_cache());
        }
        Ok(spec)
    }

    pub fn translate(&self, spec: QuerySpec) -> Result<<X::Translator as Translator>::Output> {
        let spec = self.prepare(spec)?;
        self.lower(&spec)
    }

    fn lower(&self, spec: &QuerySpec) -> Result<<X::Translator as Translator>::Output> {
        let provider = <X::Translator as Translator>::PROVIDER;
        let native = self.executor.translator().translate(self.schema, spec)?;
        counter!(
            "quarry.query.translated",
            "entity" => self.shape.name.clone(),
            "provider" => provider
        )
        .increment(1);
        tracing::debug!(entity = %self.shape.name, provider, "query translated");
        Ok(native)
    }

    pub async fn find(&self, query: impl Materialize) -> Result<Vec<serde_json::Value>> {
        let spec = self.prepare(query.into_spec())?;
        self.run(spec).await
    }

    /// Like [`find`](Self::find), also returning the token for the next page
    /// when the query is paged.
    pub async fn find_page(&self, query: impl Materialize) -> Result<Page> {
        let spec = self.prepare(query.into_spec())?;
        let cursor = spec
            .pagination
            .page_size()
            .map(|limit| PageCursor::new(spec.pagination.offset().unwrap_or(0), limit));
        let rows = self.run(spec).await?;
        let next = cursor
            .and_then(|c| c.following(rows.len()))
            .map(|c| c.encode());
        tracing::debug!(
            entity = %self.shape.name,
            rows = rows.len(),
            has_next = next.is_some(),
            "page fetched"
        );
        Ok(Page { rows, next })
    }

    async fn run(&self, spec: QuerySpec) -> Result<Vec<serde_json::Value>> {
        let ttl = spec.cache.resolve(self.config.default_cache());
        let native = self.lower(&spec)?;
        let key = match ttl {
            Some(_) => serde_json::to_string(&native).ok(),
            None => None,
        };

        if let Some(rows) = key.as_deref().and_then(|k| self.cached(k)) {
            return Ok(rows);
        }

        let start = Instant::now();
        let rows = self.executor.execute(native).await?;
        histogram!(
            "quarry.query.duration_ms",
            "entity" => self.shape.name.clone(),
            "provider" => <X::Translator as Translator>::PROVIDER
        )
        .record(start.elapsed().as_millis() as f64);

        if let (Some(key), Some(ttl)) = (key, ttl) {
            self.remember(key, ttl, &rows);
        }
        Ok(rows)
    }

    fn cached(&self, key: &str) -> Option<Vec<serde_json::Value>> {
        let mut cache = self.cache.lock().ok()?;
        match cache.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.rows.clone()),
            Some(_) => {
                cache.remove(key);
                None
            }
            None => None,
        }
    }

    fn remember(&self, key: String, ttl: Duration, rows: &[serde_json::Value]) {
        if let Ok(mut cache) = self.cache.lock() {
            let now = Instant::now();
            cache.retain(|_, entry| entry.expires_at > now);
            cache.insert(
                key,
                CachedRows {
                    expires_at: now + ttl,
                    rows: rows.to_vec(),
                },
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{adapters::MemoryStore, schema::fixtures};

    fn store() -> MemoryStore {
        let store = MemoryStore::new();
        store
            .insert_many("users", (1..=5).map(|id| json!({"id": id, "age": id * 10})))
            .unwrap();
        store
    }

    #[test]
    fn prepare_applies_defaults_and_clamps() {
        let schema = fixtures::schema();
        let config = QueryConfig {
            default_cache_ms: 250,
            default_page_size: 2,
            max_page_size: 3,
        };
        let repo = Repository::new(&schema, "User", store())
            .unwrap()
            .with_config(config);

        let spec = repo.prepare(repo.query().cache(true).into_spec()).unwrap();
        assert_eq!(spec.pagination.page_size(), Some(2));
        assert_eq!(spec.cache, CacheDirective::Ttl(Duration::from_millis(250)));

        let spec = repo.prepare(repo.query().limit(50).into_spec()).unwrap();
        assert_eq!(spec.pagination.page_size(), Some(3));
    }

    #[test]
    fn prepare_rejects_foreign_entity() {
        let schema = fixtures::schema();
        let repo = Repository::new(&schema, "User", store()).unwrap();
        let spec = Query::new(&schema, "Photo").unwrap().into_spec();
        assert!(matches!(repo.prepare(spec), Err(Error::InvalidValue(_))));
    }

    #[tokio::test]
    async fn pages_until_short() {
        let schema = fixtures::schema();
        let repo = Repository::new(&schema, "User", store()).unwrap();

        let first = repo
            .find_page(repo.query().sort_asc("id").unwrap().limit(2))
            .await
            .unwrap();
        assert_eq!(first.rows.len(), 2);
        let token = first.next.expect("full page has a successor");

        let second = repo
            .find_page(repo.query().sort_asc("id").unwrap().next(&token).unwrap())
            .await
            .unwrap();
        assert_eq!(second.rows[0]["id"], json!(3));

        let third = repo
            .find_page(
                repo.query()
                    .sort_asc("id")
                    .unwrap()
                    .next(second.next.as_deref().unwrap())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(third.rows.len(), 1);
        assert_eq!(third.next, None);
    }

    #[tokio::test]
    async fn cached_results_survive_new_writes() {
        let schema = fixtures::schema();
        let repo = Repository::new(&schema, "User", store()).unwrap();
        let query = || repo.query().where_gte("age", 30).unwrap().cache(Duration::from_secs(60));

        assert_eq!(repo.find(query()).await.unwrap().len(), 3);
        repo.executor()
            .insert("users", json!({"id": 6, "age": 60}))
            .unwrap();
        assert_eq!(repo.find(query()).await.unwrap().len(), 3);
        assert_eq!(
            repo.find(repo.query().where_gte("age", 30).unwrap())
                .await
                .unwrap()
                .len(),
            4
        );
    }

    #[test]
    fn expired_entries_are_purged_on_insert() {
        let schema = fixtures::schema();
        let repo = Repository::new(&schema, "User", store()).unwrap();
        let rows = [json!({"id": 1})];
        for key in ["a", "b", "c"] {
            repo.remember(key.to_string(), Duration::from_millis(1), &rows);
        }
        std::thread::sleep(Duration::from_millis(5));

        repo.remember("d".to_string(), Duration::from_secs(60), &rows);
        let cache = repo.cache.lock().unwrap();
        assert_eq!(cache.len(), 1);
        assert!(cache.contains_key("d"));
    }
}
