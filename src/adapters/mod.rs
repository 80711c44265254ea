//! Provider translators and the executors that run their output.

pub mod document;
pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use serde::Serialize;

use crate::{error::Result, query::QuerySpec, schema::Schema};

pub use document::{DocumentFilter, DocumentQuery, DocumentTranslator, FieldOp};
pub use memory::MemoryStore;
#[cfg(feature = "postgres")]
pub use postgres::PgExecutor;
pub use postgres::{PgStatement, PostgresTranslator};

/// -----------------------------
/// Translator contract
/// -----------------------------

/// Lowers a [`QuerySpec`] into one provider's native query form.
///
/// A translator must reject what its provider cannot express with
/// [`Error::Unsupported`](crate::error::Error::Unsupported) rather than
/// translate it to something with different semantics.
pub trait Translator: Send + Sync {
    const PROVIDER: &'static str;

    type Output: Serialize + Send + Sync;

    fn translate(&self, schema: &Schema, spec: &QuerySpec) -> Result<Self::Output>;
}

/// -----------------------------
/// Executor contract
/// -----------------------------

/// Runs translated queries. Rows come back as JSON objects keyed by column
/// (relational) or field (document) name.
#[async_trait]
pub trait Executor: Send + Sync {
    type Translator: Translator;

    fn translator(&self) -> &Self::Translator;

    async fn execute(
        &self,
        native: <Self::Translator as Translator>::Output,
    ) -> Result<Vec<serde_json::Value>>;
}
