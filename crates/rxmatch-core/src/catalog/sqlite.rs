//! SQLite-backed drug catalog.
//!
//! Writes go through one long-lived connection. Each query opens its own
//! connection on the blocking pool, so a stalled query never holds up the
//! others. In-memory catalogs use a named shared-cache database so those
//! connections see the same data.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use rusqlite::functions::FunctionFlags;
use rusqlite::types::{Value, ValueRef};
use rusqlite::{params, Connection, OpenFlags, Row, ToSql};
use tracing::{debug, warn};
use uuid::Uuid;

use super::{
    fold_case, CatalogBackend, CatalogError, CatalogQuery, CatalogResult, CatalogRow,
    CompiledQuery, ParamValue, FOLD_FN, SCHEMA,
};
use crate::models::CatalogDrug;

/// Drug catalog stored in a SQLite database.
#[derive(Clone)]
pub struct SqliteCatalog {
    writer: Arc<Mutex<Connection>>,
    /// File path or shared-cache URI that query connections open
    location: Arc<str>,
}

impl SqliteCatalog {
    /// Open catalog at path, creating if needed.
    pub fn open<P: AsRef<Path>>(path: P) -> CatalogResult<Self> {
        Self::with_location(path.as_ref().to_string_lossy().into_owned())
    }

    /// Create in-memory catalog (for testing).
    pub fn open_in_memory() -> CatalogResult<Self> {
        Self::with_location(format!(
            "file:rxmatch-{}?mode=memory&cache=shared",
            Uuid::new_v4()
        ))
    }

    fn with_location(location: String) -> CatalogResult<Self> {
        let conn = connect(&location, OpenFlags::SQLITE_OPEN_CREATE)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            writer: Arc::new(Mutex::new(conn)),
            location: location.into(),
        })
    }

    fn lock(&self) -> CatalogResult<MutexGuard<'_, Connection>> {
        self.writer
            .lock()
            .map_err(|_| CatalogError::Unavailable("connection lock poisoned".into()))
    }

    /// Insert or update a drug. Rows without an RxCUI are always inserted.
    pub fn upsert_drug(&self, drug: &CatalogDrug) -> CatalogResult<()> {
        let conn = self.lock()?;
        upsert(&conn, drug)
    }

    /// Insert or update many drugs in one transaction.
    pub fn upsert_drugs(&self, drugs: &[CatalogDrug]) -> CatalogResult<usize> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        for drug in drugs {
            upsert(&tx, drug)?;
        }
        tx.commit()?;
        Ok(drugs.len())
    }

    /// Number of rows in the catalog.
    pub fn count(&self) -> CatalogResult<usize> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM drugs", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Run a compiled query on the calling thread with a fresh connection.
    pub fn execute_blocking(&self, compiled: &CompiledQuery) -> CatalogResult<Vec<CatalogRow>> {
        let values: Vec<(&str, Value)> = compiled
            .params
            .iter()
            .map(|(name, value)| {
                let value = match value {
                    ParamValue::Text(s) => Value::Text(s.clone()),
                    ParamValue::Integer(i) => Value::Integer(*i),
                };
                (name.as_str(), value)
            })
            .collect();
        let named: Vec<(&str, &dyn ToSql)> = values
            .iter()
            .map(|(name, value)| (*name, value as &dyn ToSql))
            .collect();

        let conn = connect(&self.location, OpenFlags::empty())?;
        let mut stmt = conn.prepare(&compiled.text)?;
        let rows = stmt.query_map(named.as_slice(), map_row)?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }
}

/// Open a read-write connection with the case-folding function registered.
fn connect(location: &str, extra: OpenFlags) -> CatalogResult<Connection> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_URI
        | OpenFlags::SQLITE_OPEN_NO_MUTEX
        | extra;
    let conn = Connection::open_with_flags(location, flags)?;
    conn.create_scalar_function(
        FOLD_FN,
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            Ok(match ctx.get_raw(0) {
                ValueRef::Text(text) => Some(fold_case(&String::from_utf8_lossy(text))),
                ValueRef::Integer(i) => Some(i.to_string()),
                ValueRef::Real(r) => Some(r.to_string()),
                ValueRef::Null | ValueRef::Blob(_) => None,
            })
        },
    )?;
    Ok(conn)
}

fn upsert(conn: &Connection, drug: &CatalogDrug) -> CatalogResult<()> {
    let embedding_json = drug
        .embedding
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;

    conn.execute(
        r#"
        INSERT INTO drugs (
            rxcui, name, full_name, generic_name, brand_name,
            strength, route, dose_form, term_type, embedding, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, datetime('now'))
        ON CONFLICT(rxcui) DO UPDATE SET
            name = excluded.name,
            full_name = excluded.full_name,
            generic_name = excluded.generic_name,
            brand_name = excluded.brand_name,
            strength = excluded.strength,
            route = excluded.route,
            dose_form = excluded.dose_form,
            term_type = excluded.term_type,
            embedding = excluded.embedding,
            updated_at = datetime('now')
        "#,
        params![
            drug.rxcui,
            drug.name,
            drug.full_name,
            drug.generic_name,
            drug.brand_name,
            drug.strength,
            drug.route,
            drug.dose_form,
            drug.term_type,
            embedding_json,
        ],
    )?;
    Ok(())
}

fn map_row(row: &Row<'_>) -> rusqlite::Result<CatalogRow> {
    let embedding: Option<String> = row.get(10)?;
    let drug = CatalogDrug {
        rxcui: row.get(0)?,
        name: row.get(1)?,
        full_name: row.get(2)?,
        generic_name: row.get(3)?,
        brand_name: row.get(4)?,
        strength: row.get(5)?,
        route: row.get(6)?,
        dose_form: row.get(7)?,
        term_type: row.get(8)?,
        embedding: embedding.and_then(|json| parse_embedding(&json)),
    };
    Ok(CatalogRow {
        drug,
        score: row.get(9)?,
    })
}

fn parse_embedding(json: &str) -> Option<Vec<f32>> {
    match serde_json::from_str::<Vec<f32>>(json) {
        Ok(vector) => Some(vector),
        Err(e) => {
            debug!(error = %e, "skipping malformed embedding");
            None
        }
    }
}

#[async_trait]
impl CatalogBackend for SqliteCatalog {
    async fn execute(&self, query: &CatalogQuery) -> CatalogResult<Vec<CatalogRow>> {
        let compiled = query.to_sql();
        let label = query.label;
        let catalog = self.clone();

        let rows = tokio::task::spawn_blocking(move || catalog.execute_blocking(&compiled))
            .await?
            .map_err(|e| {
                warn!(query = label, error = %e, "catalog query failed");
                e
            })?;

        debug!(query = label, rows = rows.len(), "catalog query");
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Field, Predicate, ScoreExpr, SortKey};

    fn seeded() -> SqliteCatalog {
        let catalog = SqliteCatalog::open_in_memory().unwrap();
        catalog
            .upsert_drug(
                &CatalogDrug::new("R1", "metformin")
                    .strength("500 MG")
                    .term_type("SCD")
                    .embedding(vec![1.0, 0.0]),
            )
            .unwrap();
        catalog
            .upsert_drug(
                &CatalogDrug::new("R2", "Metformin HCl")
                    .strength("850 MG")
                    .term_type("SBD"),
            )
            .unwrap();
        catalog
    }

    #[test]
    fn test_upsert_and_count() {
        let catalog = seeded();
        assert_eq!(catalog.count().unwrap(), 2);

        catalog
            .upsert_drug(&CatalogDrug::new("R1", "metformin").strength("1000 MG"))
            .unwrap();
        assert_eq!(catalog.count().unwrap(), 2);
    }

    #[test]
    fn test_upsert_many() {
        let catalog = SqliteCatalog::open_in_memory().unwrap();
        let drugs = vec![
            CatalogDrug::new("A", "aspirin"),
            CatalogDrug::new("B", "ibuprofen"),
        ];
        assert_eq!(catalog.upsert_drugs(&drugs).unwrap(), 2);
        assert_eq!(catalog.count().unwrap(), 2);
    }

    #[test]
    fn test_case_insensitive_contains() {
        let catalog = seeded();
        let query = CatalogQuery::new("t", Predicate::contains(Field::Name, "METFORMIN"));
        let rows = catalog.execute_blocking(&query.to_sql()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].drug.rxcui.as_deref(), Some("R1"));
    }

    #[test]
    fn test_score_and_order() {
        let catalog = seeded();
        let query = CatalogQuery::new("t", Predicate::contains(Field::Name, "metformin"))
            .scored(ScoreExpr::new(0.5).when(Predicate::contains(Field::Strength, "850"), 0.9))
            .order_by(SortKey::ScoreDesc)
            .limit(1);
        let rows = catalog.execute_blocking(&query.to_sql()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].drug.rxcui.as_deref(), Some("R2"));
        assert_eq!(rows[0].score, Some(0.9));
    }

    #[test]
    fn test_embedding_roundtrip() {
        let catalog = seeded();
        let query = CatalogQuery::new("t", Predicate::HasEmbedding).with_embedding();
        let rows = catalog.execute_blocking(&query.to_sql()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].drug.embedding, Some(vec![1.0, 0.0]));
        assert!(rows[0].score.is_none());
    }

    #[test]
    fn test_non_ascii_case_insensitive() {
        let catalog = SqliteCatalog::open_in_memory().unwrap();
        catalog
            .upsert_drug(&CatalogDrug::new("F1", "Ácido Fólico").strength("5 MG"))
            .unwrap();

        let contains = CatalogQuery::new("t", Predicate::contains(Field::Name, "ÁCIDO"));
        assert_eq!(catalog.execute_blocking(&contains.to_sql()).unwrap().len(), 1);

        let equals = CatalogQuery::new("t", Predicate::equals(Field::Name, "ácido fólico"));
        assert_eq!(catalog.execute_blocking(&equals.to_sql()).unwrap().len(), 1);
    }

    #[test]
    fn test_in_memory_catalogs_are_isolated() {
        let a = seeded();
        let b = SqliteCatalog::open_in_memory().unwrap();
        assert_eq!(a.count().unwrap(), 2);
        assert_eq!(b.count().unwrap(), 0);

        let query = CatalogQuery::new("t", Predicate::contains(Field::Name, "metformin"));
        assert!(b.execute_blocking(&query.to_sql()).unwrap().is_empty());
    }

    #[test]
    fn test_file_catalog_reopens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.db");
        {
            let catalog = SqliteCatalog::open(&path).unwrap();
            catalog
                .upsert_drug(&CatalogDrug::new("R1", "metformin"))
                .unwrap();
        }

        let catalog = SqliteCatalog::open(&path).unwrap();
        let query = CatalogQuery::new("t", Predicate::equals(Field::Name, "METFORMIN"));
        let rows = catalog.execute_blocking(&query.to_sql()).unwrap();
        assert_eq!(rows[0].drug.rxcui.as_deref(), Some("R1"));
    }

    #[tokio::test]
    async fn test_queries_do_not_wait_on_writer() {
        let catalog = seeded();
        let _writer = catalog.lock().unwrap();

        let query = CatalogQuery::new("t", Predicate::contains(Field::Name, "metformin"));
        let rows = tokio::time::timeout(std::time::Duration::from_secs(5), catalog.execute(&query))
            .await
            .expect("query blocked behind the writer")
            .unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[tokio::test]
    async fn test_async_execute() {
        let catalog = seeded();
        let query = CatalogQuery::new(
            "t",
            Predicate::TermTypeIn(vec![crate::models::TermType::Sbd]),
        );
        let rows = catalog.execute(&query).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].drug.name.as_deref(), Some("Metformin HCl"));
    }
}
