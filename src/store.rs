use std::fs;
use std::sync::Mutex;

use camino::{Utf8Path, Utf8PathBuf};
use rusqlite::{Connection, ErrorCode, OptionalExtension, params};

use crate::config::ResolvedConfig;
use crate::domain::{CacheRecord, Identifier, TaxonomyId};
use crate::error::TallyError;

/// Identifier to taxonomy lookup table, filled lazily from NCBI.
pub trait LookupCache {
    fn exists(&self, id: &Identifier) -> Result<bool, TallyError>;
    fn get(&self, id: &Identifier) -> Result<CacheRecord, TallyError>;
    /// Fails with `DuplicateKey` instead of overwriting.
    fn put(&self, record: &CacheRecord) -> Result<(), TallyError>;
    /// Organism name of the earliest record carrying `taxonomy_id`.
    fn find_by_taxonomy(&self, taxonomy_id: &TaxonomyId) -> Result<String, TallyError>;
}

/// SQLite table `(sid TEXT PRIMARY KEY, orgname TEXT, taxonomy TEXT)`.
///
/// A connection is opened for each operation and dropped when it returns.
#[derive(Debug, Clone)]
pub struct SqliteCache {
    path: Utf8PathBuf,
    table: String,
}

impl SqliteCache {
    /// `table` must already be a validated SQL identifier (see `ConfigLoader`).
    pub fn new(path: Utf8PathBuf, table: impl Into<String>) -> Self {
        Self {
            path,
            table: table.into(),
        }
    }

    pub fn from_config(config: &ResolvedConfig) -> Self {
        Self::new(config.cache_path.clone(), config.table_name.clone())
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    pub fn ensure_table(&self) -> Result<(), TallyError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_str().is_empty()) {
            fs::create_dir_all(parent.as_std_path())
                .map_err(|err| TallyError::Filesystem(err.to_string()))?;
        }
        let conn = self.connect()?;
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {} (
                sid TEXT PRIMARY KEY,
                orgname TEXT,
                taxonomy TEXT
            );",
            self.table
        ))
        .map_err(|err| TallyError::Cache(err.to_string()))
    }

    pub fn len(&self) -> Result<usize, TallyError> {
        let conn = self.connect()?;
        let count: i64 = conn
            .query_row(&format!("SELECT count(*) FROM {}", self.table), [], |row| {
                row.get(0)
            })
            .map_err(|err| TallyError::Cache(err.to_string()))?;
        Ok(count as usize)
    }

    pub fn is_empty(&self) -> Result<bool, TallyError> {
        Ok(self.len()? == 0)
    }

    fn connect(&self) -> Result<Connection, TallyError> {
        Connection::open(self.path.as_std_path())
            .map_err(|err| TallyError::Cache(format!("open {}: {err}", self.path)))
    }
}

impl LookupCache for SqliteCache {
    fn exists(&self, id: &Identifier) -> Result<bool, TallyError> {
        let conn = self.connect()?;
        let found: Option<i64> = conn
            .query_row(
                &format!("SELECT 1 FROM {} WHERE sid = ?1 LIMIT 1", self.table),
                params![id.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(|err| TallyError::Cache(err.to_string()))?;
        Ok(found.is_some())
    }

    fn get(&self, id: &Identifier) -> Result<CacheRecord, TallyError> {
        let conn = self.connect()?;
        let row: Option<(String, String)> = conn
            .query_row(
                &format!(
                    "SELECT taxonomy, orgname FROM {} WHERE sid = ?1",
                    self.table
                ),
                params![id.as_str()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(|err| TallyError::Cache(err.to_string()))?;
        let (taxonomy, orgname) =
            row.ok_or_else(|| TallyError::IdentifierNotFound(id.to_string()))?;
        Ok(CacheRecord::new(
            id.clone(),
            TaxonomyId::from_stored(taxonomy),
            orgname,
        ))
    }

    fn put(&self, record: &CacheRecord) -> Result<(), TallyError> {
        let conn = self.connect()?;
        conn.execute(
            &format!(
                "INSERT INTO {} (sid, orgname, taxonomy) VALUES (?1, ?2, ?3)",
                self.table
            ),
            params![
                record.identifier.as_str(),
                record.organism_name,
                record.taxonomy_id.as_str()
            ],
        )
        .map_err(|err| match err {
            rusqlite::Error::SqliteFailure(ref failure, _)
                if failure.code == ErrorCode::ConstraintViolation =>
            {
                TallyError::DuplicateKey(record.identifier.to_string())
            }
            other => TallyError::Cache(other.to_string()),
        })?;
        Ok(())
    }

    fn find_by_taxonomy(&self, taxonomy_id: &TaxonomyId) -> Result<String, TallyError> {
        let conn = self.connect()?;
        let name: Option<String> = conn
            .query_row(
                &format!(
                    "SELECT orgname FROM {} WHERE taxonomy = ?1 ORDER BY rowid LIMIT 1",
                    self.table
                ),
                params![taxonomy_id.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(|err| TallyError::Cache(err.to_string()))?;
        name.ok_or_else(|| TallyError::TaxonomyNotFound(taxonomy_id.to_string()))
    }
}

/// In-process cache with the same contract as `SqliteCache`.
#[derive(Debug, Default)]
pub struct MemoryCache {
    records: Mutex<Vec<CacheRecord>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: impl IntoIterator<Item = CacheRecord>) -> Result<Self, TallyError> {
        let cache = Self::new();
        for record in records {
            cache.put(&record)?;
        }
        Ok(cache)
    }

    pub fn len(&self) -> Result<usize, TallyError> {
        Ok(self.lock()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, TallyError> {
        Ok(self.len()? == 0)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Vec<CacheRecord>>, TallyError> {
        self.records
            .lock()
            .map_err(|_| TallyError::Cache("memory cache lock poisoned".to_string()))
    }
}

impl LookupCache for MemoryCache {
    fn exists(&self, id: &Identifier) -> Result<bool, TallyError> {
        Ok(self.lock()?.iter().any(|record| &record.identifier == id))
    }

    fn get(&self, id: &Identifier) -> Result<CacheRecord, TallyError> {
        self.lock()?
            .iter()
            .find(|record| &record.identifier == id)
            .cloned()
            .ok_or_else(|| TallyError::IdentifierNotFound(id.to_string()))
    }

    fn put(&self, record: &CacheRecord) -> Result<(), TallyError> {
        let mut records = self.lock()?;
        if records
            .iter()
            .any(|existing| existing.identifier == record.identifier)
        {
            return Err(TallyError::DuplicateKey(record.identifier.to_string()));
        }
        records.push(record.clone());
        Ok(())
    }

    fn find_by_taxonomy(&self, taxonomy_id: &TaxonomyId) -> Result<String, TallyError> {
        self.lock()?
            .iter()
            .find(|record| &record.taxonomy_id == taxonomy_id)
            .map(|record| record.organism_name.clone())
            .ok_or_else(|| TallyError::TaxonomyNotFound(taxonomy_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn record(id: &str, tax: &str, name: &str) -> CacheRecord {
        CacheRecord::new(id.parse().unwrap(), tax.parse().unwrap(), name)
    }

    #[test]
    fn memory_cache_rejects_duplicates() {
        let cache = MemoryCache::new();
        cache.put(&record("X", "10", "Org1")).unwrap();
        let err = cache.put(&record("X", "11", "Other")).unwrap_err();
        assert_matches!(err, TallyError::DuplicateKey(_));
        assert_eq!(cache.len().unwrap(), 1);
        assert!(!cache.is_empty().unwrap());
    }

    #[test]
    fn poisoned_memory_cache_reports_error() {
        let cache = std::sync::Arc::new(MemoryCache::new());
        let shared = std::sync::Arc::clone(&cache);
        let _ = std::thread::spawn(move || {
            let _guard = shared.records.lock().unwrap();
            panic!("poison the lock");
        })
        .join();

        assert_matches!(cache.len(), Err(TallyError::Cache(_)));
        assert_matches!(cache.is_empty(), Err(TallyError::Cache(_)));
    }

    #[test]
    fn sqlite_roundtrip_in_tempdir() {
        let temp = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(temp.path().join("nested/cache.db")).unwrap();
        let cache = SqliteCache::new(path, "sid_tax_orgname");
        cache.ensure_table().unwrap();

        let rec = record("LC012345.1", "8090", "Oryzias latipes");
        cache.put(&rec).unwrap();
        assert_eq!(cache.get(&rec.identifier).unwrap(), rec);
        assert_eq!(cache.len().unwrap(), 1);
    }
}
