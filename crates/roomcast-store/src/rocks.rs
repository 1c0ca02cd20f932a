//! RocksDB-backed content store.
//!
//! Column families:
//! - `content` - one JSON record per content ID: `{content, created_at, updated_at}`
//!
//! RocksDB has no conditional put, so the existence check and the write of
//! `create`, `update` and `delete` run under one write lock. Reads take no lock.

use crate::content::RoomContent;
use crate::error::StoreError;
use crate::id::ContentId;
use crate::traits::ContentStore;
use async_trait::async_trait;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, Options, WriteOptions, DB};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

/// Column family holding content records.
const CF_CONTENT: &str = "content";

/// RocksDB store configuration.
#[derive(Debug, Clone)]
pub struct RocksConfig {
    /// Database directory path
    pub path: PathBuf,
    /// Fsync on every write
    pub sync_writes: bool,
    /// Max open files for RocksDB
    pub max_open_files: i32,
}

impl RocksConfig {
    /// Create a config for a database at `path` with default tuning.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            sync_writes: false,
            max_open_files: 256,
        }
    }
}

/// Record as stored in the database.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct Record {
    content: RoomContent,
    created_at: u64,
    updated_at: u64,
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// Content store persisted in RocksDB.
pub struct RocksStore {
    db: DB,
    config: RocksConfig,
    writes: Mutex<()>,
}

impl RocksStore {
    /// Open the store, creating the database and column families if missing.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if RocksDB cannot open the path.
    pub fn open(config: RocksConfig) -> Result<Self, StoreError> {
        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);
        db_opts.set_max_open_files(config.max_open_files);
        db_opts.set_keep_log_file_num(5);

        let descriptors = vec![ColumnFamilyDescriptor::new(CF_CONTENT, Options::default())];
        let db = DB::open_cf_descriptors(&db_opts, &config.path, descriptors)?;

        info!("RocksDB content store opened at {}", config.path.display());
        Ok(Self {
            db,
            config,
            writes: Mutex::new(()),
        })
    }

    /// Get the database directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.config.path
    }

    fn cf(&self) -> Result<&ColumnFamily, StoreError> {
        self.db
            .cf_handle(CF_CONTENT)
            .ok_or_else(|| StoreError::Database(format!("Missing column family: {CF_CONTENT}")))
    }

    fn lock_writes(&self) -> MutexGuard<'_, ()> {
        self.writes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_options(&self) -> WriteOptions {
        let mut opts = WriteOptions::default();
        opts.set_sync(self.config.sync_writes);
        opts
    }

    pub(crate) fn load_record(&self, id: &ContentId) -> Result<Option<Record>, StoreError> {
        match self.db.get_cf(self.cf()?, id.as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn save_record(&self, id: &ContentId, record: &Record) -> Result<(), StoreError> {
        let value = serde_json::to_vec(record)?;
        self.db
            .put_cf_opt(self.cf()?, id.as_bytes(), value, &self.write_options())?;
        Ok(())
    }
}

#[async_trait]
impl ContentStore for RocksStore {
    async fn create(&self, id: &ContentId, content: RoomContent) -> Result<(), StoreError> {
        content.validate()?;
        let _guard = self.lock_writes();

        if self.db.get_pinned_cf(self.cf()?, id.as_bytes())?.is_some() {
            return Err(StoreError::AlreadyExists(id.clone()));
        }

        let now = now_millis();
        let record = Record {
            content,
            created_at: now,
            updated_at: now,
        };
        self.save_record(id, &record)?;
        debug!(content = %id, "Content created");
        Ok(())
    }

    async fn get(&self, id: &ContentId) -> Result<RoomContent, StoreError> {
        self.load_record(id)?
            .map(|record| record.content)
            .ok_or_else(|| StoreError::NotFound(id.clone()))
    }

    async fn update(&self, id: &ContentId, content: RoomContent) -> Result<(), StoreError> {
        content.validate()?;
        let _guard = self.lock_writes();

        let mut record = self
            .load_record(id)?
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        record.content = content;
        record.updated_at = now_millis();
        self.save_record(id, &record)?;
        debug!(content = %id, "Content updated");
        Ok(())
    }

    async fn delete(&self, id: &ContentId) -> Result<(), StoreError> {
        let _guard = self.lock_writes();
        let cf = self.cf()?;

        if self.db.get_pinned_cf(cf, id.as_bytes())?.is_none() {
            return Err(StoreError::NotFound(id.clone()));
        }
        self.db
            .delete_cf_opt(cf, id.as_bytes(), &self.write_options())?;
        debug!(content = %id, "Content deleted");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "rocksdb"
    }
}
