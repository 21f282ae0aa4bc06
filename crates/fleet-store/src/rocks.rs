//! `RocksDB` storage implementation.
//!
//! This module provides the `RocksStore` implementation of the `Store` trait.

use std::path::Path;
use std::sync::Arc;

use fleet_core::InstanceId;
use parking_lot::Mutex;
use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBWithThreadMode, Direction, IteratorMode,
    MultiThreaded, Options, WriteBatch,
};
use tracing::debug;

use crate::error::{Result, StoreError};
use crate::keys;
use crate::query::{InstanceQuery, Page, PageRequest};
use crate::schema::{all_column_families, cf};
use crate::types::Instance;
use crate::Store;

/// RocksDB-backed storage implementation.
///
/// Writes that move a load index entry read the previous record first, so
/// they are serialised through `write_lock`. Reads take no lock.
pub struct RocksStore {
    db: Arc<DBWithThreadMode<MultiThreaded>>,
    write_lock: Mutex<()>,
}

impl RocksStore {
    /// Open or create a `RocksDB` database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors: Vec<_> = all_column_families()
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect();

        let db = DBWithThreadMode::open_cf_descriptors(&opts, path, cf_descriptors)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(Self {
            db: Arc::new(db),
            write_lock: Mutex::new(()),
        })
    }

    /// Get a column family handle.
    fn cf(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Database(format!("column family not found: {name}")))
    }

    /// Serialize a value using CBOR.
    fn serialize<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(value, &mut buf)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize a value from CBOR.
    fn deserialize<T: serde::de::DeserializeOwned>(data: &[u8]) -> Result<T> {
        ciborium::from_reader(data).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    fn load_key_of(instance: &Instance) -> Vec<u8> {
        keys::load_key(instance.player_count, instance.create_time, &instance.id)
    }
}

impl Store for RocksStore {
    fn put_instance(&self, instance: &Instance) -> Result<()> {
        let cf_instances = self.cf(cf::INSTANCES)?;
        let cf_by_load = self.cf(cf::INSTANCES_BY_LOAD)?;

        let instance_key = keys::instance_key(&instance.id);
        let load_key = Self::load_key_of(instance);
        let value = Self::serialize(instance)?;

        let _guard = self.write_lock.lock();

        // The load index key moves whenever the player count changes.
        let old_load_key = self
            .get_instance(&instance.id)?
            .map(|old| Self::load_key_of(&old));

        let mut batch = WriteBatch::default();
        batch.put_cf(&cf_instances, &instance_key, &value);
        if let Some(old) = old_load_key {
            if old != load_key {
                batch.delete_cf(&cf_by_load, &old);
            }
        }
        batch.put_cf(&cf_by_load, &load_key, []);

        self.db
            .write(batch)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(())
    }

    fn get_instance(&self, instance_id: &InstanceId) -> Result<Option<Instance>> {
        let cf = self.cf(cf::INSTANCES)?;
        let key = keys::instance_key(instance_id);

        self.db
            .get_cf(&cf, key)
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    fn delete_instance(&self, instance_id: &InstanceId) -> Result<bool> {
        let cf_instances = self.cf(cf::INSTANCES)?;
        let cf_by_load = self.cf(cf::INSTANCES_BY_LOAD)?;

        let _guard = self.write_lock.lock();

        let Some(instance) = self.get_instance(instance_id)? else {
            return Ok(false);
        };

        let mut batch = WriteBatch::default();
        batch.delete_cf(&cf_instances, keys::instance_key(instance_id));
        batch.delete_cf(&cf_by_load, Self::load_key_of(&instance));

        self.db
            .write(batch)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(true)
    }

    fn query_instances(&self, query: &InstanceQuery, page: &PageRequest) -> Result<Page<Instance>> {
        let cf_by_load = self.cf(cf::INSTANCES_BY_LOAD)?;

        let start = match &page.cursor {
            Some(cursor) => Some(keys::decode_cursor(cursor).ok_or(StoreError::InvalidCursor)?),
            None => None,
        };
        let mode = match &start {
            Some(key) => IteratorMode::From(key.as_slice(), Direction::Forward),
            None => IteratorMode::Start,
        };

        let mut items = Vec::new();
        let mut last_key = None;
        let mut has_more = false;

        for item in self.db.iterator_cf(&cf_by_load, mode) {
            let (key, _) = item.map_err(|e| StoreError::Database(e.to_string()))?;

            if start.as_deref() == Some(&*key) {
                continue;
            }

            let Some(instance_id) = keys::extract_instance_id_from_load_key(&key) else {
                debug!("skipping malformed load index key");
                continue;
            };
            let Some(instance) = self.get_instance(&instance_id)? else {
                continue;
            };
            // A concurrent put may have moved the record to a newer key.
            if Self::load_key_of(&instance) != *key {
                continue;
            }
            if !query.matches(&instance) {
                continue;
            }

            if items.len() == page.limit {
                has_more = true;
                break;
            }
            items.push(instance);
            last_key = Some(key);
        }

        let next_cursor = if has_more {
            last_key.map(|key| keys::encode_cursor(&key))
        } else {
            None
        };

        Ok(Page { items, next_cursor })
    }

    fn list_all_instances(&self) -> Result<Vec<Instance>> {
        let cf = self.cf(cf::INSTANCES)?;

        let mut instances = Vec::new();
        let iter = self.db.iterator_cf(&cf, IteratorMode::Start);

        for item in iter {
            let (_, value) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            let instance: Instance = Self::deserialize(&value)?;
            instances.push(instance);
        }

        Ok(instances)
    }
}
