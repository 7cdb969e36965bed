//! Storage layer using RocksDB
//!
//! # Column Families
//!
//! - `rings` - Per-account checkpoint rings (key: account id)
//! - `overrides` - Explicit delegate overrides (key: unit id, big-endian)
//! - `meta` - Scalar counters and configuration (one key per field)
//! - `events` - Journal of committed domain events (key: index, big-endian)
//!
//! Every mutating call lands as one `WriteBatch`, so a crash can never
//! leave one leg of a power move on disk without the other. Meta keys are
//! append-only across versions: new fields get new keys, existing keys are
//! never repurposed.

use crate::checkpoint::CheckpointRing;
use crate::engine::{ChangeSet, Counters, EngineSnapshot};
use crate::error::{Error, Result};
use crate::types::{AccountId, EventRecord, UnitId};
use crate::Config;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, IteratorMode, Options, WriteBatch, DB};
use std::collections::HashMap;
use std::sync::Arc;

/// Column family names
const CF_RINGS: &str = "rings";
const CF_OVERRIDES: &str = "overrides";
const CF_META: &str = "meta";
const CF_EVENTS: &str = "events";

/// Meta keys (append-only set; never repurpose an existing key)
const META_LIVE_UNITS: &[u8] = b"live_units";
const META_TOTAL_MINTED: &[u8] = b"total_minted";
const META_NEXT_EVENT_INDEX: &[u8] = b"next_event_index";
const META_RING_CAPACITY: &[u8] = b"ring_capacity";
const META_BATCH_LIMIT: &[u8] = b"batch_limit";

/// Storage wrapper for RocksDB
pub struct Storage {
    db: Arc<DB>,
}

impl Storage {
    /// Open or create database
    pub fn open(config: &Config) -> Result<Self> {
        let path = &config.data_dir;

        std::fs::create_dir_all(path)?;

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);
        db_opts.set_write_buffer_size(config.rocksdb.write_buffer_size_mb * 1024 * 1024);
        db_opts.set_max_write_buffer_number(config.rocksdb.max_write_buffer_number);
        db_opts.set_target_file_size_base(config.rocksdb.target_file_size_mb * 1024 * 1024);
        db_opts.set_max_background_jobs(config.rocksdb.max_background_jobs);

        let cf_descriptors = vec![
            ColumnFamilyDescriptor::new(CF_RINGS, Self::cf_options_rings()),
            ColumnFamilyDescriptor::new(CF_OVERRIDES, Self::cf_options_overrides()),
            ColumnFamilyDescriptor::new(CF_META, Options::default()),
            ColumnFamilyDescriptor::new(CF_EVENTS, Self::cf_options_events()),
        ];

        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        tracing::info!(path = ?path, "opened vote ledger storage");

        Ok(Self { db: Arc::new(db) })
    }

    // Column family options

    fn cf_options_rings() -> Options {
        let mut opts = Options::default();
        // Rings are re-read on every restart; favor decode speed.
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        opts
    }

    fn cf_options_overrides() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        let mut block_opts = rocksdb::BlockBasedOptions::default();
        block_opts.set_bloom_filter(10.0, false);
        opts.set_block_based_table_factory(&block_opts);
        opts
    }

    fn cf_options_events() -> Options {
        let mut opts = Options::default();
        // The journal is append-only and cold; compress hard.
        opts.set_compression_type(rocksdb::DBCompressionType::Zstd);
        opts
    }

    fn cf_handle(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| Error::Storage(format!("column family {} not found", name)))
    }

    /// Commit one call's change set atomically
    pub fn commit(&self, change: &ChangeSet) -> Result<()> {
        let mut batch = WriteBatch::default();

        let cf_rings = self.cf_handle(CF_RINGS)?;
        for (account, ring) in &change.rings {
            let value = bincode::serialize(ring)?;
            batch.put_cf(cf_rings, account.as_str().as_bytes(), &value);
        }

        let cf_overrides = self.cf_handle(CF_OVERRIDES)?;
        for (unit, entry) in &change.overrides {
            let key = unit.value().to_be_bytes();
            match entry {
                Some(delegatee) => {
                    batch.put_cf(cf_overrides, key, delegatee.as_str().as_bytes())
                }
                None => batch.delete_cf(cf_overrides, key),
            }
        }

        let cf_meta = self.cf_handle(CF_META)?;
        batch.put_cf(cf_meta, META_LIVE_UNITS, change.counters.live_units.to_be_bytes());
        batch.put_cf(
            cf_meta,
            META_TOTAL_MINTED,
            change.counters.total_minted.to_be_bytes(),
        );
        batch.put_cf(
            cf_meta,
            META_NEXT_EVENT_INDEX,
            change.counters.next_event_index.to_be_bytes(),
        );
        batch.put_cf(
            cf_meta,
            META_RING_CAPACITY,
            change.counters.ring_capacity.to_be_bytes(),
        );
        batch.put_cf(
            cf_meta,
            META_BATCH_LIMIT,
            (change.counters.batch_limit as u64).to_be_bytes(),
        );

        let cf_events = self.cf_handle(CF_EVENTS)?;
        for record in &change.events {
            let value = bincode::serialize(record)?;
            batch.put_cf(cf_events, record.index.to_be_bytes(), &value);
        }

        self.db.write(batch)?;

        tracing::debug!(
            rings = change.rings.len(),
            overrides = change.overrides.len(),
            events = change.events.len(),
            "change set committed"
        );

        Ok(())
    }

    /// Load the full engine snapshot; `None` for a fresh database
    pub fn load(&self) -> Result<Option<EngineSnapshot>> {
        let counters = match self.load_counters()? {
            Some(counters) => counters,
            None => return Ok(None),
        };

        let cf_rings = self.cf_handle(CF_RINGS)?;
        let mut rings = HashMap::new();
        for item in self.db.iterator_cf(cf_rings, IteratorMode::Start) {
            let (key, value) = item?;
            let account = AccountId::new(String::from_utf8(key.to_vec()).map_err(|e| {
                Error::Storage(format!("non-utf8 account key in rings: {}", e))
            })?);
            let ring: CheckpointRing = bincode::deserialize(&value)?;
            rings.insert(account, ring);
        }

        let cf_overrides = self.cf_handle(CF_OVERRIDES)?;
        let mut overrides = HashMap::new();
        for item in self.db.iterator_cf(cf_overrides, IteratorMode::Start) {
            let (key, value) = item?;
            let unit = UnitId::new(u64::from_be_bytes(key.as_ref().try_into().map_err(
                |_| Error::Storage("malformed unit key in overrides".to_string()),
            )?));
            let delegatee = AccountId::new(String::from_utf8(value.to_vec()).map_err(|e| {
                Error::Storage(format!("non-utf8 delegatee in overrides: {}", e))
            })?);
            overrides.insert(unit, delegatee);
        }

        tracing::info!(
            accounts = rings.len(),
            overrides = overrides.len(),
            live_units = counters.live_units,
            "recovered vote ledger state"
        );

        Ok(Some(EngineSnapshot {
            rings,
            overrides,
            counters,
        }))
    }

    fn load_counters(&self) -> Result<Option<Counters>> {
        let cf_meta = self.cf_handle(CF_META)?;

        let live_units = match self.db.get_cf(cf_meta, META_LIVE_UNITS)? {
            Some(value) => read_u64(&value)?,
            None => return Ok(None),
        };
        let total_minted = self
            .db
            .get_cf(cf_meta, META_TOTAL_MINTED)?
            .map(|v| read_u64(&v))
            .transpose()?
            .unwrap_or(0);
        let next_event_index = self
            .db
            .get_cf(cf_meta, META_NEXT_EVENT_INDEX)?
            .map(|v| read_u64(&v))
            .transpose()?
            .unwrap_or(0);
        let ring_capacity = self
            .db
            .get_cf(cf_meta, META_RING_CAPACITY)?
            .map(|v| read_u32(&v))
            .transpose()?
            .unwrap_or(1000);
        let batch_limit = self
            .db
            .get_cf(cf_meta, META_BATCH_LIMIT)?
            .map(|v| read_u64(&v))
            .transpose()?
            .unwrap_or(100) as usize;

        Ok(Some(Counters {
            live_units,
            total_minted,
            next_event_index,
            ring_capacity,
            batch_limit,
        }))
    }

    /// Journal events at or after `index`, in order
    pub fn events_since(&self, index: u64) -> Result<Vec<EventRecord>> {
        let cf_events = self.cf_handle(CF_EVENTS)?;
        let from_key = index.to_be_bytes();
        let mode = IteratorMode::From(&from_key, rocksdb::Direction::Forward);

        let mut records = Vec::new();
        for item in self.db.iterator_cf(cf_events, mode) {
            let (_, value) = item?;
            let record: EventRecord = bincode::deserialize(&value)?;
            records.push(record);
        }
        Ok(records)
    }

    /// Get storage statistics
    pub fn stats(&self) -> Result<StorageStats> {
        let mut total_accounts = 0u64;
        for _ in self
            .db
            .iterator_cf(self.cf_handle(CF_RINGS)?, IteratorMode::Start)
        {
            total_accounts += 1;
        }

        let mut total_overrides = 0u64;
        for _ in self
            .db
            .iterator_cf(self.cf_handle(CF_OVERRIDES)?, IteratorMode::Start)
        {
            total_overrides += 1;
        }

        let total_events = self
            .db
            .property_int_value_cf(self.cf_handle(CF_EVENTS)?, "rocksdb.estimate-num-keys")?
            .unwrap_or(0);

        Ok(StorageStats {
            total_accounts,
            total_overrides,
            total_events,
        })
    }

    /// Close database (graceful shutdown)
    pub fn close(self) -> Result<()> {
        drop(self.db);
        tracing::info!("vote ledger storage closed");
        Ok(())
    }
}

fn read_u64(value: &[u8]) -> Result<u64> {
    Ok(u64::from_be_bytes(value.try_into().map_err(|_| {
        Error::Storage("malformed u64 in meta".to_string())
    })?))
}

fn read_u32(value: &[u8]) -> Result<u32> {
    Ok(u32::from_be_bytes(value.try_into().map_err(|_| {
        Error::Storage("malformed u32 in meta".to_string())
    })?))
}

/// Storage statistics
#[derive(Debug, Clone)]
pub struct StorageStats {
    /// Accounts with at least one checkpoint
    pub total_accounts: u64,
    /// Units with an explicit override
    pub total_overrides: u64,
    /// Journal length (estimate)
    pub total_events: u64,
}
