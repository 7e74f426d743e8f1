//! Storage layer using RocksDB
//!
//! # Column Families
//!
//! - `events` - Append-only event log (key: sequence, big-endian)
//! - `indices` - Account index (key: address || '|' || sequence)
//!
//! Big-endian sequence keys keep the log in commit order, so range reads
//! are plain forward scans.

use crate::{
    error::{Error, Result},
    types::{Address, LedgerEvent},
    Config,
};
use rocksdb::{
    ColumnFamily, ColumnFamilyDescriptor, Direction, IteratorMode, Options, WriteBatch,
    WriteOptions, DB,
};
use std::sync::Arc;

/// Column family names
const CF_EVENTS: &str = "events";
const CF_INDICES: &str = "indices";

/// Storage wrapper for RocksDB
pub struct Storage {
    db: Arc<DB>,
    sync_writes: bool,
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage")
            .field("path", &self.db.path())
            .field("sync_writes", &self.sync_writes)
            .finish()
    }
}

impl Storage {
    /// Open or create database
    pub fn open(config: &Config) -> Result<Self> {
        let path = &config.data_dir;

        // Create directory if not exists
        std::fs::create_dir_all(path)?;

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);
        db_opts.set_write_buffer_size(config.rocksdb.write_buffer_size_mb * 1024 * 1024);
        db_opts.set_max_background_jobs(config.rocksdb.max_background_jobs);

        let cf_descriptors = vec![
            ColumnFamilyDescriptor::new(CF_EVENTS, Self::cf_options_events()),
            ColumnFamilyDescriptor::new(CF_INDICES, Self::cf_options_indices()),
        ];

        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        tracing::info!(path = ?path, "Opened event store");

        Ok(Self {
            db: Arc::new(db),
            sync_writes: config.rocksdb.sync_writes,
        })
    }

    fn cf_options_events() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Zstd);
        opts
    }

    fn cf_options_indices() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        let mut block_opts = rocksdb::BlockBasedOptions::default();
        block_opts.set_bloom_filter(10.0, false);
        opts.set_block_based_table_factory(&block_opts);
        opts
    }

    fn cf_handle(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| Error::Storage(format!("Column family {} not found", name)))
    }

    // Event operations

    /// Append event with its account indices (atomic)
    pub fn append_event(&self, event: &LedgerEvent) -> Result<()> {
        let cf_events = self.cf_handle(CF_EVENTS)?;
        let cf_indices = self.cf_handle(CF_INDICES)?;

        let mut batch = WriteBatch::default();
        batch.put_cf(
            cf_events,
            event.sequence.to_be_bytes(),
            bincode::serialize(event)?,
        );

        let mut accounts = event.kind.accounts();
        accounts.sort();
        accounts.dedup();
        for account in accounts {
            batch.put_cf(
                cf_indices,
                Self::index_key_account(account, Some(event.sequence)),
                b"",
            );
        }

        let mut write_opts = WriteOptions::default();
        write_opts.set_sync(self.sync_writes);
        self.db.write_opt(batch, &write_opts)?;

        tracing::debug!(
            sequence = event.sequence,
            kind = event.kind.name(),
            "Event appended"
        );

        Ok(())
    }

    /// Get event by sequence
    pub fn get_event(&self, sequence: u64) -> Result<Option<LedgerEvent>> {
        let cf = self.cf_handle(CF_EVENTS)?;
        match self.db.get_cf(cf, sequence.to_be_bytes())? {
            Some(value) => Ok(Some(bincode::deserialize(&value)?)),
            None => Ok(None),
        }
    }

    /// Events with `from <= sequence < to`, in commit order
    pub fn events_range(&self, from: u64, to: u64) -> Result<Vec<LedgerEvent>> {
        let cf = self.cf_handle(CF_EVENTS)?;
        let start = from.to_be_bytes();
        let iter = self
            .db
            .iterator_cf(cf, IteratorMode::From(&start, Direction::Forward));

        let mut events = Vec::new();
        for item in iter {
            let (key, value) = item?;
            if Self::decode_sequence(&key)? >= to {
                break;
            }
            events.push(bincode::deserialize(&value)?);
        }

        Ok(events)
    }

    /// Whole log from genesis
    pub fn all_events(&self) -> Result<Vec<LedgerEvent>> {
        self.events_range(0, u64::MAX)
    }

    /// Events touching `account`, in commit order
    pub fn account_events(&self, account: &Address) -> Result<Vec<LedgerEvent>> {
        let cf_indices = self.cf_handle(CF_INDICES)?;
        let prefix = Self::index_key_account(account, None);
        let iter = self
            .db
            .iterator_cf(cf_indices, IteratorMode::From(&prefix, Direction::Forward));

        let mut events = Vec::new();
        for item in iter {
            let (key, _) = item?;
            if !key.starts_with(&prefix) {
                break;
            }

            let sequence = Self::decode_sequence(&key[prefix.len()..])?;
            let event = self.get_event(sequence)?.ok_or_else(|| {
                Error::InvariantViolation(format!("index points at missing event {}", sequence))
            })?;
            events.push(event);
        }

        Ok(events)
    }

    /// Sequence of the newest event, if any
    pub fn last_sequence(&self) -> Result<Option<u64>> {
        let cf = self.cf_handle(CF_EVENTS)?;
        match self.db.iterator_cf(cf, IteratorMode::End).next() {
            Some(item) => {
                let (key, _) = item?;
                Ok(Some(Self::decode_sequence(&key)?))
            }
            None => Ok(None),
        }
    }

    // Key helpers

    fn index_key_account(account: &Address, sequence: Option<u64>) -> Vec<u8> {
        let mut key = account.as_str().as_bytes().to_vec();
        key.push(b'|');
        if let Some(seq) = sequence {
            key.extend_from_slice(&seq.to_be_bytes());
        }
        key
    }

    fn decode_sequence(bytes: &[u8]) -> Result<u64> {
        let raw: [u8; 8] = bytes
            .try_into()
            .map_err(|_| Error::Storage(format!("malformed sequence key ({} bytes)", bytes.len())))?;
        Ok(u64::from_be_bytes(raw))
    }

    /// Close database (graceful shutdown)
    pub fn close(self) -> Result<()> {
        drop(self.db);
        tracing::info!("Event store closed");
        Ok(())
    }
}
