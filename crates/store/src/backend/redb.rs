//! Redb (Rust embedded database) backend for LeadRelay storage.
//!
//! Redb is a pure Rust embedded key-value store with ACID transactions and
//! MVCC. Write transactions are serialized by the database, which is exactly
//! the property [`StoreBackend::put_if_absent`] and [`StoreBackend::incr`]
//! lean on: check-then-act runs inside one write transaction, so two
//! concurrent contact resolutions for the same phone cannot both win.

use crate::backend::decode_counter;
use crate::{StoreBackend, StoreError};
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use std::path::Path;
use std::sync::Arc;

/// Single table holding every record type, keyed by prefixed string keys.
const LEADRELAY_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("leadrelay_data");

/// Persistent backend over a redb database file.
///
/// `Arc<Database>` allows safe sharing across threads; redb handles its own
/// internal locking and MVCC.
pub struct RedbBackend {
    db: Arc<Database>,
}

impl RedbBackend {
    /// Open or create a redb database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let db = Database::create(path).map_err(|e| StoreError::backend(e.to_string()))?;

        // Touch the table so later read transactions can open it.
        let write_txn = db
            .begin_write()
            .map_err(|e| StoreError::backend(e.to_string()))?;
        {
            let _table = write_txn
                .open_table(LEADRELAY_TABLE)
                .map_err(|e| StoreError::backend(e.to_string()))?;
        }
        write_txn
            .commit()
            .map_err(|e| StoreError::backend(e.to_string()))?;

        Ok(Self { db: Arc::new(db) })
    }
}

impl StoreBackend for RedbBackend {
    fn put(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| StoreError::backend(e.to_string()))?;
        {
            let mut table = write_txn
                .open_table(LEADRELAY_TABLE)
                .map_err(|e| StoreError::backend(e.to_string()))?;
            table
                .insert(key, value)
                .map_err(|e| StoreError::backend(e.to_string()))?;
        }
        write_txn
            .commit()
            .map_err(|e| StoreError::backend(e.to_string()))?;
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| StoreError::backend(e.to_string()))?;
        let table = read_txn
            .open_table(LEADRELAY_TABLE)
            .map_err(|e| StoreError::backend(e.to_string()))?;
        match table
            .get(key)
            .map_err(|e| StoreError::backend(e.to_string()))?
        {
            Some(value) => Ok(Some(value.value().to_vec())),
            None => Ok(None),
        }
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| StoreError::backend(e.to_string()))?;
        {
            let mut table = write_txn
                .open_table(LEADRELAY_TABLE)
                .map_err(|e| StoreError::backend(e.to_string()))?;
            table
                .remove(key)
                .map_err(|e| StoreError::backend(e.to_string()))?;
        }
        write_txn
            .commit()
            .map_err(|e| StoreError::backend(e.to_string()))?;
        Ok(())
    }

    fn put_if_absent(&self, key: &str, value: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| StoreError::backend(e.to_string()))?;
        let existing;
        {
            let mut table = write_txn
                .open_table(LEADRELAY_TABLE)
                .map_err(|e| StoreError::backend(e.to_string()))?;
            existing = table
                .get(key)
                .map_err(|e| StoreError::backend(e.to_string()))?
                .map(|v| v.value().to_vec());
            if existing.is_none() {
                table
                    .insert(key, value)
                    .map_err(|e| StoreError::backend(e.to_string()))?;
            }
        }
        write_txn
            .commit()
            .map_err(|e| StoreError::backend(e.to_string()))?;
        Ok(existing)
    }

    fn incr(&self, key: &str) -> Result<u64, StoreError> {
        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| StoreError::backend(e.to_string()))?;
        let next;
        {
            let mut table = write_txn
                .open_table(LEADRELAY_TABLE)
                .map_err(|e| StoreError::backend(e.to_string()))?;
            let current = match table
                .get(key)
                .map_err(|e| StoreError::backend(e.to_string()))?
            {
                Some(value) => decode_counter(value.value())?,
                None => 0,
            };
            next = current + 1;
            table
                .insert(key, next.to_be_bytes().as_slice())
                .map_err(|e| StoreError::backend(e.to_string()))?;
        }
        write_txn
            .commit()
            .map_err(|e| StoreError::backend(e.to_string()))?;
        Ok(next)
    }

    fn scan_prefix(
        &self,
        prefix: &str,
        visitor: &mut dyn FnMut(&str, &[u8]) -> Result<(), StoreError>,
    ) -> Result<(), StoreError> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| StoreError::backend(e.to_string()))?;
        let table = read_txn
            .open_table(LEADRELAY_TABLE)
            .map_err(|e| StoreError::backend(e.to_string()))?;

        for item in table
            .range(prefix..)
            .map_err(|e| StoreError::backend(e.to_string()))?
        {
            let (key, value) = item.map_err(|e| StoreError::backend(e.to_string()))?;
            let key = key.value();
            if !key.starts_with(prefix) {
                break;
            }
            visitor(key, value.value())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn open_temp() -> (NamedTempFile, RedbBackend) {
        let temp_file = NamedTempFile::new().unwrap();
        let backend = RedbBackend::open(temp_file.path()).unwrap();
        (temp_file, backend)
    }

    #[test]
    fn roundtrip_put_get_delete() {
        let (_file, backend) = open_temp();

        backend.put("key1", b"value1").unwrap();
        assert_eq!(backend.get("key1").unwrap(), Some(b"value1".to_vec()));
        assert_eq!(backend.get("missing").unwrap(), None);

        backend.delete("key1").unwrap();
        assert_eq!(backend.get("key1").unwrap(), None);
    }

    #[test]
    fn put_if_absent_first_writer_wins() {
        let (_file, backend) = open_temp();

        assert_eq!(backend.put_if_absent("k", b"first").unwrap(), None);
        assert_eq!(
            backend.put_if_absent("k", b"second").unwrap(),
            Some(b"first".to_vec())
        );
        assert_eq!(backend.get("k").unwrap(), Some(b"first".to_vec()));
    }

    #[test]
    fn incr_starts_at_one_and_counts_up() {
        let (_file, backend) = open_temp();

        assert_eq!(backend.incr("seq/contact").unwrap(), 1);
        assert_eq!(backend.incr("seq/contact").unwrap(), 2);
        assert_eq!(backend.incr("seq/lead").unwrap(), 1);
    }

    #[test]
    fn scan_prefix_stops_at_prefix_boundary() {
        let (_file, backend) = open_temp();

        backend.put("rule/a/1", b"1").unwrap();
        backend.put("rule/a/2", b"2").unwrap();
        backend.put("rule/b/1", b"3").unwrap();

        let mut keys = Vec::new();
        backend
            .scan_prefix("rule/a/", &mut |key, _value| {
                keys.push(key.to_string());
                Ok(())
            })
            .unwrap();

        assert_eq!(keys, vec!["rule/a/1", "rule/a/2"]);
    }
}
