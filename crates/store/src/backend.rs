use crate::StoreError;
use std::collections::BTreeMap;
use std::sync::RwLock;

/// Trait for a key-value storage backend.
///
/// The interesting contract is atomicity: [`put_if_absent`] and [`incr`] must
/// be atomic with respect to concurrent callers — they are what makes
/// contact deduplication race-free without application-level locking.
///
/// [`put_if_absent`]: StoreBackend::put_if_absent
/// [`incr`]: StoreBackend::incr
pub trait StoreBackend: Send + Sync {
    /// Insert or overwrite a key-value pair.
    fn put(&self, key: &str, value: &[u8]) -> Result<(), StoreError>;

    /// Retrieve a value by key.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Delete a key-value pair (no-op if absent).
    fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Atomically insert `value` only if `key` is absent.
    ///
    /// Returns `None` when this call won the insert, or the pre-existing
    /// value when some other writer got there first. Check and insert happen
    /// under one write transaction / lock.
    fn put_if_absent(&self, key: &str, value: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;

    /// Atomically increment the big-endian `u64` counter at `key` and return
    /// the new value. A missing key counts as 0, so the first call returns 1.
    fn incr(&self, key: &str) -> Result<u64, StoreError>;

    /// Visit all entries whose key starts with `prefix`, in key order.
    ///
    /// The whole scan observes one consistent snapshot (one read transaction
    /// or one read-lock acquisition) — callers never see a half-written
    /// update interleaved into the results.
    fn scan_prefix(
        &self,
        prefix: &str,
        visitor: &mut dyn FnMut(&str, &[u8]) -> Result<(), StoreError>,
    ) -> Result<(), StoreError>;
}

/// Configuration for selecting and building a backend.
///
/// # Example
/// ```
/// use lead_store::BackendConfig;
///
/// // In-memory (for testing)
/// let config = BackendConfig::in_memory();
///
/// // Redb (pure Rust, persistent)
/// let config = BackendConfig::redb("/data/leadrelay.redb");
/// ```
#[derive(Clone, Debug, Default)]
pub enum BackendConfig {
    /// Redb file-backed storage. Requires the `backend-redb` feature
    /// (enabled by default).
    Redb { path: String },
    /// An in-memory map. Useful for testing and ephemeral deployments.
    #[default]
    InMemory,
}

impl BackendConfig {
    pub fn in_memory() -> Self {
        BackendConfig::InMemory
    }

    pub fn redb<P: Into<String>>(path: P) -> Self {
        BackendConfig::Redb { path: path.into() }
    }

    /// Build the backend for this configuration.
    pub fn build(&self) -> Result<Box<dyn StoreBackend>, StoreError> {
        match self {
            BackendConfig::InMemory => Ok(Box::new(InMemoryBackend::new())),
            BackendConfig::Redb { path } => {
                #[cfg(feature = "backend-redb")]
                {
                    Ok(Box::new(RedbBackend::open(path)?))
                }
                #[cfg(not(feature = "backend-redb"))]
                {
                    let _ = path;
                    Err(StoreError::backend("redb backend disabled at compile time"))
                }
            }
        }
    }
}

/// An in-memory backend over a `RwLock<BTreeMap>`.
///
/// The ordered map gives `scan_prefix` the same key-order semantics as the
/// persistent backend.
pub struct InMemoryBackend {
    records: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(BTreeMap::new()),
        }
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl StoreBackend for InMemoryBackend {
    fn put(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        self.records
            .write()
            .map_err(|_| StoreError::backend("poisoned lock"))?
            .insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let guard = self
            .records
            .read()
            .map_err(|_| StoreError::backend("poisoned lock"))?;
        Ok(guard.get(key).cloned())
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.records
            .write()
            .map_err(|_| StoreError::backend("poisoned lock"))?
            .remove(key);
        Ok(())
    }

    fn put_if_absent(&self, key: &str, value: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        // One write lock across check and insert.
        let mut guard = self
            .records
            .write()
            .map_err(|_| StoreError::backend("poisoned lock"))?;
        match guard.get(key) {
            Some(existing) => Ok(Some(existing.clone())),
            None => {
                guard.insert(key.to_string(), value.to_vec());
                Ok(None)
            }
        }
    }

    fn incr(&self, key: &str) -> Result<u64, StoreError> {
        let mut guard = self
            .records
            .write()
            .map_err(|_| StoreError::backend("poisoned lock"))?;
        let current = match guard.get(key) {
            Some(bytes) => decode_counter(bytes)?,
            None => 0,
        };
        let next = current + 1;
        guard.insert(key.to_string(), next.to_be_bytes().to_vec());
        Ok(next)
    }

    fn scan_prefix(
        &self,
        prefix: &str,
        visitor: &mut dyn FnMut(&str, &[u8]) -> Result<(), StoreError>,
    ) -> Result<(), StoreError> {
        let guard = self
            .records
            .read()
            .map_err(|_| StoreError::backend("poisoned lock"))?;
        for (key, value) in guard.range(prefix.to_string()..) {
            if !key.starts_with(prefix) {
                break;
            }
            visitor(key, value)?;
        }
        Ok(())
    }
}

pub(crate) fn decode_counter(bytes: &[u8]) -> Result<u64, StoreError> {
    let arr: [u8; 8] = bytes
        .try_into()
        .map_err(|_| StoreError::backend("counter value is not 8 bytes"))?;
    Ok(u64::from_be_bytes(arr))
}

/// The redb backend implementation.
///
/// Redb is a pure Rust ACID-compliant embedded database; its serialized
/// write transactions are what give `put_if_absent` and `incr` their
/// atomicity guarantees on disk.
#[cfg(feature = "backend-redb")]
pub mod redb;

#[cfg(feature = "backend-redb")]
pub use redb::RedbBackend;
