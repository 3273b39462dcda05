use crate::config::WalletStoreConfig;
use crate::error::StoreError;
use crate::wallet::seed::Seed;
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::ffi::OsString;
use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tokio::io::AsyncWriteExt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WalletRole {
    Ping,
    Pong,
}

impl fmt::Display for WalletRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WalletRole::Ping => f.write_str("ping"),
            WalletRole::Pong => f.write_str("pong"),
        }
    }
}

/// A persisted wallet: its seed and the leg whose output set it currently holds.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WalletRecord {
    pub seed: Seed,
    pub leg: u64,
    /// slots of the leg holding funds, empty when the whole set is there
    pub slots: Vec<u64>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct StoredWallet {
    seed: String,
    leg: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    slots: Vec<u64>,
}

type StoreDocument = BTreeMap<WalletRole, VecDeque<StoredWallet>>;

/// Role keyed FIFO of wallet seeds shared between runs of the tool.
///
/// Every operation holds an exclusive lock on a file next to the store and replaces the
/// store atomically (temp file then rename), so a crash never leaves a half written
/// document behind.
#[derive(Clone, Debug)]
pub struct SeedStore {
    path: PathBuf,
    lock_attempts: u32,
    lock_retry: Duration,
}

/// Exclusive advisory lock on `<store>.lock`, released when the handle is closed,
/// including when the process dies while holding it.
struct StoreLock {
    _file: std::fs::File,
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

impl SeedStore {
    pub fn new(config: &WalletStoreConfig) -> Self {
        Self {
            path: config.path.clone(),
            lock_attempts: config.lock_attempts,
            lock_retry: Duration::from_millis(config.lock_retry_ms),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Removes and returns the oldest record for `role`.
    pub async fn take(&self, role: WalletRole) -> Result<Option<WalletRecord>, StoreError> {
        let _lock = self.lock().await?;
        let mut document = self.read().await?;

        let mut taken = None;
        if let Some(queue) = document.get_mut(&role) {
            while let Some(stored) = queue.pop_front() {
                match Seed::from_base58(&stored.seed) {
                    Some(seed) => {
                        taken = Some(WalletRecord {
                            seed,
                            leg: stored.leg,
                            slots: stored.slots,
                        });
                        break;
                    }
                    None => tracing::warn!("dropping malformed {} seed from {:?}", role, self.path),
                }
            }
            if queue.is_empty() {
                document.remove(&role);
            }
        }

        if taken.is_some() || !document.is_empty() {
            self.write(&document).await?;
        }
        Ok(taken)
    }

    /// Appends a record for `role`.
    pub async fn push(&self, role: WalletRole, record: &WalletRecord) -> Result<(), StoreError> {
        let _lock = self.lock().await?;
        let mut document = self.read().await?;
        document.entry(role).or_default().push_back(StoredWallet {
            seed: record.seed.to_base58(),
            leg: record.leg,
            slots: record.slots.clone(),
        });
        self.write(&document).await
    }

    async fn lock(&self) -> Result<StoreLock, StoreError> {
        let lock_path = sibling(&self.path, ".lock");
        let file = fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&lock_path)
            .await?
            .into_std()
            .await;
        for attempt in 0..self.lock_attempts {
            match file.try_lock_exclusive() {
                Ok(()) => return Ok(StoreLock { _file: file }),
                Err(err) if err.kind() == fs2::lock_contended_error().kind() => {
                    tracing::trace!(attempt, "wallet store {:?} is locked", self.path);
                    tokio::time::sleep(self.lock_retry).await;
                }
                Err(err) => return Err(err.into()),
            }
        }
        Err(StoreError::LockAcquisitionFailure {
            path: lock_path,
            attempts: self.lock_attempts,
        })
    }

    async fn read(&self) -> Result<StoreDocument, StoreError> {
        match fs::read(&self.path).await {
            Ok(bytes) if bytes.is_empty() => Ok(StoreDocument::new()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(StoreDocument::new()),
            Err(err) => Err(err.into()),
        }
    }

    async fn write(&self, document: &StoreDocument) -> Result<(), StoreError> {
        let tmp_path = sibling(&self.path, ".tmp");
        let bytes = serde_json::to_vec_pretty(document)?;
        let mut file = fs::File::create(&tmp_path).await?;
        file.write_all(&bytes).await?;
        file.sync_all().await?;
        drop(file);
        fs::rename(&tmp_path, &self.path).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::config::WalletStoreConfig;
    use crate::error::StoreError;
    use crate::wallet::seed::Seed;
    use crate::wallet::store::{SeedStore, WalletRecord, WalletRole};
    use fs2::FileExt;

    fn store_in(dir: &tempfile::TempDir) -> SeedStore {
        SeedStore::new(&WalletStoreConfig {
            path: dir.path().join("wallets.dat"),
            lock_attempts: 3,
            lock_retry_ms: 1,
        })
    }

    #[tokio::test]
    async fn save_then_load_returns_same_seed() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let record = WalletRecord {
            seed: Seed::generate(),
            leg: 4,
            slots: vec![],
        };
        store.push(WalletRole::Ping, &record).await.unwrap();

        let loaded = store.take(WalletRole::Ping).await.unwrap().unwrap();
        assert_eq!(loaded.seed.as_bytes(), record.seed.as_bytes());
        assert_eq!(loaded.leg, 4);
        assert!(store.take(WalletRole::Ping).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn partial_slot_sets_are_kept() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let partial = WalletRecord {
            seed: Seed::generate(),
            leg: 3,
            slots: vec![0, 2],
        };
        let full = WalletRecord {
            seed: Seed::generate(),
            leg: 3,
            slots: vec![],
        };
        store.push(WalletRole::Ping, &partial).await.unwrap();
        store.push(WalletRole::Ping, &full).await.unwrap();

        let document = std::fs::read_to_string(store.path()).unwrap();
        assert_eq!(document.matches("slots").count(), 1);
        assert_eq!(store.take(WalletRole::Ping).await.unwrap(), Some(partial));
        assert_eq!(store.take(WalletRole::Ping).await.unwrap(), Some(full));
    }

    #[tokio::test]
    async fn loads_are_fifo_and_never_repeat() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let first = Seed::from_bytes([1u8; 32]);
        let second = Seed::from_bytes([2u8; 32]);
        for seed in [&first, &second] {
            store
                .push(
                    WalletRole::Ping,
                    &WalletRecord {
                        seed: seed.clone(),
                        leg: 0,
                        slots: vec![],
                    },
                )
                .await
                .unwrap();
        }

        assert_eq!(store.take(WalletRole::Ping).await.unwrap().unwrap().seed, first);
        assert_eq!(store.take(WalletRole::Ping).await.unwrap().unwrap().seed, second);
        assert!(store.take(WalletRole::Ping).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn roles_are_kept_apart() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store
            .push(
                WalletRole::Pong,
                &WalletRecord {
                    seed: Seed::from_bytes([3u8; 32]),
                    leg: 1,
                    slots: vec![],
                },
            )
            .await
            .unwrap();
        assert!(store.take(WalletRole::Ping).await.unwrap().is_none());
        assert!(store.take(WalletRole::Pong).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        assert!(store.take(WalletRole::Ping).await.unwrap().is_none());
        assert!(!store.path().exists());
    }

    #[tokio::test]
    async fn held_lock_gives_up_after_bounded_attempts() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let holder = std::fs::File::create(dir.path().join("wallets.dat.lock")).unwrap();
        holder.lock_exclusive().unwrap();

        let result = store.take(WalletRole::Ping).await;
        assert!(matches!(
            result,
            Err(StoreError::LockAcquisitionFailure { attempts: 3, .. })
        ));

        drop(holder);
        assert!(store.take(WalletRole::Ping).await.is_ok());
    }

    #[tokio::test]
    async fn stale_lock_file_does_not_block() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        // left behind by a process that was killed while holding the lock
        std::fs::write(dir.path().join("wallets.dat.lock"), b"").unwrap();

        let record = WalletRecord {
            seed: Seed::generate(),
            leg: 2,
            slots: vec![],
        };
        store.push(WalletRole::Ping, &record).await.unwrap();
        assert_eq!(store.take(WalletRole::Ping).await.unwrap(), Some(record));
    }

    #[tokio::test]
    async fn lock_is_released_after_each_operation() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        for leg in 0..3 {
            store
                .push(
                    WalletRole::Ping,
                    &WalletRecord {
                        seed: Seed::generate(),
                        leg,
                        slots: vec![],
                    },
                )
                .await
                .unwrap();
        }
        let lock = std::fs::File::open(dir.path().join("wallets.dat.lock")).unwrap();
        lock.try_lock_exclusive().unwrap();
        assert!(!dir.path().join("wallets.dat.tmp").exists());
    }
}
