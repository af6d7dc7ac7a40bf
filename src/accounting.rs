//! Per-user upload counters.
//!
//! Counters change only through [`UsageDelta`] commands tied to one dataset.
//! A ledger remembers which datasets are currently counted: an upload is
//! applied only for a dataset that is not counted yet and a removal only for
//! one that is. Replaying either command is a no-op, and the remembered set
//! never holds more than the live datasets.

use crate::dataset::UserId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs::{self, File, create_dir_all};
use std::io::{BufReader, ErrorKind};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;
use uuid::Uuid;

/// Failure to update or read usage counters
#[derive(Error, Debug)]
pub enum AccountingError {
    #[error("usage ledger IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("usage ledger is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[error("usage ledger lock poisoned")]
    Poisoned,
}

/// Running totals for one user
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageTotals {
    pub upload_count: i64,
    pub storage_used: i64,
}

impl UsageTotals {
    fn apply(&mut self, delta: &UsageDelta) {
        self.upload_count += delta.file_delta();
        self.storage_used += delta.byte_delta();
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UsageChange {
    Upload,
    Removal,
}

impl UsageChange {
    fn as_bytes(&self) -> &'static [u8] {
        match self {
            UsageChange::Upload => b"upload",
            UsageChange::Removal => b"removal",
        }
    }
}

/// One change to a user's counters caused by one dataset
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageDelta {
    /// Stable per dataset and change, so a resent command carries the same id
    pub command_id: Uuid,
    pub dataset_id: Uuid,
    pub user_id: UserId,
    pub change: UsageChange,
    pub size: u64,
}

impl UsageDelta {
    pub fn new(user_id: UserId, dataset_id: Uuid, change: UsageChange, size: u64) -> Self {
        Self {
            command_id: Uuid::new_v5(&dataset_id, change.as_bytes()),
            dataset_id,
            user_id,
            change,
            size,
        }
    }

    /// Delta recorded after a successful upload
    pub fn upload(user_id: UserId, dataset_id: Uuid, size: u64) -> Self {
        Self::new(user_id, dataset_id, UsageChange::Upload, size)
    }

    /// Delta recorded after a dataset is removed
    pub fn removal(user_id: UserId, dataset_id: Uuid, size: u64) -> Self {
        Self::new(user_id, dataset_id, UsageChange::Removal, size)
    }

    pub fn file_delta(&self) -> i64 {
        match self.change {
            UsageChange::Upload => 1,
            UsageChange::Removal => -1,
        }
    }

    pub fn byte_delta(&self) -> i64 {
        let size = i64::try_from(self.size).unwrap_or(i64::MAX);
        match self.change {
            UsageChange::Upload => size,
            UsageChange::Removal => -size,
        }
    }
}

/// Record `delta` in the set of counted datasets; false when it changes nothing
fn mark_counted(counted: &mut BTreeSet<Uuid>, delta: &UsageDelta) -> bool {
    match delta.change {
        UsageChange::Upload => counted.insert(delta.dataset_id),
        UsageChange::Removal => counted.remove(&delta.dataset_id),
    }
}

/// Sink for usage deltas
pub trait UsageLedger: Send + Sync {
    /// Apply a delta. Replaying a delta that was already applied is a no-op.
    fn increment_usage(&self, delta: &UsageDelta) -> Result<(), AccountingError>;

    fn usage(&self, user: &UserId) -> Result<UsageTotals, AccountingError>;
}

#[derive(Debug, Default)]
struct LedgerState {
    totals: HashMap<UserId, UsageTotals>,
    counted: BTreeSet<Uuid>,
}

/// Counters kept in process memory
#[derive(Debug, Default)]
pub struct MemoryLedger {
    state: Mutex<LedgerState>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of datasets currently counted
    pub fn counted_datasets(&self) -> Result<usize, AccountingError> {
        let state = self.state.lock().map_err(|_| AccountingError::Poisoned)?;
        Ok(state.counted.len())
    }
}

impl UsageLedger for MemoryLedger {
    fn increment_usage(&self, delta: &UsageDelta) -> Result<(), AccountingError> {
        let mut state = self.state.lock().map_err(|_| AccountingError::Poisoned)?;
        if mark_counted(&mut state.counted, delta) {
            state
                .totals
                .entry(delta.user_id.clone())
                .or_default()
                .apply(delta);
        }
        Ok(())
    }

    fn usage(&self, user: &UserId) -> Result<UsageTotals, AccountingError> {
        let state = self.state.lock().map_err(|_| AccountingError::Poisoned)?;
        Ok(state.totals.get(user).copied().unwrap_or_default())
    }
}

/// On-disk layout of the JSON ledger
#[derive(Debug, Default, Serialize, Deserialize)]
struct LedgerFile {
    #[serde(default)]
    users: BTreeMap<UserId, UsageTotals>,
    #[serde(default)]
    counted: BTreeSet<Uuid>,
}

/// Counters persisted in a single `users.json` file
#[derive(Debug)]
pub struct JsonLedger {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonLedger {
    /// Use `path` as the ledger file, creating it if it does not exist
    pub fn open(path: impl AsRef<Path>) -> Result<Self, AccountingError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            create_dir_all(parent)?;
        }
        if !path.exists() {
            fs::write(&path, b"{}")?;
        }
        Ok(Self {
            path,
            lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<LedgerFile, AccountingError> {
        match File::open(&self.path) {
            Ok(file) => Ok(serde_json::from_reader(BufReader::new(file))?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(LedgerFile::default()),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, ledger: &LedgerFile) -> Result<(), AccountingError> {
        let json = serde_json::to_string_pretty(ledger)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl UsageLedger for JsonLedger {
    fn increment_usage(&self, delta: &UsageDelta) -> Result<(), AccountingError> {
        let _guard = self.lock.lock().map_err(|_| AccountingError::Poisoned)?;
        let mut ledger = self.load()?;
        if !mark_counted(&mut ledger.counted, delta) {
            return Ok(());
        }
        ledger
            .users
            .entry(delta.user_id.clone())
            .or_default()
            .apply(delta);
        self.save(&ledger)
    }

    fn usage(&self, user: &UserId) -> Result<UsageTotals, AccountingError> {
        let _guard = self.lock.lock().map_err(|_| AccountingError::Poisoned)?;
        Ok(self.load()?.users.get(user).copied().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replayed_delta_is_counted_once() {
        let ledger = MemoryLedger::new();
        let alice = UserId::new("alice");
        let dataset = Uuid::new_v4();

        ledger.increment_usage(&UsageDelta::upload(alice.clone(), dataset, 120)).unwrap();
        ledger.increment_usage(&UsageDelta::upload(alice.clone(), dataset, 120)).unwrap();

        let totals = ledger.usage(&alice).unwrap();
        assert_eq!(totals.upload_count, 1);
        assert_eq!(totals.storage_used, 120);
    }

    #[test]
    fn command_ids_are_stable_per_dataset_and_change() {
        let dataset = Uuid::new_v4();
        let user = UserId::new("alice");
        let first = UsageDelta::upload(user.clone(), dataset, 1);
        let again = UsageDelta::upload(user.clone(), dataset, 1);
        let removal = UsageDelta::removal(user, dataset, 1);
        assert_eq!(first.command_id, again.command_id);
        assert_ne!(first.command_id, removal.command_id);
    }

    #[test]
    fn removal_reverses_upload_and_forgets_the_dataset() {
        let ledger = MemoryLedger::new();
        let bob = UserId::new("bob");
        let dataset = Uuid::new_v4();

        ledger.increment_usage(&UsageDelta::upload(bob.clone(), dataset, 50)).unwrap();
        assert_eq!(ledger.counted_datasets().unwrap(), 1);

        let removal = UsageDelta::removal(bob.clone(), dataset, 50);
        ledger.increment_usage(&removal).unwrap();
        ledger.increment_usage(&removal).unwrap();

        assert_eq!(ledger.usage(&bob).unwrap(), UsageTotals::default());
        assert_eq!(ledger.counted_datasets().unwrap(), 0);
    }

    #[test]
    fn removal_of_uncounted_dataset_is_ignored() {
        let ledger = MemoryLedger::new();
        let erin = UserId::new("erin");
        ledger
            .increment_usage(&UsageDelta::removal(erin.clone(), Uuid::new_v4(), 30))
            .unwrap();
        assert_eq!(ledger.usage(&erin).unwrap(), UsageTotals::default());
    }

    #[test]
    fn json_ledger_persists_between_opens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("database").join("users.json");
        let carol = UserId::new("carol");
        let delta = UsageDelta::upload(carol.clone(), Uuid::new_v4(), 10);

        JsonLedger::open(&path).unwrap().increment_usage(&delta).unwrap();

        let reopened = JsonLedger::open(&path).unwrap();
        reopened.increment_usage(&delta).unwrap();
        let totals = reopened.usage(&carol).unwrap();
        assert_eq!(totals, UsageTotals { upload_count: 1, storage_used: 10 });
    }

    #[test]
    fn json_ledger_drops_removed_datasets_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.json");
        let ledger = JsonLedger::open(&path).unwrap();
        let frank = UserId::new("frank");
        let dataset = Uuid::new_v4();

        ledger.increment_usage(&UsageDelta::upload(frank.clone(), dataset, 7)).unwrap();
        assert!(ledger.load().unwrap().counted.contains(&dataset));

        ledger.increment_usage(&UsageDelta::removal(frank, dataset, 7)).unwrap();
        assert!(ledger.load().unwrap().counted.is_empty());
    }

    #[test]
    fn corrupt_ledger_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.json");
        fs::write(&path, "not json").unwrap();

        let ledger = JsonLedger::open(&path).unwrap();
        let err = ledger
            .increment_usage(&UsageDelta::upload(UserId::new("dave"), Uuid::new_v4(), 1))
            .unwrap_err();
        assert!(matches!(err, AccountingError::Corrupt(_)));
    }
}
