use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::crypto;
use crate::models::{CycleRecord, DayRecord, UserProfile};

const FILE_EXTENSION: &str = "cyclesense";

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("crypto error: {0}")]
    Crypto(#[from] crypto::CryptoError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("data directory not found")]
    NoDataDir,
    #[error("invalid user id `{0}`")]
    InvalidUser(String),
    #[error("no data for user `{0}`")]
    UnknownUser(String),
    #[error("user `{0}` already exists")]
    UserExists(String),
    #[error("cycle {0} not found")]
    CycleNotFound(Uuid),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Row-level access to one user's cycles, days and profile.
///
/// The store is the source of truth; callers keep their own cache and only
/// update it after a write returns `Ok`.
pub trait CycleStore {
    fn load_profile(&self) -> Result<Option<UserProfile>, StorageError>;

    fn save_profile(&mut self, profile: &UserProfile) -> Result<(), StorageError>;

    /// All cycles, newest start date first, each with its days attached.
    fn list_cycles(&self) -> Result<Vec<CycleRecord>, StorageError>;

    /// Insert a cycle row and link its days to it, in one write.
    fn insert_cycle(&mut self, cycle: &CycleRecord) -> Result<(), StorageError>;

    /// Persist end date and length of an existing cycle.
    fn update_cycle(&mut self, cycle: &CycleRecord) -> Result<(), StorageError>;

    fn find_day(&self, date: NaiveDate) -> Result<Option<DayRecord>, StorageError>;

    /// Insert or replace the record for `day.date`. A `cycle_id` of `None`
    /// keeps whatever cycle the day was already linked to.
    fn upsert_day(&mut self, day: &DayRecord, cycle_id: Option<Uuid>) -> Result<(), StorageError>;

    fn wipe(&mut self) -> Result<(), StorageError>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CycleRow {
    id: Uuid,
    start_date: NaiveDate,
    end_date: Option<NaiveDate>,
    length: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DayRow {
    cycle_id: Option<Uuid>,
    #[serde(flatten)]
    day: DayRecord,
}

/// Everything stored for one user.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoreDocument {
    profile: Option<UserProfile>,
    #[serde(default)]
    cycles: Vec<CycleRow>,
    #[serde(default)]
    days: Vec<DayRow>,
}

impl StoreDocument {
    fn cycles_newest_first(&self) -> Vec<CycleRecord> {
        let mut cycles: Vec<CycleRecord> = self
            .cycles
            .iter()
            .map(|row| {
                let mut days: Vec<DayRecord> = self
                    .days
                    .iter()
                    .filter(|d| d.cycle_id == Some(row.id))
                    .map(|d| d.day.clone())
                    .collect();
                days.sort_by_key(|d| d.date);
                CycleRecord {
                    id: row.id,
                    start_date: row.start_date,
                    end_date: row.end_date,
                    length: row.length,
                    days,
                }
            })
            .collect();
        cycles.sort_by(|a, b| b.start_date.cmp(&a.start_date));
        cycles
    }

    fn insert_cycle(&mut self, cycle: &CycleRecord) {
        self.cycles.push(CycleRow {
            id: cycle.id,
            start_date: cycle.start_date,
            end_date: cycle.end_date,
            length: cycle.length,
        });
        for day in &cycle.days {
            self.upsert_day(day, Some(cycle.id));
        }
    }

    fn update_cycle(&mut self, cycle: &CycleRecord) -> Result<(), StorageError> {
        let row = self
            .cycles
            .iter_mut()
            .find(|row| row.id == cycle.id)
            .ok_or(StorageError::CycleNotFound(cycle.id))?;
        row.end_date = cycle.end_date;
        row.length = cycle.length;
        Ok(())
    }

    fn find_day(&self, date: NaiveDate) -> Option<DayRecord> {
        self.days
            .iter()
            .find(|row| row.day.date == date)
            .map(|row| row.day.clone())
    }

    fn upsert_day(&mut self, day: &DayRecord, cycle_id: Option<Uuid>) {
        match self.days.iter_mut().find(|row| row.day.date == day.date) {
            Some(row) => {
                row.day = day.clone();
                if cycle_id.is_some() {
                    row.cycle_id = cycle_id;
                }
            }
            None => self.days.push(DayRow {
                cycle_id,
                day: day.clone(),
            }),
        }
    }
}

/// In-process store. Used by tests and demos; can be told to fail writes.
#[derive(Debug, Default)]
pub struct MemoryStore {
    doc: StoreDocument,
    fail_writes: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write return `StorageError::Unavailable`.
    pub fn fail_writes(&mut self, fail: bool) {
        self.fail_writes = fail;
    }

    fn check_writable(&self) -> Result<(), StorageError> {
        if self.fail_writes {
            return Err(StorageError::Unavailable("writes disabled".into()));
        }
        Ok(())
    }
}

impl CycleStore for MemoryStore {
    fn load_profile(&self) -> Result<Option<UserProfile>, StorageError> {
        Ok(self.doc.profile.clone())
    }

    fn save_profile(&mut self, profile: &UserProfile) -> Result<(), StorageError> {
        self.check_writable()?;
        self.doc.profile = Some(profile.clone());
        Ok(())
    }

    fn list_cycles(&self) -> Result<Vec<CycleRecord>, StorageError> {
        Ok(self.doc.cycles_newest_first())
    }

    fn insert_cycle(&mut self, cycle: &CycleRecord) -> Result<(), StorageError> {
        self.check_writable()?;
        self.doc.insert_cycle(cycle);
        Ok(())
    }

    fn update_cycle(&mut self, cycle: &CycleRecord) -> Result<(), StorageError> {
        self.check_writable()?;
        self.doc.update_cycle(cycle)
    }

    fn find_day(&self, date: NaiveDate) -> Result<Option<DayRecord>, StorageError> {
        Ok(self.doc.find_day(date))
    }

    fn upsert_day(&mut self, day: &DayRecord, cycle_id: Option<Uuid>) -> Result<(), StorageError> {
        self.check_writable()?;
        self.doc.upsert_day(day, cycle_id);
        Ok(())
    }

    fn wipe(&mut self) -> Result<(), StorageError> {
        self.check_writable()?;
        self.doc = StoreDocument::default();
        Ok(())
    }
}

/// One passphrase-encrypted JSON document per user under a data directory.
///
/// Every write re-seals the whole document; the in-memory copy only changes
/// once the file has been written.
pub struct EncryptedFileStore {
    path: PathBuf,
    passphrase: Zeroizing<String>,
    doc: StoreDocument,
}

impl std::fmt::Debug for EncryptedFileStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptedFileStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl EncryptedFileStore {
    /// Default data directory, e.g. `~/.local/share/cyclesense`.
    pub fn default_dir() -> Result<PathBuf, StorageError> {
        Ok(dirs::data_local_dir()
            .ok_or(StorageError::NoDataDir)?
            .join("cyclesense"))
    }

    pub fn exists(dir: &Path, user_id: &str) -> Result<bool, StorageError> {
        Ok(user_file(dir, user_id)?.exists())
    }

    /// Start an empty document for a new user.
    pub fn create(dir: &Path, user_id: &str, passphrase: String) -> Result<Self, StorageError> {
        let path = user_file(dir, user_id)?;
        if path.exists() {
            return Err(StorageError::UserExists(user_id.to_string()));
        }
        fs::create_dir_all(dir)?;
        let store = Self {
            path,
            passphrase: Zeroizing::new(passphrase),
            doc: StoreDocument::default(),
        };
        store.persist(&store.doc)?;
        Ok(store)
    }

    /// Unlock an existing user's document.
    pub fn open(dir: &Path, user_id: &str, passphrase: String) -> Result<Self, StorageError> {
        let path = user_file(dir, user_id)?;
        if !path.exists() {
            return Err(StorageError::UnknownUser(user_id.to_string()));
        }
        let sealed = fs::read(&path)?;
        let plain = crypto::open(&passphrase, &sealed)?;
        let doc: StoreDocument = serde_json::from_slice(&plain)?;
        Ok(Self {
            path,
            passphrase: Zeroizing::new(passphrase),
            doc,
        })
    }

    fn tmp_path(&self) -> PathBuf {
        self.path.with_extension("tmp")
    }

    fn persist(&self, doc: &StoreDocument) -> Result<(), StorageError> {
        let json = Zeroizing::new(serde_json::to_vec(doc)?);
        let sealed = crypto::seal(&self.passphrase, &json)?;
        let tmp = self.tmp_path();
        fs::write(&tmp, sealed)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    /// Apply `change` to a copy, write it, then adopt it.
    fn write_with<F>(&mut self, change: F) -> Result<(), StorageError>
    where
        F: FnOnce(&mut StoreDocument) -> Result<(), StorageError>,
    {
        let mut next = self.doc.clone();
        change(&mut next)?;
        self.persist(&next)?;
        self.doc = next;
        Ok(())
    }
}

fn user_file(dir: &Path, user_id: &str) -> Result<PathBuf, StorageError> {
    let valid = !user_id.is_empty()
        && user_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '@'))
        && !user_id.starts_with('.');
    if !valid {
        return Err(StorageError::InvalidUser(user_id.to_string()));
    }
    Ok(dir.join(format!("{user_id}.{FILE_EXTENSION}")))
}

impl CycleStore for EncryptedFileStore {
    fn load_profile(&self) -> Result<Option<UserProfile>, StorageError> {
        Ok(self.doc.profile.clone())
    }

    fn save_profile(&mut self, profile: &UserProfile) -> Result<(), StorageError> {
        self.write_with(|doc| {
            doc.profile = Some(profile.clone());
            Ok(())
        })
    }

    fn list_cycles(&self) -> Result<Vec<CycleRecord>, StorageError> {
        Ok(self.doc.cycles_newest_first())
    }

    fn insert_cycle(&mut self, cycle: &CycleRecord) -> Result<(), StorageError> {
        self.write_with(|doc| {
            doc.insert_cycle(cycle);
            Ok(())
        })
    }

    fn update_cycle(&mut self, cycle: &CycleRecord) -> Result<(), StorageError> {
        self.write_with(|doc| doc.update_cycle(cycle))
    }

    fn find_day(&self, date: NaiveDate) -> Result<Option<DayRecord>, StorageError> {
        Ok(self.doc.find_day(date))
    }

    fn upsert_day(&mut self, day: &DayRecord, cycle_id: Option<Uuid>) -> Result<(), StorageError> {
        self.write_with(|doc| {
            doc.upsert_day(day, cycle_id);
            Ok(())
        })
    }

    /// Delete the user's file permanently, along with any half-written copy.
    fn wipe(&mut self) -> Result<(), StorageError> {
        for path in [self.path.clone(), self.tmp_path()] {
            if path.exists() {
                fs::remove_file(&path)?;
            }
        }
        self.doc = StoreDocument::default();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dates;
    use crate::models::FlowIntensity;

    fn d(s: &str) -> NaiveDate {
        dates::parse(s).unwrap()
    }

    #[test]
    fn memory_store_lists_newest_first_with_days() {
        let mut store = MemoryStore::new();
        let older = CycleRecord::new(d("2024-01-01"));
        let newer = CycleRecord::new(d("2024-01-29"));
        store.insert_cycle(&older).unwrap();
        store.insert_cycle(&newer).unwrap();
        store
            .upsert_day(&DayRecord::with_flow(d("2024-01-30"), FlowIntensity::Heavy), Some(newer.id))
            .unwrap();
        store
            .upsert_day(&DayRecord::with_flow(d("2024-01-29"), FlowIntensity::Light), Some(newer.id))
            .unwrap();

        let cycles = store.list_cycles().unwrap();
        assert_eq!(cycles[0].id, newer.id);
        assert_eq!(cycles[1].id, older.id);
        assert_eq!(cycles[0].days.len(), 2);
        assert_eq!(cycles[0].days[0].date, d("2024-01-29"));
        assert!(cycles[1].days.is_empty());
    }

    #[test]
    fn upsert_keeps_one_row_per_date() {
        let mut store = MemoryStore::new();
        let cycle = CycleRecord::new(d("2024-01-01"));
        store.insert_cycle(&cycle).unwrap();

        let mut day = DayRecord::with_flow(d("2024-01-01"), FlowIntensity::Medium);
        store.upsert_day(&day, Some(cycle.id)).unwrap();
        day.notes = Some("tired".into());
        store.upsert_day(&day, None).unwrap();

        let cycles = store.list_cycles().unwrap();
        assert_eq!(cycles[0].days.len(), 1);
        assert_eq!(cycles[0].days[0].notes.as_deref(), Some("tired"));
    }

    #[test]
    fn updating_unknown_cycle_fails() {
        let mut store = MemoryStore::new();
        let cycle = CycleRecord::new(d("2024-01-01"));
        assert!(matches!(
            store.update_cycle(&cycle),
            Err(StorageError::CycleNotFound(id)) if id == cycle.id
        ));
    }

    #[test]
    fn encrypted_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let cycle = CycleRecord::new(d("2024-01-01"));
        {
            let mut store = EncryptedFileStore::create(dir.path(), "alice", "pw".into()).unwrap();
            store.insert_cycle(&cycle).unwrap();
            store
                .upsert_day(&DayRecord::with_flow(d("2024-01-01"), FlowIntensity::Medium), Some(cycle.id))
                .unwrap();
            store.save_profile(&UserProfile::new("alice", d("2024-01-01"))).unwrap();
        }

        let store = EncryptedFileStore::open(dir.path(), "alice", "pw".into()).unwrap();
        let cycles = store.list_cycles().unwrap();
        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0].id, cycle.id);
        assert_eq!(cycles[0].days.len(), 1);
        assert_eq!(store.load_profile().unwrap().unwrap().id, "alice");
    }

    #[test]
    fn encrypted_store_rejects_wrong_passphrase_and_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        EncryptedFileStore::create(dir.path(), "bob", "right".into()).unwrap();

        assert!(matches!(
            EncryptedFileStore::open(dir.path(), "bob", "wrong".into()),
            Err(StorageError::Crypto(_))
        ));
        assert!(matches!(
            EncryptedFileStore::create(dir.path(), "bob", "right".into()),
            Err(StorageError::UserExists(_))
        ));
        assert!(matches!(
            EncryptedFileStore::open(dir.path(), "carol", "pw".into()),
            Err(StorageError::UnknownUser(_))
        ));
        assert!(matches!(
            EncryptedFileStore::create(dir.path(), "../evil", "pw".into()),
            Err(StorageError::InvalidUser(_))
        ));
    }

    #[test]
    fn wipe_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = EncryptedFileStore::create(dir.path(), "dana", "pw".into()).unwrap();
        assert!(EncryptedFileStore::exists(dir.path(), "dana").unwrap());
        store.wipe().unwrap();
        assert!(!EncryptedFileStore::exists(dir.path(), "dana").unwrap());
    }

    #[test]
    fn wipe_also_removes_interrupted_write() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = EncryptedFileStore::create(dir.path(), "erin", "pw".into()).unwrap();
        let tmp = dir.path().join("erin.tmp");
        fs::write(&tmp, b"partial").unwrap();

        store.wipe().unwrap();
        assert!(!tmp.exists());
        assert!(!EncryptedFileStore::exists(dir.path(), "erin").unwrap());
    }

    #[test]
    fn inserted_cycle_carries_its_days() {
        let mut store = MemoryStore::new();
        let old = CycleRecord::new(d("2024-01-01"));
        store.insert_cycle(&old).unwrap();
        store
            .upsert_day(&DayRecord::with_flow(d("2024-01-29"), FlowIntensity::Light), Some(old.id))
            .unwrap();

        let mut new = CycleRecord::new(d("2024-01-29"));
        new.put_day(DayRecord::with_flow(d("2024-01-29"), FlowIntensity::Medium));
        store.insert_cycle(&new).unwrap();

        let cycles = store.list_cycles().unwrap();
        assert_eq!(cycles[0].id, new.id);
        assert_eq!(cycles[0].days[0].flow, Some(FlowIntensity::Medium));
        assert!(cycles[1].days.is_empty());
    }
}
