use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

use chrono::NaiveDate;
use thiserror::Error;
use tracing::debug;

use crate::{
    fs::operations::{read_json_locked, write_json_locked},
    timeline::category::Rule,
    utils::time::{date_to_record_name, record_name_to_date},
};

use super::entities::SnapshotEntity;

const DAY_PREFIX: &str = "track-";
const BACKUP_PREFIX: &str = "track-backup-";
const SUFFIX: &str = ".json";
const RULES_FILE: &str = "category_rules.json";

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("Failed to access {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("File {path:?} is corrupted: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl PersistenceError {
    fn from_io(path: &Path, source: std::io::Error) -> Self {
        let path = path.to_path_buf();
        if source.kind() == ErrorKind::InvalidData {
            Self::Corrupt { path, source }
        } else {
            Self::Io { path, source }
        }
    }
}

/// Reads and writes day snapshots and rules inside one data directory.
#[derive(Debug, Clone)]
pub struct SnapshotStorage {
    dir: PathBuf,
}

impl SnapshotStorage {
    pub fn new(dir: PathBuf) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(&dir)?;

        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn day_path(&self, date: NaiveDate) -> PathBuf {
        self.dir
            .join(format!("{DAY_PREFIX}{}{SUFFIX}", date_to_record_name(date)))
    }

    pub fn backup_path(&self, date: NaiveDate) -> PathBuf {
        self.dir
            .join(format!("{BACKUP_PREFIX}{}{SUFFIX}", date_to_record_name(date)))
    }

    pub fn rules_path(&self) -> PathBuf {
        self.dir.join(RULES_FILE)
    }

    pub async fn load_day(
        &self,
        date: NaiveDate,
    ) -> Result<Option<SnapshotEntity>, PersistenceError> {
        Self::load_snapshot(&self.day_path(date)).await
    }

    /// Loads a snapshot from any path, for example one returned by [Self::list_days].
    pub async fn load_snapshot(path: &Path) -> Result<Option<SnapshotEntity>, PersistenceError> {
        debug!("Loading snapshot {path:?}");
        let Some(stored) = read_json_locked::<serde_json::Value>(path)
            .await
            .map_err(|e| PersistenceError::from_io(path, e))?
        else {
            return Ok(None);
        };
        SnapshotEntity::from_stored(stored)
            .map(Some)
            .map_err(|e| PersistenceError::Corrupt {
                path: path.to_path_buf(),
                source: std::io::Error::new(ErrorKind::InvalidData, e),
            })
    }

    pub async fn save_day(
        &self,
        date: NaiveDate,
        snapshot: &SnapshotEntity,
    ) -> Result<(), PersistenceError> {
        let path = self.day_path(date);
        write_json_locked(&path, snapshot)
            .await
            .map_err(|e| PersistenceError::from_io(&path, e))
    }

    pub async fn save_backup(
        &self,
        date: NaiveDate,
        snapshot: &SnapshotEntity,
    ) -> Result<(), PersistenceError> {
        let path = self.backup_path(date);
        write_json_locked(&path, snapshot)
            .await
            .map_err(|e| PersistenceError::from_io(&path, e))
    }

    pub async fn load_rules(&self) -> Result<Option<Vec<Rule>>, PersistenceError> {
        let path = self.rules_path();
        read_json_locked(&path)
            .await
            .map_err(|e| PersistenceError::from_io(&path, e))
    }

    pub async fn save_rules(&self, rules: &[Rule]) -> Result<(), PersistenceError> {
        let path = self.rules_path();
        write_json_locked(&path, &rules)
            .await
            .map_err(|e| PersistenceError::from_io(&path, e))
    }

    /// Day files in the directory sorted by date. Backups aren't included.
    pub fn list_days(
        &self,
        exclude: Option<NaiveDate>,
    ) -> Result<Vec<(NaiveDate, PathBuf)>, PersistenceError> {
        let entries =
            std::fs::read_dir(&self.dir).map_err(|e| PersistenceError::from_io(&self.dir, e))?;
        let mut days = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let name = entry.file_name();
                let date = name
                    .to_str()?
                    .strip_prefix(DAY_PREFIX)?
                    .strip_suffix(SUFFIX)
                    .and_then(record_name_to_date)?;
                Some((date, entry.path()))
            })
            .filter(|(date, _)| Some(*date) != exclude)
            .collect::<Vec<_>>();
        days.sort();
        Ok(days)
    }
}
