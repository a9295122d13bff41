//! Local key-value persistence: one JSON file per cache key.

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::models::{SubjectId, ViewModel};

/// Persisted form of a cache entry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredEntry {
    pub data: ViewModel,
    /// Epoch milliseconds at which the entry was written
    pub timestamp: i64,
}

pub struct DiskStore {
    cache_dir: PathBuf,
}

impl DiskStore {
    pub fn new(cache_dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&cache_dir)
            .with_context(|| format!("Failed to create cache directory {}", cache_dir.display()))?;
        Ok(Self { cache_dir })
    }

    fn cache_path(&self, key: &str) -> PathBuf {
        self.cache_dir.join(format!("{}.json", key))
    }

    pub fn load(&self, subject: &SubjectId) -> Result<Option<StoredEntry>> {
        let key = subject.cache_key();
        let path = self.cache_path(&key);
        if !path.exists() {
            return Ok(None);
        }

        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read cache file: {}", key))?;

        let stored: StoredEntry = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse cache file: {}", key))?;

        Ok(Some(stored))
    }

    /// Write through a temporary file so readers never see a half-written entry
    pub fn save(&self, subject: &SubjectId, entry: &StoredEntry) -> Result<()> {
        let key = subject.cache_key();
        let path = self.cache_path(&key);
        let tmp = self.cache_dir.join(format!("{}.json.tmp", key));
        let contents = serde_json::to_string_pretty(entry)?;
        std::fs::write(&tmp, contents)
            .with_context(|| format!("Failed to write cache file: {}", key))?;
        std::fs::rename(&tmp, &path)
            .with_context(|| format!("Failed to replace cache file: {}", key))?;
        Ok(())
    }

    pub fn remove(&self, subject: &SubjectId) -> Result<()> {
        let path = self.cache_path(&subject.cache_key());
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }

    /// Subjects that currently have a persisted entry
    pub fn subjects(&self) -> Result<Vec<SubjectId>> {
        let mut subjects = Vec::new();
        for entry in std::fs::read_dir(&self.cache_dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(subject) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(SubjectId::from_cache_key)
            {
                subjects.push(subject);
            }
        }
        subjects.sort();
        Ok(subjects)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stored(total: f64, timestamp: i64) -> StoredEntry {
        let mut data = ViewModel::default();
        data.giving.total = total;
        StoredEntry { data, timestamp }
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let disk = DiskStore::new(dir.path().to_path_buf()).unwrap();
        let subject = SubjectId::member("M1");

        assert!(disk.load(&subject).unwrap().is_none());
        disk.save(&subject, &stored(12.5, 1_000)).unwrap();

        assert!(dir.path().join("analytics_cache_member_M1.json").exists());
        assert_eq!(disk.load(&subject).unwrap(), Some(stored(12.5, 1_000)));
    }

    #[test]
    fn test_persisted_shape() {
        let dir = tempfile::tempdir().unwrap();
        let disk = DiskStore::new(dir.path().to_path_buf()).unwrap();
        disk.save(&SubjectId::Organization, &stored(1.0, 42)).unwrap();

        let raw = std::fs::read_to_string(dir.path().join("analytics_cache_organization.json")).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["timestamp"], 42);
        assert_eq!(value["data"]["giving"]["total"], 1.0);
        assert!(value["data"]["inGathering"]["recentRecords"].is_array());
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let disk = DiskStore::new(dir.path().to_path_buf()).unwrap();
        std::fs::write(dir.path().join("analytics_cache_user_u1.json"), "{not json").unwrap();
        assert!(disk.load(&SubjectId::user("u1")).is_err());
    }

    #[test]
    fn test_subjects_and_remove() {
        let dir = tempfile::tempdir().unwrap();
        let disk = DiskStore::new(dir.path().to_path_buf()).unwrap();
        disk.save(&SubjectId::member("b"), &stored(0.0, 0)).unwrap();
        disk.save(&SubjectId::member("a"), &stored(0.0, 0)).unwrap();
        std::fs::write(dir.path().join("session.json"), "{}").unwrap();

        assert_eq!(
            disk.subjects().unwrap(),
            vec![SubjectId::member("a"), SubjectId::member("b")]
        );

        disk.remove(&SubjectId::member("a")).unwrap();
        assert_eq!(disk.subjects().unwrap(), vec![SubjectId::member("b")]);
    }

    #[test]
    fn test_id_with_path_separator_persists() {
        let dir = tempfile::tempdir().unwrap();
        let disk = DiskStore::new(dir.path().to_path_buf()).unwrap();
        let subject = SubjectId::member("north/42");

        disk.save(&subject, &stored(3.0, 7)).unwrap();
        assert_eq!(disk.load(&subject).unwrap(), Some(stored(3.0, 7)));
        assert_eq!(disk.subjects().unwrap(), vec![subject]);
    }
}
