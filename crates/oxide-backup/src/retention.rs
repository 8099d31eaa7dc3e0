//! Backup retention.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use tracing::{debug, warn};

/// Number of backups kept per connection unless configured otherwise.
pub const DEFAULT_RETENTION_LIMIT: usize = 5;

/// Deletes the oldest regular files directly under `dir` until at most
/// `limit` remain. A limit of 0 keeps everything.
///
/// Files are ordered by modification time; files sharing a time keep the
/// order in which they were listed. Failed deletions are logged and
/// skipped. Returns the deleted files, oldest first.
pub fn enforce_retention(dir: &Path, limit: usize) -> Vec<PathBuf> {
    if limit == 0 {
        return Vec::new();
    }

    let mut backups = list_backups(dir);
    let mut deleted = Vec::new();

    while backups.len() > limit {
        let Some((_, oldest)) = backups.pop_first() else {
            break;
        };
        match fs::remove_file(&oldest) {
            Ok(()) => {
                debug!(file = %oldest.display(), "Old backup deleted");
                deleted.push(oldest);
            }
            Err(e) => warn!(file = %oldest.display(), error = %e, "Can't delete old backup"),
        }
    }

    deleted
}

/// Keys every regular file under `dir` by a distinct modification time in
/// milliseconds.
fn list_backups(dir: &Path) -> BTreeMap<u128, PathBuf> {
    let mut backups = BTreeMap::new();
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "Can't list backups");
            return backups;
        }
    };

    let mut files: Vec<(u128, PathBuf)> = entries
        .filter_map(std::result::Result::ok)
        .filter_map(|entry| {
            let metadata = entry.metadata().ok()?;
            if !metadata.is_file() {
                return None;
            }
            let modified = metadata
                .modified()
                .ok()?
                .duration_since(UNIX_EPOCH)
                .map_or(0, |d| d.as_millis());
            Some((modified, entry.path()))
        })
        .collect();
    files.sort();

    for (mut key, path) in files {
        while backups.contains_key(&key) {
            key += 1;
        }
        backups.insert(key, path);
    }
    backups
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::time::{Duration, SystemTime};

    fn create_backup(dir: &Path, name: &str, age_secs: u64) -> PathBuf {
        let path = dir.join(name);
        let file = File::create(&path).unwrap();
        file.set_modified(SystemTime::now() - Duration::from_secs(age_secs))
            .unwrap();
        path
    }

    #[test]
    fn test_oldest_files_are_deleted() {
        let dir = tempfile::tempdir().unwrap();
        for (name, age) in [("a", 50), ("b", 40), ("c", 30), ("d", 20), ("e", 10)] {
            create_backup(dir.path(), name, age);
        }
        fs::create_dir(dir.path().join("temp")).unwrap();

        let deleted = enforce_retention(dir.path(), 3);
        let names: Vec<_> = deleted
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a", "b"]);

        let remaining = fs::read_dir(dir.path())
            .unwrap()
            .filter(|e| e.as_ref().unwrap().path().is_file())
            .count();
        assert_eq!(remaining, 3);
        assert!(dir.path().join("temp").is_dir());
    }

    #[test]
    fn test_identical_times_are_distinct() {
        let dir = tempfile::tempdir().unwrap();
        let when = SystemTime::now() - Duration::from_secs(60);
        for name in ["x", "y", "z", "w"] {
            File::create(dir.path().join(name))
                .unwrap()
                .set_modified(when)
                .unwrap();
        }

        assert_eq!(enforce_retention(dir.path(), 1).len(), 3);
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_zero_limit_keeps_everything() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..7 {
            create_backup(dir.path(), &format!("db-{i}"), i * 10);
        }
        assert!(enforce_retention(dir.path(), 0).is_empty());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 7);
    }

    #[test]
    fn test_missing_directory_is_tolerated() {
        let dir = tempfile::tempdir().unwrap();
        assert!(enforce_retention(&dir.path().join("nope"), 2).is_empty());
    }
}
