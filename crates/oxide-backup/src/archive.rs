//! Gzip-compressed tar archives of dump directories.
//!
//! Entries are the regular files of the dump directory, stored under their
//! path relative to the directory root with `/` separators. Directory
//! entries are not written; unpacking recreates them from the file paths.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use tracing::{debug, info};

use crate::error::{BackupError, Result};

/// Packs every regular file below `dump_dir` into `archive`.
///
/// Returns the archived entry names in archive order.
pub fn pack(dump_dir: &Path, archive: &Path) -> Result<Vec<String>> {
    let files = regular_files(dump_dir).map_err(|source| archive_error(dump_dir, source))?;
    write_archive(archive, &files).map_err(|source| archive_error(archive, source))?;

    info!(
        archive = %archive.display(),
        entries = files.len(),
        "Archive written"
    );
    Ok(files.into_iter().map(|(name, _)| name).collect())
}

/// Unpacks `archive` into `target`, overwriting existing files.
pub fn unpack(archive: &Path, target: &Path) -> Result<()> {
    let file = File::open(archive).map_err(|source| archive_error(archive, source))?;
    fs::create_dir_all(target)?;

    let mut tar = tar::Archive::new(GzDecoder::new(file));
    tar.set_overwrite(true);
    tar.unpack(target)
        .map_err(|source| archive_error(archive, source))?;

    info!(archive = %archive.display(), target = %target.display(), "Archive unpacked");
    Ok(())
}

fn write_archive(archive: &Path, files: &[(String, PathBuf)]) -> io::Result<()> {
    let encoder = GzEncoder::new(File::create(archive)?, Compression::default());
    let mut builder = tar::Builder::new(encoder);
    for (name, path) in files {
        debug!(entry = %name, "Adding archive entry");
        builder.append_path_with_name(path, name)?;
    }
    builder.into_inner()?.finish()?;
    Ok(())
}

/// Lists `(entry name, path)` for every regular file below `root`, sorted by
/// entry name.
fn regular_files(root: &Path) -> io::Result<Vec<(String, PathBuf)>> {
    let mut files = Vec::new();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let file_type = entry.file_type()?;
            let path = entry.path();
            if file_type.is_dir() {
                pending.push(path);
            } else if file_type.is_file() {
                files.push((entry_name(root, &path), path));
            }
        }
    }

    files.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(files)
}

fn entry_name(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn archive_error(path: &Path, source: io::Error) -> BackupError {
    BackupError::Archive {
        path: path.to_path_buf(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_dump(root: &Path) {
        fs::create_dir_all(root.join("lobs")).unwrap();
        fs::write(root.join("users.csv"), "id,name\n1,Ada\n").unwrap();
        fs::write(root.join("lobs.sql"), "-- patch\n").unwrap();
        fs::write(root.join("lobs").join("7.blob"), [0u8, 1, 2]).unwrap();
        fs::create_dir_all(root.join("empty")).unwrap();
    }

    #[test]
    fn test_pack_relative_files_only() {
        let dir = tempfile::tempdir().unwrap();
        let dump = dir.path().join("temp");
        create_dump(&dump);

        let archive = dir.path().join("db.tar.gz");
        let entries = pack(&dump, &archive).unwrap();
        assert_eq!(entries, vec!["lobs.sql", "lobs/7.blob", "users.csv"]);

        let mut tar = tar::Archive::new(GzDecoder::new(File::open(&archive).unwrap()));
        let mut stored: Vec<(String, bool)> = tar
            .entries()
            .unwrap()
            .map(|e| {
                let e = e.unwrap();
                (
                    e.path().unwrap().to_string_lossy().into_owned(),
                    e.header().entry_type().is_file(),
                )
            })
            .collect();
        stored.sort();
        assert_eq!(
            stored,
            vec![
                ("lobs.sql".to_string(), true),
                ("lobs/7.blob".to_string(), true),
                ("users.csv".to_string(), true),
            ]
        );
    }

    #[test]
    fn test_unpack_recreates_layout() {
        let dir = tempfile::tempdir().unwrap();
        let dump = dir.path().join("temp");
        create_dump(&dump);
        let archive = dir.path().join("db.tar.gz");
        pack(&dump, &archive).unwrap();

        let target = dir.path().join("restore");
        fs::create_dir_all(&target).unwrap();
        fs::write(target.join("users.csv"), "stale").unwrap();
        unpack(&archive, &target).unwrap();

        assert_eq!(
            fs::read_to_string(target.join("users.csv")).unwrap(),
            "id,name\n1,Ada\n"
        );
        assert_eq!(fs::read(target.join("lobs").join("7.blob")).unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn test_missing_archive_is_an_archive_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = unpack(&dir.path().join("missing.tar.gz"), dir.path()).unwrap_err();
        assert!(matches!(err, BackupError::Archive { .. }));
    }
}
