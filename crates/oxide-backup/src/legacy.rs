//! One-time rewrite of legacy database scripts.
//!
//! Databases written by engine version 2.2 fetch generated keys with
//! `SELECT col INTO var FROM table WHERE key = CURRENT VALUE FOR seq;`.
//! Newer versions expect `SET var = IDENTITY();`. The rewrite runs before the
//! database is opened and keeps the original script as `<name>.script.old`.

use std::fs;
use std::path::{Path, PathBuf};

use regex::Regex;
use tracing::{debug, info};

use crate::error::{BackupError, Result};

/// Version prefix of databases that need the rewrite.
pub const LEGACY_VERSION_PREFIX: &str = "2.2.";

const LEGACY_FETCH_PATTERN: &str =
    r"SELECT ([\w]*) INTO ([\w]*) FROM ([\w\.]*) WHERE ([\w]*)\s?=\s?CURRENT VALUE FOR ([\w\.]*);";
const IDENTITY_REPLACEMENT: &str = "SET $2 = IDENTITY();";

/// What a migration run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// No properties file, no version recorded in it, or no script.
    NotApplicable,
    /// The recorded version is not a legacy one.
    UpToDate {
        /// Recorded version.
        version: String,
    },
    /// Legacy version, but no line needed rewriting.
    NothingToRewrite,
    /// The script was rewritten.
    Migrated {
        /// Number of rewritten lines.
        lines: usize,
        /// Copy of the original script.
        backup: PathBuf,
    },
}

/// Rewrites the script of one database.
#[derive(Debug, Clone)]
pub struct LegacyScriptMigrator {
    dir: PathBuf,
    name: String,
}

impl LegacyScriptMigrator {
    /// Creates a migrator for database `name` stored in `dir`.
    pub fn new(dir: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            name: name.into(),
        }
    }

    /// Returns `<name>.properties`.
    #[must_use]
    pub fn properties_path(&self) -> PathBuf {
        self.sibling("properties")
    }

    /// Returns `<name>.script`.
    #[must_use]
    pub fn script_path(&self) -> PathBuf {
        self.sibling("script")
    }

    fn sibling(&self, extension: &str) -> PathBuf {
        self.dir.join(format!("{}.{extension}", self.name))
    }

    /// Reads the recorded version, if any.
    pub fn recorded_version(&self) -> Result<Option<String>> {
        let path = self.properties_path();
        if !path.is_file() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path)?;
        Ok(property(&content, "version"))
    }

    /// Runs the migration if the recorded version is a legacy one.
    pub fn run(&self) -> Result<MigrationOutcome> {
        let Some(version) = self.recorded_version()? else {
            debug!(database = %self.name, "No recorded version");
            return Ok(MigrationOutcome::NotApplicable);
        };
        if !version.starts_with(LEGACY_VERSION_PREFIX) {
            debug!(database = %self.name, version = %version, "Script is up to date");
            return Ok(MigrationOutcome::UpToDate { version });
        }

        let script = self.script_path();
        if !script.is_file() {
            debug!(database = %self.name, version = %version, "No script to migrate");
            return Ok(MigrationOutcome::NotApplicable);
        }
        let original = fs::read_to_string(&script).map_err(|e| BackupError::InvalidDump {
            path: script.clone(),
            message: format!("can't read legacy script: {e}"),
        })?;

        let (rewritten, lines) = rewrite_script(&original)?;
        if lines == 0 {
            info!(database = %self.name, "No legacy statement found");
            return Ok(MigrationOutcome::NothingToRewrite);
        }

        let new_path = self.sibling("script.new");
        let backup = self.sibling("script.old");
        fs::write(&new_path, rewritten)?;
        fs::copy(&script, &backup)?;
        fs::rename(&new_path, &script)?;

        info!(
            database = %self.name,
            version = %version,
            lines,
            "Legacy script migrated"
        );
        Ok(MigrationOutcome::Migrated { lines, backup })
    }
}

/// Rewrites every legacy key fetch in `script`. Returns the new script and
/// the number of changed lines.
pub fn rewrite_script(script: &str) -> Result<(String, usize)> {
    let pattern = Regex::new(LEGACY_FETCH_PATTERN)?;
    let mut output = String::with_capacity(script.len());
    let mut changed = 0;

    for line in script.lines() {
        let replaced = pattern.replace_all(line, IDENTITY_REPLACEMENT);
        if replaced != line {
            changed += 1;
        }
        output.push_str(&replaced);
        output.push('\n');
    }
    Ok((output, changed))
}

/// Reads `key` from a Java-style properties text (`key=value` or
/// `key: value`, `#` and `!` comments).
fn property(content: &str, key: &str) -> Option<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#') && !line.starts_with('!'))
        .find_map(|line| {
            let split = line.find(['=', ':'])?;
            let (name, value) = line.split_at(split);
            (name.trim() == key).then(|| value[1..].trim().to_string())
        })
}

/// Shorthand for [`LegacyScriptMigrator::run`].
pub fn migrate(dir: &Path, name: &str) -> Result<MigrationOutcome> {
    LegacyScriptMigrator::new(dir, name).run()
}
