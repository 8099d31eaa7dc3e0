//! Connection configuration file.
//!
//! The file lists named connections, one block per connection:
//!
//! ```text
//! # production database
//! urlid main
//! url   sqlite:/var/lib/app/main.sqlite3
//!
//! urlid archive
//! url   sqlite:/var/lib/app/archive.sqlite3
//! ```
//!
//! Keys are case-insensitive and separated from their value by whitespace.
//! Blank lines and lines starting with `#` are ignored, as are keys other
//! than `urlid` and `url`.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{BackupError, Result};

/// Default name of the configuration file.
pub const DEFAULT_CONFIG_FILE: &str = "manager.conf";

/// One named connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Connection id.
    pub id: String,
    /// Database URL.
    pub url: String,
}

/// All connections of a configuration file, in file order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerConfig {
    path: PathBuf,
    connections: Vec<ConnectionConfig>,
}

impl ManagerConfig {
    /// Loads and validates a configuration file.
    ///
    /// Fails if the file can't be read, if a connection lacks a URL or is
    /// defined twice, or if there is no connection at all.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(config_error(path, "file not found"));
        }
        let content = fs::read_to_string(path)
            .map_err(|e| config_error(path, &format!("not readable: {e}")))?;
        Self::parse(path, &content)
    }

    /// Parses configuration text read from `path`.
    pub fn parse(path: impl AsRef<Path>, content: &str) -> Result<Self> {
        let path = path.as_ref();
        let mut connections: Vec<ConnectionConfig> = Vec::new();
        let mut current: Option<(String, Option<String>)> = None;

        for (number, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let (key, value) = match line.split_once(char::is_whitespace) {
                Some((key, value)) => (key, value.trim()),
                None => (line, ""),
            };

            if key.eq_ignore_ascii_case("urlid") {
                if value.is_empty() {
                    return Err(config_error(
                        path,
                        &format!("line {}: urlid without a name", number + 1),
                    ));
                }
                if let Some(block) = current.take() {
                    push_connection(path, &mut connections, block)?;
                }
                current = Some((value.to_string(), None));
            } else if key.eq_ignore_ascii_case("url") {
                let Some((_, url)) = current.as_mut() else {
                    return Err(config_error(
                        path,
                        &format!("line {}: url before any urlid", number + 1),
                    ));
                };
                *url = Some(value.to_string());
            } else {
                debug!(key = %key, line = number + 1, "Ignoring configuration key");
            }
        }

        if let Some(block) = current.take() {
            push_connection(path, &mut connections, block)?;
        }
        if connections.is_empty() {
            return Err(config_error(path, "no connections defined"));
        }

        Ok(Self {
            path: path.to_path_buf(),
            connections,
        })
    }

    /// Returns the file the configuration was read from.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns every connection in file order.
    #[must_use]
    pub fn connections(&self) -> &[ConnectionConfig] {
        &self.connections
    }

    /// Returns the connection ids in file order.
    #[must_use]
    pub fn ids(&self) -> Vec<&str> {
        self.connections.iter().map(|c| c.id.as_str()).collect()
    }

    /// Looks up a connection by id.
    pub fn connection(&self, id: &str) -> Result<&ConnectionConfig> {
        self.connections
            .iter()
            .find(|c| c.id == id)
            .ok_or_else(|| BackupError::UnknownConnection(id.to_string()))
    }

    /// Returns the first connection of the file.
    #[must_use]
    pub fn first(&self) -> Option<&ConnectionConfig> {
        self.connections.first()
    }
}

fn push_connection(
    path: &Path,
    connections: &mut Vec<ConnectionConfig>,
    (id, url): (String, Option<String>),
) -> Result<()> {
    let Some(url) = url.filter(|u| !u.is_empty()) else {
        return Err(config_error(path, &format!("connection '{id}' has no url")));
    };
    if connections.iter().any(|c| c.id == id) {
        return Err(config_error(path, &format!("connection '{id}' is defined twice")));
    }
    connections.push(ConnectionConfig { id, url });
    Ok(())
}

fn config_error(path: &Path, message: &str) -> BackupError {
    BackupError::Config {
        path: path.to_path_buf(),
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
# connections
urlid main
url   sqlite:main.sqlite3
username sa

URLID archive
URL sqlite:archive.sqlite3
";

    #[test]
    fn test_parse_connections_in_file_order() {
        let config = ManagerConfig::parse("manager.conf", SAMPLE).unwrap();
        assert_eq!(config.ids(), vec!["main", "archive"]);
        assert_eq!(
            config.connection("archive").unwrap().url,
            "sqlite:archive.sqlite3"
        );
        assert_eq!(config.first().unwrap().id, "main");
    }

    #[test]
    fn test_unknown_connection() {
        let config = ManagerConfig::parse("manager.conf", SAMPLE).unwrap();
        assert!(matches!(
            config.connection("other"),
            Err(BackupError::UnknownConnection(id)) if id == "other"
        ));
    }

    #[test]
    fn test_invalid_files() {
        for content in [
            "",
            "# only comments\n",
            "urlid main\n",
            "url sqlite:x\n",
            "urlid a\nurl sqlite:a\nurlid a\nurl sqlite:b\n",
        ] {
            let err = ManagerConfig::parse("manager.conf", content).unwrap_err();
            assert!(matches!(err, BackupError::Config { .. }), "{content:?}");
        }
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = ManagerConfig::load(dir.path().join(DEFAULT_CONFIG_FILE)).unwrap_err();
        assert!(matches!(err, BackupError::Config { .. }));
    }

    #[test]
    fn test_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DEFAULT_CONFIG_FILE);
        fs::write(&path, SAMPLE).unwrap();

        let config = ManagerConfig::load(&path).unwrap();
        assert_eq!(config.path(), path);
        assert_eq!(config.connections().len(), 2);
    }
}
