use std::{
    fs,
    path::{Path, PathBuf},
};

use color_eyre::Result;
use dirs::config_dir;
use serde::{Deserialize, Serialize};

/// Where the CLI keeps its store. Read from `sealed-prefs/config.toml` under
/// the platform config directory. Key-store parameters are not configurable.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct Config {
    /// Override for the directory holding store files.
    pub data_dir: Option<PathBuf>,
    /// Store file name without extension (defaults to `prefs`).
    pub store_name: Option<String>,
}

impl Config {
    pub fn store_name(&self) -> &str {
        self.store_name.as_deref().unwrap_or("prefs")
    }
}

pub fn load() -> Result<Config> {
    default_path().and_then(load_from_path)
}

/// Parse the TOML file at `path`. An absent or blank file yields `Config::default()`.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<Config> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(Config::default());
    }
    let contents = fs::read_to_string(path)?;
    if contents.trim().is_empty() {
        return Ok(Config::default());
    }
    let cfg: Config = toml::from_str(&contents)?;
    Ok(cfg)
}

/// `<config dir>/sealed-prefs/config.toml`, e.g. `~/.config` on Linux.
pub fn default_path() -> Result<PathBuf> {
    let base = config_dir().ok_or_else(|| color_eyre::eyre::eyre!("no config dir available"))?;
    Ok(base.join("sealed-prefs").join("config.toml"))
}

/// Used by `config init`. An existing file is left untouched and its path returned.
pub fn write_default_if_missing(config: &Config) -> Result<PathBuf> {
    write_if_missing(config, &default_path()?)
}

fn write_if_missing(config: &Config, path: &Path) -> Result<PathBuf> {
    if path.exists() {
        return Ok(path.to_path_buf());
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let body = toml::to_string_pretty(config)?;
    fs::write(path, body)?;
    Ok(path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn returns_default_when_missing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cfg = load_from_path(dir.path().join("config.toml")).expect("load");
        assert_eq!(cfg, Config::default());
        assert_eq!(cfg.store_name(), "prefs");
    }

    #[test]
    fn parses_custom_config() {
        let contents = r#"
            data_dir = "/tmp/sealed-prefs-data"
            store_name = "work"
        "#;
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        fs::write(&path, contents).expect("write temp config");

        let cfg = load_from_path(&path).expect("load");
        assert_eq!(
            cfg,
            Config {
                data_dir: Some(PathBuf::from("/tmp/sealed-prefs-data")),
                store_name: Some("work".into()),
            }
        );
        assert_eq!(cfg.store_name(), "work");
    }

    #[test]
    fn blank_file_yields_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        fs::write(&path, "\n   \n").expect("write temp config");
        assert_eq!(load_from_path(&path).expect("load"), Config::default());
    }

    #[test]
    fn rejects_mistyped_fields() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        fs::write(&path, "store_name = 5").expect("write temp config");
        assert!(load_from_path(&path).is_err());
    }

    #[test]
    fn write_creates_file_once() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("config.toml");
        let cfg = Config {
            data_dir: Some(PathBuf::from("/tmp/sealed-prefs-data")),
            store_name: None,
        };

        write_if_missing(&cfg, &path).expect("write should succeed");
        let other = Config {
            data_dir: None,
            store_name: Some("other".into()),
        };
        let second = write_if_missing(&other, &path).expect("second write ok");
        assert_eq!(second, path);

        let loaded = load_from_path(&path).expect("load");
        assert_eq!(loaded, cfg);
    }
}
