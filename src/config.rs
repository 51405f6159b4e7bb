/*
 * slurpy - Arch User Repository search/download/update helper.
 * Copyright (C) 2025  slurpy contributors
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with this program.  If not, see <https://www.gnu.org/licenses/>.
 */

//! Configuration management with validation and defaults.

use clap::ValueEnum;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::{SlurpyError, SlurpyResult};

/// When to emit ANSI colors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ColorChoice {
    #[default]
    Auto,
    Always,
    Never,
}

impl ColorChoice {
    fn parse(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "auto" => Some(ColorChoice::Auto),
            "always" | "1" | "true" | "yes" => Some(ColorChoice::Always),
            "never" | "0" | "false" | "no" => Some(ColorChoice::Never),
            _ => None,
        }
    }
}

/// Ordering of search results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SortKey {
    #[default]
    Name,
    Votes,
    Popularity,
    Modified,
}

/// Main configuration structure for slurpy
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Colored output
    pub color: ColorChoice,

    /// Directory downloaded snapshots are extracted into
    pub save_to: PathBuf,

    /// Keep the .tar.gz after extraction
    pub keep_tarball: bool,

    /// Editor used for --edit (falls back to $VISUAL / $EDITOR)
    pub editor: Option<String>,

    /// Packages never reported by --update
    pub ignore: Vec<String>,

    /// Default ordering of search results
    pub sort: SortKey,

    /// AUR endpoint configuration
    pub aur: AurConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            color: ColorChoice::Auto,
            save_to: PathBuf::from("."),
            keep_tarball: false,
            editor: None,
            ignore: Vec::new(),
            sort: SortKey::Name,
            aur: AurConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// AUR endpoint configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AurConfig {
    /// Web root, prefixed to snapshot paths
    pub base_url: String,

    /// RPC endpoint
    pub rpc_url: String,

    /// Per-request timeout in seconds
    pub timeout_secs: u64,

    /// Minimum spacing between two RPC requests
    pub request_interval_ms: u64,

    /// Attempts after the first one for transient failures
    pub max_retries: u32,
}

impl Default for AurConfig {
    fn default() -> Self {
        Self {
            base_url: "https://aur.archlinux.org".to_string(),
            rpc_url: "https://aur.archlinux.org/rpc/".to_string(),
            timeout_secs: 30,
            request_interval_ms: 100,
            max_retries: 3,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log file path (empty = no file logging)
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            file: None,
        }
    }
}

impl Config {
    /// Load configuration from multiple sources with precedence:
    /// 1. /etc/slurpy/slurpy.toml (system-wide)
    /// 2. ~/.config/slurpy/config.toml (user), or `explicit` when given
    /// 3. Environment variables (SLURPY_*)
    pub fn load(explicit: Option<&Path>) -> SlurpyResult<Self> {
        let mut layers = Vec::new();

        let system_config = Path::new("/etc/slurpy/slurpy.toml");
        layers.extend(Self::read_optional(system_config));

        match explicit {
            Some(path) => layers.push(Self::read_file(path)?),
            None => {
                if let Some(user_config) = Self::user_config_path() {
                    layers.extend(Self::read_optional(&user_config));
                }
            }
        }

        let config = Self::from_layers(layers)?.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;

        Ok(config)
    }

    /// Per-user config location
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("slurpy").join("config.toml"))
    }

    /// Read a config file as a raw table, failing loudly. The file must
    /// also deserialize on its own so a bad value is pinned to its file.
    pub fn read_file(path: &Path) -> SlurpyResult<toml::Table> {
        let content = fs::read_to_string(path)
            .map_err(|e| SlurpyError::filesystem(path, "cannot read config file", e))?;
        let config_error = |e: toml::de::Error| SlurpyError::ConfigError {
            message: format!("{}: {}", path.display(), e),
        };
        Self::parse(&content).map_err(config_error)?;
        content.parse::<toml::Table>().map_err(config_error)
    }

    /// Read an implicit config file; a broken one is logged and skipped
    fn read_optional(path: &Path) -> Option<toml::Table> {
        if !path.exists() {
            return None;
        }
        match Self::read_file(path) {
            Ok(table) => {
                debug!(path = %path.display(), "loaded config file");
                Some(table)
            }
            Err(e) => {
                warn!("ignoring config file: {}", e);
                None
            }
        }
    }

    /// Parse TOML text into a config
    pub fn parse(content: &str) -> Result<Config, toml::de::Error> {
        toml::from_str::<Config>(content)
    }

    /// Overlay config tables in order and deserialize the result.
    /// Keys set in a later table win, even when set back to the default.
    pub fn from_layers(layers: Vec<toml::Table>) -> SlurpyResult<Config> {
        let mut merged = toml::Table::new();
        for layer in layers {
            overlay(&mut merged, layer);
        }
        toml::Value::Table(merged)
            .try_into::<Config>()
            .map_err(|e: toml::de::Error| SlurpyError::ConfigError { message: e.to_string() })
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(val) = lookup("SLURPY_SAVE_TO") {
            if !val.is_empty() {
                self.save_to = PathBuf::from(val);
            }
        }

        if let Some(val) = lookup("SLURPY_COLOR") {
            match ColorChoice::parse(&val) {
                Some(choice) => self.color = choice,
                None => warn!("ignoring invalid SLURPY_COLOR value '{}'", val),
            }
        }

        if let Some(val) = lookup("SLURPY_EDITOR") {
            if !val.is_empty() {
                self.editor = Some(val);
            }
        }

        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> SlurpyResult<()> {
        for (key, value) in [("aur.base_url", &self.aur.base_url), ("aur.rpc_url", &self.aur.rpc_url)] {
            url::Url::parse(value).map_err(|e| SlurpyError::ConfigError {
                message: format!("{} '{}' is not a valid URL: {}", key, value, e),
            })?;
        }
        if self.aur.timeout_secs == 0 {
            return Err(SlurpyError::ConfigError {
                message: "aur.timeout_secs must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Editor for PKGBUILD review: config, then $VISUAL, $EDITOR, vi
    pub fn resolve_editor(&self) -> String {
        self.editor
            .clone()
            .or_else(|| std::env::var("VISUAL").ok().filter(|v| !v.is_empty()))
            .or_else(|| std::env::var("EDITOR").ok().filter(|v| !v.is_empty()))
            .unwrap_or_else(|| "vi".to_string())
    }
}

/// Recursive table overlay; `ignore` lists accumulate across files
fn overlay(base: &mut toml::Table, other: toml::Table) {
    for (key, value) in other {
        match value {
            toml::Value::Table(nested) => {
                if let Some(toml::Value::Table(existing)) = base.get_mut(&key) {
                    overlay(existing, nested);
                    continue;
                }
                base.insert(key, toml::Value::Table(nested));
            }
            toml::Value::Array(items) if key == "ignore" => {
                if let Some(toml::Value::Array(existing)) = base.get_mut(&key) {
                    for item in items {
                        if !existing.contains(&item) {
                            existing.push(item);
                        }
                    }
                    continue;
                }
                base.insert(key, toml::Value::Array(items));
            }
            value => {
                base.insert(key, value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.color, ColorChoice::Auto);
        assert_eq!(config.save_to, PathBuf::from("."));
        assert_eq!(config.aur.rpc_url, "https://aur.archlinux.org/rpc/");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_partial_file() {
        let parsed = Config::parse(
            r#"
color = "never"
save_to = "/home/user/aur"
ignore = ["foo-git"]

[aur]
timeout_secs = 5
"#,
        )
        .unwrap();

        assert_eq!(parsed.color, ColorChoice::Never);
        assert_eq!(parsed.save_to, PathBuf::from("/home/user/aur"));
        assert_eq!(parsed.ignore, vec!["foo-git".to_string()]);
        assert_eq!(parsed.aur.timeout_secs, 5);
        // untouched keys keep their defaults
        assert_eq!(parsed.aur.max_retries, 3);
        assert_eq!(parsed.sort, SortKey::Name);
    }

    #[test]
    fn test_parse_rejects_unknown_sort() {
        assert!(Config::parse("sort = \"size\"").is_err());
    }

    fn table(content: &str) -> toml::Table {
        content.parse().unwrap()
    }

    #[test]
    fn test_merge_precedence() {
        let system = table("save_to = \"/srv/aur\"\nignore = [\"a\"]");
        let user = table("color = \"always\"\nignore = [\"b\", \"a\"]");

        let merged = Config::from_layers(vec![system, user]).unwrap();
        assert_eq!(merged.save_to, PathBuf::from("/srv/aur"));
        assert_eq!(merged.color, ColorChoice::Always);
        assert_eq!(merged.ignore, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_later_file_can_restore_default() {
        let system = table(
            "keep_tarball = true\ncolor = \"never\"\n[aur]\nmax_retries = 7\ntimeout_secs = 10\n[logging]\nlevel = \"debug\"",
        );
        let user = table(
            "keep_tarball = false\ncolor = \"auto\"\n[aur]\nmax_retries = 3\n[logging]\nlevel = \"warn\"",
        );

        let merged = Config::from_layers(vec![system, user]).unwrap();
        assert!(!merged.keep_tarball);
        assert_eq!(merged.color, ColorChoice::Auto);
        assert_eq!(merged.aur.max_retries, 3);
        assert_eq!(merged.logging.level, "warn");
        // keys the user file leaves alone keep the system value
        assert_eq!(merged.aur.timeout_secs, 10);
    }

    #[test]
    fn test_no_layers_is_default() {
        let config = Config::from_layers(Vec::new()).unwrap();
        assert_eq!(config.aur.max_retries, 3);
        assert_eq!(config.save_to, PathBuf::from("."));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("SLURPY_SAVE_TO", "/tmp/builds"),
            ("SLURPY_COLOR", "never"),
            ("SLURPY_EDITOR", "nano"),
        ]
        .into_iter()
        .collect();

        let config = Config::default().apply_env_overrides(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(config.save_to, PathBuf::from("/tmp/builds"));
        assert_eq!(config.color, ColorChoice::Never);
        assert_eq!(config.editor.as_deref(), Some("nano"));
        assert_eq!(config.resolve_editor(), "nano");
    }

    #[test]
    fn test_invalid_env_color_is_ignored() {
        let config = Config::default().apply_env_overrides(|k| {
            (k == "SLURPY_COLOR").then(|| "purple".to_string())
        });
        assert_eq!(config.color, ColorChoice::Auto);
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        config.aur.rpc_url = "not a url".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.aur.timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_read_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "color = [").unwrap();
        assert!(matches!(Config::read_file(&path), Err(SlurpyError::ConfigError { .. })));

        fs::write(&path, "sort = \"size\"").unwrap();
        assert!(matches!(Config::read_file(&path), Err(SlurpyError::ConfigError { .. })));

        let missing = dir.path().join("missing.toml");
        assert!(matches!(Config::read_file(&missing), Err(SlurpyError::FileSystem { .. })));
    }
}
