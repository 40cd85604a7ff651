// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Loader configuration.
//!
//! Read from a TOML file, then overridden by `WEFT_IMPORT_PATH` (a list of
//! directories in the platform's path-list format) and `WEFT_MAX_REDIRECTS`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{LoaderError, Result};

/// Redirects followed before a fetch fails with "Too many redirects".
pub const DATALOADER_MAXIMUM_REDIRECT_RECURSION: u32 = 16;

/// Configuration for the loader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Module search roots
    pub import_paths: Vec<PathBuf>,

    /// Redirects followed per fetch
    pub max_redirects: u32,

    /// Network request timeout in seconds
    pub request_timeout_secs: u64,

    /// User agent for network requests
    pub user_agent: String,

    /// Read local files inline when the caller prefers synchronous loading
    pub synchronous_local: bool,

    /// Echo engine warnings through `tracing`
    pub output_warnings_to_stderr: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            import_paths: Vec::new(),
            max_redirects: DATALOADER_MAXIMUM_REDIRECT_RECURSION,
            request_timeout_secs: 30,
            user_agent: format!("weft/{}", env!("CARGO_PKG_VERSION")),
            synchronous_local: true,
            output_warnings_to_stderr: true,
        }
    }
}

impl Config {
    /// Loads `path` and applies environment overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| LoaderError::ConfigIo {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_toml_str(&content)?;
        config.apply_env()?;
        Ok(config)
    }

    /// Parses a TOML document. Missing keys keep their defaults.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Applies `WEFT_IMPORT_PATH` and `WEFT_MAX_REDIRECTS` from the process
    /// environment.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_overrides(|name| std::env::var_os(name))
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<std::ffi::OsString>) -> Result<()> {
        if let Some(paths) = var("WEFT_IMPORT_PATH") {
            // Environment paths take precedence over configured ones.
            let mut merged: Vec<PathBuf> = std::env::split_paths(&paths)
                .filter(|p| !p.as_os_str().is_empty())
                .collect();
            merged.append(&mut self.import_paths);
            self.import_paths = merged;
        }
        if let Some(value) = var("WEFT_MAX_REDIRECTS") {
            let value = value.to_string_lossy().into_owned();
            self.max_redirects = value.trim().parse().map_err(|_| LoaderError::Environment {
                name: "WEFT_MAX_REDIRECTS",
                value,
            })?;
        }
        Ok(())
    }

    /// Adds a module search root ahead of the configured ones.
    pub fn add_import_path(&mut self, path: impl Into<PathBuf>) {
        self.import_paths.insert(0, path.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsString;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.max_redirects, 16);
        assert_eq!(config.request_timeout_secs, 30);
        assert!(config.synchronous_local);
        assert!(config.user_agent.starts_with("weft/"));
    }

    #[test]
    fn test_from_toml() {
        let config = Config::from_toml_str(
            r#"
import_paths = ["/opt/weft/modules"]
max_redirects = 4
synchronous_local = false
"#,
        )
        .unwrap();
        assert_eq!(config.import_paths, vec![PathBuf::from("/opt/weft/modules")]);
        assert_eq!(config.max_redirects, 4);
        assert!(!config.synchronous_local);
        assert_eq!(config.request_timeout_secs, 30);
        assert!(Config::from_toml_str("max_redirects = \"many\"").is_err());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config {
            import_paths: vec![PathBuf::from("/configured")],
            ..Config::default()
        };
        let joined = std::env::join_paths(["/first", "/second"]).unwrap();
        config
            .apply_overrides(|name| match name {
                "WEFT_IMPORT_PATH" => Some(joined.clone()),
                "WEFT_MAX_REDIRECTS" => Some(OsString::from("3")),
                _ => None,
            })
            .unwrap();
        assert_eq!(
            config.import_paths,
            vec![
                PathBuf::from("/first"),
                PathBuf::from("/second"),
                PathBuf::from("/configured")
            ]
        );
        assert_eq!(config.max_redirects, 3);

        let err = config
            .apply_overrides(|name| (name == "WEFT_MAX_REDIRECTS").then(|| OsString::from("lots")))
            .unwrap_err();
        assert_eq!(err.to_string(), "Invalid value for WEFT_MAX_REDIRECTS: lots");
    }

    #[test]
    fn test_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("weft.toml");
        std::fs::write(&path, "request_timeout_secs = 5\n").unwrap();
        let config = Config::load(&path).unwrap();
        assert_eq!(config.request_timeout_secs, 5);
        assert!(matches!(
            Config::load(&dir.path().join("missing.toml")),
            Err(LoaderError::ConfigIo { .. })
        ));
    }
}
