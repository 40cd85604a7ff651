// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Directory manifests (`weftdir`).
//!
//! ```text
//! # comment
//! module Weft.Controls
//! Button 1.0 Button.weft
//! Button 1.1 Button11.weft
//! internal Helper Helper.weft
//! Style 1.0 style.js
//! Slider Slider.weft
//! ```
//!
//! The last form, without a version, is what the loader synthesizes for
//! the files of a local directory.

use parking_lot::Mutex;
use std::sync::Arc;
use url::Url;
use weft_engine::ast::Version;
use weft_engine::compiler::ListedType;
use weft_engine::Diagnostic;

/// A script exported by a manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListedScript {
    /// Qualifier the script is imported as
    pub qualifier: String,
    /// Version it was introduced in
    pub version: Version,
    /// Script location
    pub url: String,
}

/// A parsed manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    /// `module` line, if any
    pub module: Option<String>,
    /// Listed document types
    pub types: Vec<ListedType>,
    /// Listed scripts
    pub scripts: Vec<ListedScript>,
}

impl Manifest {
    /// Parses `text`, resolving file names against `base`.
    pub fn parse(text: &str, base: &Url) -> Result<Manifest, Vec<Diagnostic>> {
        let mut manifest = Manifest::default();
        let mut errors = Vec::new();
        for (index, raw) in text.lines().enumerate() {
            let line = raw.split('#').next().unwrap_or_default().trim();
            if line.is_empty() {
                continue;
            }
            let error = |message: String| Diagnostic::error(message, index as u32 + 1, 1);
            let fields: Vec<&str> = line.split_whitespace().collect();
            let resolve = |file: &str| base.join(file).map(|u| u.to_string());

            match fields.as_slice() {
                ["module", uri] => {
                    if manifest.module.is_some() {
                        errors.push(error("only one module line is allowed".to_string()));
                    }
                    manifest.module = Some(uri.to_string());
                }
                ["internal", name, file] => match resolve(file) {
                    Ok(url) => manifest.types.push(ListedType {
                        name: name.to_string(),
                        version: None,
                        url,
                        internal: true,
                    }),
                    Err(_) => errors.push(error(format!("invalid file name \"{}\"", file))),
                },
                [name, file] => match resolve(file) {
                    Ok(url) => manifest.types.push(ListedType {
                        name: name.to_string(),
                        version: None,
                        url,
                        internal: false,
                    }),
                    Err(_) => errors.push(error(format!("invalid file name \"{}\"", file))),
                },
                [name, version, file] => {
                    let Some(version) = Version::parse(version) else {
                        errors.push(error(format!("invalid version {}", version)));
                        continue;
                    };
                    let Ok(url) = resolve(file) else {
                        errors.push(error(format!("invalid file name \"{}\"", file)));
                        continue;
                    };
                    if file.ends_with(".js") {
                        manifest.scripts.push(ListedScript {
                            qualifier: name.to_string(),
                            version,
                            url,
                        });
                    } else {
                        manifest.types.push(ListedType {
                            name: name.to_string(),
                            version: Some(version),
                            url,
                            internal: false,
                        });
                    }
                }
                _ => errors.push(error(format!("unexpected manifest line \"{}\"", line))),
            }
        }
        if errors.is_empty() {
            Ok(manifest)
        } else {
            Err(errors)
        }
    }

    /// Whether the manifest provides anything for `version`: some entry
    /// with the same major version introduced at or before its minor
    /// version. Unversioned manifests accept every version.
    pub fn provides(&self, version: Version) -> bool {
        let mut versions = self
            .types
            .iter()
            .filter_map(|t| t.version)
            .chain(self.scripts.iter().map(|s| s.version))
            .peekable();
        if versions.peek().is_none() {
            return true;
        }
        versions.any(|v| v.major == version.major && v.minor <= version.minor)
    }
}

/// Manifest blob payload.
#[derive(Debug, Default)]
pub struct ManifestData {
    manifest: Mutex<Option<Arc<Manifest>>>,
}

impl ManifestData {
    /// The parsed manifest, once loaded.
    pub fn manifest(&self) -> Option<Arc<Manifest>> {
        self.manifest.lock().clone()
    }

    pub(crate) fn set_manifest(&self, manifest: Manifest) {
        *self.manifest.lock() = Some(Arc::new(manifest));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("file:///modules/Weft/Controls/weftdir").unwrap()
    }

    #[test]
    fn test_parse_manifest() {
        let manifest = Manifest::parse(
            "# controls\nmodule Weft.Controls\nButton 1.0 Button.weft\ninternal Helper Helper.weft\nStyle 1.1 style.js\nSlider Slider.weft\n",
            &base(),
        )
        .unwrap();
        assert_eq!(manifest.module.as_deref(), Some("Weft.Controls"));
        assert_eq!(manifest.types.len(), 3);
        assert_eq!(manifest.types[0].url, "file:///modules/Weft/Controls/Button.weft");
        assert_eq!(manifest.types[0].version, Some(Version::new(1, 0)));
        assert!(manifest.types[1].internal);
        assert_eq!(manifest.types[2].version, None);
        assert_eq!(manifest.scripts[0].qualifier, "Style");
        assert_eq!(manifest.scripts[0].url, "file:///modules/Weft/Controls/style.js");
    }

    #[test]
    fn test_parse_errors_carry_lines() {
        let errors = Manifest::parse("module A\nButton x.y Button.weft\none two three four\n", &base()).unwrap_err();
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].line, 2);
        assert_eq!(errors[0].message, "invalid version x.y");
        assert_eq!(errors[1].line, 3);
    }

    #[test]
    fn test_provides() {
        let manifest = Manifest::parse("Button 1.2 Button.weft\nKnob 2.0 Knob.weft\n", &base()).unwrap();
        assert!(manifest.provides(Version::new(1, 3)));
        assert!(!manifest.provides(Version::new(1, 1)));
        assert!(manifest.provides(Version::new(2, 0)));
        assert!(!manifest.provides(Version::new(3, 0)));
        assert!(Manifest::default().provides(Version::new(9, 9)));
    }
}
