// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Import resolution for loaded documents.
//!
//! Import statements become [`PendingImport`]s while their manifests and
//! scripts load; once those finish they are folded into an [`ImportSet`]
//! the compiler's type resolution runs against.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use url::Url;
use weft_engine::ast::Version;
use weft_engine::compiler::{ImportEntry, ImportSet, ImportSource};
use weft_engine::Diagnostic;

use crate::blob::{Blob, BlobKind};
use crate::thread::MANIFEST_FILE;

/// An import whose data may still be loading.
#[derive(Debug)]
pub(crate) enum PendingImport {
    /// A module of native types
    Module {
        qualifier: Option<String>,
        uri: String,
        version: Version,
    },
    /// A module found as a manifest under an import path
    Manifest {
        qualifier: Option<String>,
        uri: String,
        version: Version,
        blob: Arc<Blob>,
        line: u32,
        column: u32,
    },
    /// A directory of documents
    Directory {
        qualifier: Option<String>,
        location: String,
        blob: Arc<Blob>,
        implicit: bool,
        line: u32,
        column: u32,
    },
    /// A script namespace
    Script {
        qualifier: String,
        blob: Arc<Blob>,
        line: u32,
        column: u32,
    },
}

/// A script a module manifest exports to its importer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ExportedScript {
    pub qualifier: String,
    pub url: String,
    pub line: u32,
    pub column: u32,
}

/// Finds `<root>/Foo/Bar/weftdir` for module `Foo.Bar` under the first
/// import path that has one.
pub fn module_manifest(import_paths: &[PathBuf], uri: &str) -> Option<Url> {
    let relative: PathBuf = uri.split('.').collect();
    import_paths
        .iter()
        .map(|root| root.join(&relative).join(MANIFEST_FILE))
        .find(|path| path.is_file())
        .and_then(|path| absolute_file_url(&path))
}

fn absolute_file_url(path: &Path) -> Option<Url> {
    if path.is_absolute() {
        return Url::from_file_path(path).ok();
    }
    let cwd = std::env::current_dir().ok()?;
    Url::from_file_path(cwd.join(path)).ok()
}

/// Resolves a directory import against the importing document.
pub fn directory_url(base: &Url, path: &str) -> Option<Url> {
    let mut relative = path.to_string();
    if !relative.ends_with('/') {
        relative.push('/');
    }
    base.join(&relative).ok()
}

/// The directory containing a document, for its implicit import.
pub fn own_directory(url: &Url) -> Option<Url> {
    match url.scheme() {
        "file" | "http" | "https" => url.join("./").ok(),
        _ => None,
    }
}

/// Where the listing of a directory comes from: local directories are
/// listed, remote ones must publish a manifest.
pub fn listing_url(directory: &Url) -> Option<Url> {
    if directory.scheme() == "file" {
        Some(directory.clone())
    } else {
        directory.join(MANIFEST_FILE).ok()
    }
}

fn manifest_of(blob: &Blob) -> Option<Arc<crate::manifest::Manifest>> {
    match blob.kind() {
        BlobKind::Manifest(data) if blob.is_complete() => data.manifest(),
        _ => None,
    }
}

/// Builds the import set once every manifest has finished.
///
/// Returns the set, the scripts unqualified module imports export, and the
/// errors found, located in the importing document `url`.
pub(crate) fn build_import_set(
    imports: &[PendingImport],
    url: &str,
) -> (ImportSet, Vec<ExportedScript>, Vec<Diagnostic>) {
    let mut set = ImportSet::new();
    let mut scripts: Vec<ExportedScript> = Vec::new();
    let mut errors = Vec::new();
    let error = |message: String, line: u32, column: u32| Diagnostic::error(message, line, column).with_url(url);

    for import in imports {
        match import {
            PendingImport::Module {
                qualifier,
                uri,
                version,
            } => set.add(ImportEntry {
                qualifier: qualifier.clone(),
                source: ImportSource::Module {
                    uri: uri.clone(),
                    version: *version,
                },
                implicit: false,
            }),
            PendingImport::Manifest {
                qualifier,
                uri,
                version,
                blob,
                line,
                column,
            } => {
                let Some(manifest) = manifest_of(blob) else {
                    errors.push(error(format!("module \"{}\" is not installed", uri), *line, *column));
                    errors.extend(blob.errors());
                    continue;
                };
                if !manifest.provides(*version) {
                    errors.push(error(
                        format!("module \"{}\" version {} is not installed", uri, version),
                        *line,
                        *column,
                    ));
                    continue;
                }
                if qualifier.is_none() {
                    for script in &manifest.scripts {
                        if script.version.major != version.major || script.version.minor > version.minor {
                            continue;
                        }
                        // Later entries with the same qualifier override earlier ones.
                        scripts.retain(|s| s.qualifier != script.qualifier);
                        scripts.push(ExportedScript {
                            qualifier: script.qualifier.clone(),
                            url: script.url.clone(),
                            line: *line,
                            column: *column,
                        });
                    }
                }
                set.add(ImportEntry {
                    qualifier: qualifier.clone(),
                    source: ImportSource::Listing {
                        location: uri.clone(),
                        version: Some(*version),
                        types: manifest.types.clone(),
                    },
                    implicit: false,
                });
            }
            PendingImport::Directory {
                qualifier,
                location,
                blob,
                implicit,
                line,
                column,
            } => match manifest_of(blob) {
                Some(manifest) => set.add(ImportEntry {
                    qualifier: qualifier.clone(),
                    source: ImportSource::Listing {
                        location: location.clone(),
                        version: None,
                        types: manifest.types.clone(),
                    },
                    implicit: *implicit,
                }),
                // A document's own directory need not be listable.
                None if *implicit => {}
                None => errors.push(error(format!("\"{}\": no such directory", location), *line, *column)),
            },
            PendingImport::Script { qualifier, .. } => set.add_script_namespace(qualifier.clone()),
        }
    }
    for script in &scripts {
        set.add_script_namespace(script.qualifier.clone());
    }
    (set, scripts, errors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::NoHooks;
    use crate::manifest::{Manifest, ManifestData};
    use weft_engine::ast::TypeName;
    use weft_engine::compiler::TypeResolution;
    use weft_engine::TypeRegistry;

    fn manifest_blob(url: &str, text: &str) -> Arc<Blob> {
        let blob = Blob::new(url, BlobKind::Manifest(ManifestData::default()));
        if let BlobKind::Manifest(data) = blob.kind() {
            data.set_manifest(Manifest::parse(text, &Url::parse(url).unwrap()).unwrap());
        }
        blob.start_loading();
        blob.set_data(b"", &NoHooks);
        blob
    }

    fn failed_blob(url: &str) -> Arc<Blob> {
        let blob = Blob::new(url, BlobKind::Manifest(ManifestData::default()));
        blob.start_loading();
        blob.set_error(Diagnostic::error("File not found", 0, 0), &NoHooks);
        blob
    }

    fn name(text: &str) -> TypeName {
        TypeName {
            qualifier: None,
            name: text.into(),
        }
    }

    #[test]
    fn test_urls() {
        let doc = Url::parse("file:///app/views/Main.weft").unwrap();
        assert_eq!(directory_url(&doc, "../controls").unwrap().as_str(), "file:///app/controls/");
        assert_eq!(own_directory(&doc).unwrap().as_str(), "file:///app/views/");
        assert_eq!(listing_url(&own_directory(&doc).unwrap()).unwrap().as_str(), "file:///app/views/");
        let remote = Url::parse("https://example.test/ui/").unwrap();
        assert_eq!(listing_url(&remote).unwrap().as_str(), "https://example.test/ui/weftdir");
        assert!(own_directory(&Url::parse("inline:doc").unwrap()).is_none());
    }

    #[test]
    fn test_module_manifest_lookup() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        let module = second.path().join("Acme").join("Widgets");
        std::fs::create_dir_all(&module).unwrap();
        std::fs::write(module.join(MANIFEST_FILE), "Knob 1.0 Knob.weft\n").unwrap();
        let roots = vec![first.path().to_path_buf(), second.path().to_path_buf()];
        let url = module_manifest(&roots, "Acme.Widgets").unwrap();
        assert!(url.path().ends_with("/Acme/Widgets/weftdir"));
        assert!(module_manifest(&roots, "Acme.Gadgets").is_none());
    }

    #[test]
    fn test_build_import_set() {
        let registry = TypeRegistry::new();
        let imports = vec![
            PendingImport::Manifest {
                qualifier: None,
                uri: "Acme.Widgets".into(),
                version: Version::new(1, 0),
                blob: manifest_blob(
                    "file:///mods/Acme/Widgets/weftdir",
                    "Knob 1.0 Knob.weft\nTheme 1.0 theme.js\nTheme 1.1 theme11.js\n",
                ),
                line: 1,
                column: 1,
            },
            PendingImport::Directory {
                qualifier: None,
                location: "file:///app/".into(),
                blob: failed_blob("file:///app/"),
                implicit: true,
                line: 0,
                column: 0,
            },
            PendingImport::Directory {
                qualifier: Some("C".into()),
                location: "controls".into(),
                blob: failed_blob("file:///app/controls/"),
                implicit: false,
                line: 3,
                column: 1,
            },
        ];
        let (set, scripts, errors) = build_import_set(&imports, "file:///app/Main.weft");
        assert!(matches!(
            set.resolve(&name("Knob"), &registry),
            Ok(TypeResolution::Document(url)) if url == "file:///mods/Acme/Widgets/Knob.weft"
        ));
        assert_eq!(scripts.len(), 1);
        assert_eq!(scripts[0].url, "file:///mods/Acme/Widgets/theme.js");
        assert!(set.is_namespace("Theme"));
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].to_string(), "file:///app/Main.weft:3:1: \"controls\": no such directory");
    }

    #[test]
    fn test_manifest_version_check() {
        let imports = vec![PendingImport::Manifest {
            qualifier: None,
            uri: "Acme.Widgets".into(),
            version: Version::new(2, 0),
            blob: manifest_blob("file:///mods/Acme/Widgets/weftdir", "Knob 1.0 Knob.weft\n"),
            line: 2,
            column: 1,
        }];
        let (_, _, errors) = build_import_set(&imports, "file:///Main.weft");
        assert_eq!(errors[0].message, "module \"Acme.Widgets\" version 2.0 is not installed");

        let imports = vec![PendingImport::Manifest {
            qualifier: None,
            uri: "Acme.Gone".into(),
            version: Version::new(1, 0),
            blob: failed_blob("file:///mods/Acme/Gone/weftdir"),
            line: 2,
            column: 1,
        }];
        let (_, _, errors) = build_import_set(&imports, "file:///Main.weft");
        assert_eq!(errors[0].message, "module \"Acme.Gone\" is not installed");
        assert_eq!(errors[1].message, "File not found");
    }
}
