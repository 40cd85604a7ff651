// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! The type cache.
//!
//! Maps each URL to one shared blob per kind. The first request creates
//! and loads the blob; later requests return the cached instance, so a
//! document used from many places is fetched and compiled once.

use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, trace};
use url::Url;
use weft_engine::{Diagnostic, TypeRegistry};

use crate::blob::{Blob, BlobHooks, BlobKind};
use crate::config::Config;
use crate::error::Result;
use crate::loader::{DataLoader, LoadMode};
use crate::manifest::{Manifest, ManifestData};
use crate::network::{HttpNetwork, NetworkAccess};
use crate::script::{self, ScriptData};
use crate::type_data::{self, TypeData};

/// Loads, caches and resolves documents, scripts and manifests.
pub struct TypeLoader {
    registry: Arc<TypeRegistry>,
    config: Config,
    data_loader: DataLoader,
    documents: DashMap<String, Arc<Blob>>,
    scripts: DashMap<String, Arc<Blob>>,
    manifests: DashMap<String, Arc<Blob>>,
}

impl TypeLoader {
    /// Creates a loader fetching remote URLs over HTTP.
    ///
    /// `registry` provides the native modules; it is usually
    /// [`weft_engine::Engine::registry`] of an initialized engine.
    pub fn new(registry: Arc<TypeRegistry>, config: Config) -> Result<Self> {
        let network = Arc::new(HttpNetwork::new(&config)?);
        Self::with_network(registry, config, network)
    }

    /// Creates a loader with a custom transport.
    pub fn with_network(
        registry: Arc<TypeRegistry>,
        config: Config,
        network: Arc<dyn NetworkAccess>,
    ) -> Result<Self> {
        let data_loader = DataLoader::new(&config, network)?;
        Ok(Self {
            registry,
            config,
            data_loader,
            documents: DashMap::new(),
            scripts: DashMap::new(),
            manifests: DashMap::new(),
        })
    }

    /// Native type registry.
    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    /// Active configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the cached document blob for `url`, creating and loading it
    /// on first request.
    pub fn get(&self, url: &Url, mode: LoadMode) -> Arc<Blob> {
        self.cached(&self.documents, url, mode, || BlobKind::Document(TypeData::new(mode)))
    }

    /// Creates an uncached document blob from inline data. `url` locates
    /// relative imports and names the document in diagnostics.
    pub fn get_with_data(&self, data: &[u8], url: &Url) -> Arc<Blob> {
        let blob = Blob::new(
            normalize(url),
            BlobKind::Document(TypeData::new(LoadMode::PreferSynchronous)),
        );
        self.data_loader.load_with_static_data(&blob, data, self);
        blob
    }

    /// Returns the cached script blob for `url`.
    pub fn get_script(&self, url: &Url) -> Arc<Blob> {
        self.script_with_mode(url, LoadMode::PreferSynchronous)
    }

    /// Returns the cached manifest blob for `url`.
    pub fn get_manifest(&self, url: &Url) -> Arc<Blob> {
        self.manifest_with_mode(url, LoadMode::PreferSynchronous)
    }

    pub(crate) fn script_with_mode(&self, url: &Url, mode: LoadMode) -> Arc<Blob> {
        self.cached(&self.scripts, url, mode, || BlobKind::Script(ScriptData::default()))
    }

    pub(crate) fn manifest_with_mode(&self, url: &Url, mode: LoadMode) -> Arc<Blob> {
        self.cached(&self.manifests, url, mode, || BlobKind::Manifest(ManifestData::default()))
    }

    /// Drops every cached blob. Blobs still referenced elsewhere stay
    /// alive until those references go.
    pub fn clear_cache(&self) {
        debug!(cached = self.cached_count(), "clearing type cache");
        self.documents.clear();
        self.scripts.clear();
        self.manifests.clear();
    }

    /// Number of cached blobs of every kind.
    pub fn cached_count(&self) -> usize {
        self.documents.len() + self.scripts.len() + self.manifests.len()
    }

    /// Delivers arrived results without blocking.
    pub fn process_events(&self) -> usize {
        self.data_loader.process_events(self)
    }

    /// Blocks until `blob` finishes.
    pub fn wait_for(&self, blob: &Arc<Blob>) {
        self.data_loader.wait_for(blob, self)
    }

    /// Stops the loader thread. Idempotent; also done on drop.
    pub fn shutdown(&mut self) {
        self.data_loader.shutdown();
    }

    fn cached(
        &self,
        cache: &DashMap<String, Arc<Blob>>,
        url: &Url,
        mode: LoadMode,
        kind: impl FnOnce() -> BlobKind,
    ) -> Arc<Blob> {
        let key = normalize(url);
        if let Some(blob) = cache.get(&key) {
            trace!(url = %key, "cache hit");
            return blob.value().clone();
        }
        let blob = Blob::new(key.clone(), kind());
        cache.insert(key, blob.clone());
        // Loading may complete inline and re-enter the cache, so no entry
        // guard may be held here.
        self.data_loader.load(&blob, mode, self);
        blob
    }
}

fn normalize(url: &Url) -> String {
    let mut url = url.clone();
    url.set_fragment(None);
    url.to_string()
}

impl BlobHooks for TypeLoader {
    fn data_received(&self, blob: &Arc<Blob>, data: &[u8]) {
        match blob.kind() {
            BlobKind::Document(payload) => type_data::data_received(self, blob, payload, data),
            BlobKind::Script(payload) => script::data_received(self, blob, payload, data),
            BlobKind::Manifest(payload) => manifest_received(self, blob, payload, data),
            BlobKind::Plain => {}
        }
    }

    fn all_dependencies_done(&self, blob: &Arc<Blob>) {
        if let BlobKind::Document(payload) = blob.kind() {
            type_data::all_dependencies_done(self, blob, payload);
        }
    }

    fn done(&self, blob: &Arc<Blob>) {
        match blob.kind() {
            BlobKind::Document(payload) => type_data::done(self, blob, payload),
            BlobKind::Script(payload) => script::done(self, blob, payload),
            BlobKind::Manifest(_) | BlobKind::Plain => {}
        }
    }

    fn download_progress_changed(&self, blob: &Arc<Blob>, progress: f64) {
        trace!(url = %blob.url(), progress, "download progress");
    }
}

fn manifest_received(loader: &TypeLoader, blob: &Arc<Blob>, payload: &ManifestData, data: &[u8]) {
    let url = blob.final_url();
    let Ok(base) = Url::parse(&url) else {
        blob.set_error(Diagnostic::error("Invalid null URL", 0, 0), loader);
        return;
    };
    let text = String::from_utf8_lossy(data);
    match Manifest::parse(&text, &base) {
        Ok(manifest) => payload.set_manifest(manifest),
        Err(errors) => {
            let errors = errors.into_iter().map(|e| e.with_url(url.as_str())).collect();
            blob.set_errors(errors, loader);
        }
    }
}
