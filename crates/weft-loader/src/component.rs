// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! A loaded document ready for instantiation.

use std::sync::Arc;
use url::Url;
use weft_engine::{CompiledUnit, ContextId, Diagnostic, Engine, ObjectId};

use crate::blob::{Blob, Status};
use crate::error::{LoaderError, Result};
use crate::loader::LoadMode;
use crate::type_data::compiled_unit_of;
use crate::type_loader::TypeLoader;

/// Handle to a document blob.
///
/// ```no_run
/// use weft_engine::Engine;
/// use weft_loader::{Component, Config, LoadMode, TypeLoader};
///
/// let mut engine = Engine::new();
/// engine.initialize();
/// let loader = TypeLoader::new(engine.registry().clone(), Config::default()).unwrap();
/// let url = url::Url::parse("file:///app/Main.weft").unwrap();
/// let component = Component::load(&loader, &url, LoadMode::PreferSynchronous);
/// component.wait(&loader).unwrap();
/// let root = component.create(&mut engine).unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct Component {
    blob: Arc<Blob>,
}

impl Component {
    /// Requests the document at `url` through the type cache.
    pub fn load(loader: &TypeLoader, url: &Url, mode: LoadMode) -> Self {
        Self {
            blob: loader.get(url, mode),
        }
    }

    /// Compiles inline document text; `url` locates its imports.
    pub fn from_data(loader: &TypeLoader, data: &[u8], url: &Url) -> Self {
        Self {
            blob: loader.get_with_data(data, url),
        }
    }

    /// URL the document was requested with.
    pub fn url(&self) -> &str {
        self.blob.url()
    }

    /// Load status.
    pub fn status(&self) -> Status {
        self.blob.status()
    }

    /// Whether the document compiled.
    pub fn is_ready(&self) -> bool {
        self.blob.is_complete()
    }

    /// Whether the document or a dependency is still in flight.
    pub fn is_loading(&self) -> bool {
        !self.blob.is_complete_or_error()
    }

    /// Whether loading failed.
    pub fn is_error(&self) -> bool {
        self.blob.is_error()
    }

    /// Download progress in `[0, 1]`.
    pub fn progress(&self) -> f64 {
        self.blob.progress()
    }

    /// Errors of a failed load.
    pub fn errors(&self) -> Vec<Diagnostic> {
        self.blob.errors()
    }

    /// The underlying blob.
    pub fn blob(&self) -> &Arc<Blob> {
        &self.blob
    }

    /// Blocks until the document is compiled or has failed.
    pub fn wait(&self, loader: &TypeLoader) -> Result<Arc<CompiledUnit>> {
        loader.wait_for(&self.blob);
        self.compiled_unit()
    }

    /// The compiled document, without waiting.
    pub fn compiled_unit(&self) -> Result<Arc<CompiledUnit>> {
        if self.blob.is_error() {
            return Err(LoaderError::Load(self.blob.errors()));
        }
        compiled_unit_of(&self.blob).ok_or(LoaderError::NotReady)
    }

    /// Instantiates the document in the root context of `engine`.
    pub fn create(&self, engine: &mut Engine) -> Result<ObjectId> {
        let unit = self.compiled_unit()?;
        Ok(engine.create(&unit)?)
    }

    /// Instantiates the document in a child of `context`.
    pub fn create_in_context(&self, engine: &mut Engine, context: ContextId) -> Result<ObjectId> {
        let unit = self.compiled_unit()?;
        Ok(engine.create_in_context(&unit, context)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::error::TransportError;
    use crate::network::{NetworkAccess, NetworkReply, ProgressFn};
    use async_trait::async_trait;

    struct Offline;

    #[async_trait]
    impl NetworkAccess for Offline {
        async fn get(&self, _url: &Url, _progress: ProgressFn<'_>) -> std::result::Result<NetworkReply, TransportError> {
            Err(TransportError::HostNotFound)
        }
    }

    fn setup() -> (Engine, TypeLoader) {
        let mut engine = Engine::new();
        engine.initialize();
        let loader =
            TypeLoader::with_network(engine.registry().clone(), Config::default(), Arc::new(Offline)).unwrap();
        (engine, loader)
    }

    #[test]
    fn test_inline_component() {
        let (mut engine, loader) = setup();
        let url = Url::parse("inline:Main.weft").unwrap();
        let component = Component::from_data(&loader, b"import Weft 1.0\nItem { width: 4 }", &url);
        assert!(component.is_ready());
        assert_eq!(component.progress(), 1.0);
        let root = component.create(&mut engine).unwrap();
        assert_eq!(engine.property(root, "width").unwrap(), weft_engine::Value::from(4.0));
    }

    #[test]
    fn test_failed_component() {
        let (mut engine, loader) = setup();
        let url = Url::parse("https://unreachable.test/Main.weft").unwrap();
        let component = Component::load(&loader, &url, LoadMode::PreferSynchronous);
        assert!(component.is_loading());
        let err = component.wait(&loader).unwrap_err();
        assert_eq!(err.to_string(), "https://unreachable.test/Main.weft: Host not found");
        assert!(component.is_error());
        assert!(matches!(component.create(&mut engine), Err(LoaderError::Load(_))));
    }
}
