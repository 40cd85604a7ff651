// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Resource loading.
//!
//! [`DataLoader`] turns a blob's URL into bytes. Local files requested with
//! [`LoadMode::PreferSynchronous`] are read on the worker while the caller
//! blocks, and delivered before `load` returns. Everything else is
//! asynchronous: the blob is flagged as such and its data arrives when the
//! consuming thread pumps [`DataLoader::process_events`] or
//! [`DataLoader::wait_for`].

use dashmap::DashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};
use url::Url;
use weft_engine::Diagnostic;

use crate::blob::{Blob, BlobHooks};
use crate::config::Config;
use crate::error::{Result, TransportError};
use crate::network::NetworkAccess;
use crate::thread::{Event, LoaderThread};

/// How the caller wants data delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadMode {
    /// Deliver local files before returning; remote data stays asynchronous
    #[default]
    PreferSynchronous,
    /// Always deliver through the event queue
    Asynchronous,
}

/// Fetches blob data on the loader thread.
pub struct DataLoader {
    thread: LoaderThread,
    pending: DashMap<u64, Arc<Blob>>,
    next_id: AtomicU64,
    synchronous_local: bool,
}

impl DataLoader {
    /// Starts the loader thread.
    pub fn new(config: &Config, network: Arc<dyn NetworkAccess>) -> Result<Self> {
        Ok(Self {
            thread: LoaderThread::spawn(network, config.max_redirects)?,
            pending: DashMap::new(),
            next_id: AtomicU64::new(1),
            synchronous_local: config.synchronous_local,
        })
    }

    /// Starts fetching the data of `blob`.
    pub fn load(&self, blob: &Arc<Blob>, mode: LoadMode, hooks: &dyn BlobHooks) {
        let url = match Url::parse(blob.url()) {
            Ok(url) => url,
            Err(_) => {
                blob.start_loading();
                blob.set_error(Diagnostic::error(TransportError::InvalidUrl.to_string(), 0, 0), hooks);
                return;
            }
        };
        blob.start_loading();

        let synchronous =
            mode == LoadMode::PreferSynchronous && self.synchronous_local && url.scheme() == "file";
        if synchronous {
            trace!(url = %url, "synchronous load");
            match self.thread.fetch_blocking(url) {
                Ok(fetched) => {
                    blob.set_final_url(fetched.final_url.as_str());
                    blob.set_data(&fetched.data, hooks);
                }
                Err(e) => blob.set_error(Diagnostic::error(e.to_string(), 0, 0), hooks),
            }
            return;
        }

        blob.set_async(true);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.pending.insert(id, blob.clone());
        if !self.thread.fetch(id, url) {
            self.pending.remove(&id);
            blob.set_error(Diagnostic::error(TransportError::Other.to_string(), 0, 0), hooks);
        }
    }

    /// Delivers `data` without any I/O.
    pub fn load_with_static_data(&self, blob: &Arc<Blob>, data: &[u8], hooks: &dyn BlobHooks) {
        blob.start_loading();
        blob.set_data(data, hooks);
    }

    /// Delivers every result that has arrived, without blocking. Returns
    /// the number of events handled.
    pub fn process_events(&self, hooks: &dyn BlobHooks) -> usize {
        let mut handled = 0;
        while let Some(event) = self.thread.try_recv() {
            self.dispatch(event, hooks);
            handled += 1;
        }
        handled
    }

    /// Blocks until `blob` finishes, delivering results as they arrive.
    ///
    /// Returns early if nothing is in flight that could finish it.
    pub fn wait_for(&self, blob: &Arc<Blob>, hooks: &dyn BlobHooks) {
        self.process_events(hooks);
        while !blob.is_complete_or_error() {
            if self.pending.is_empty() {
                debug!(url = %blob.url(), status = %blob.status(), "nothing in flight, giving up wait");
                return;
            }
            match self.thread.recv() {
                Some(event) => self.dispatch(event, hooks),
                None => return,
            }
        }
    }

    /// Number of asynchronous fetches in flight.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Stops the loader thread. Idempotent.
    pub fn shutdown(&mut self) {
        self.thread.shutdown();
        self.pending.clear();
    }

    fn dispatch(&self, event: Event, hooks: &dyn BlobHooks) {
        match event {
            Event::Progress { id, fraction } => {
                let blob = self.pending.get(&id).map(|entry| entry.value().clone());
                if let Some(blob) = blob {
                    blob.set_progress(fraction, hooks);
                }
            }
            Event::Finished { id, result } => {
                let Some((_, blob)) = self.pending.remove(&id) else {
                    return;
                };
                match result {
                    Ok(fetched) => {
                        blob.set_final_url(fetched.final_url.as_str());
                        blob.set_data(&fetched.data, hooks);
                    }
                    Err(e) => blob.set_error(Diagnostic::error(e.to_string(), 0, 0), hooks),
                }
            }
        }
    }
}

/// Interprets command-line style input as a URL, or as a path relative to
/// the working directory.
pub fn url_from_input(input: &str) -> std::result::Result<Url, TransportError> {
    if input.is_empty() {
        return Err(TransportError::InvalidUrl);
    }
    // Single-letter schemes are Windows drive letters.
    if let Ok(url) = Url::parse(input) {
        if url.scheme().len() > 1 {
            return Ok(url);
        }
    }
    let path = Path::new(input);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map_err(|e| TransportError::from_io(&e))?
            .join(path)
    };
    if absolute.is_dir() {
        Url::from_directory_path(&absolute)
    } else {
        Url::from_file_path(&absolute)
    }
    .map_err(|_| TransportError::InvalidUrl)
}
