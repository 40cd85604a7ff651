// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! The loader's I/O thread.
//!
//! A dedicated thread drives a current-thread `tokio` runtime. Requests
//! arrive over an unbounded `mpsc` channel and results go back to the
//! consuming thread over a `crossbeam` channel, so delivery is FIFO. A
//! synchronous request carries its own reply channel and the caller blocks
//! on it.

use bytes::Bytes;
use crossbeam::channel::{self, Receiver, Sender};
use std::path::Path;
use std::sync::Arc;
use std::thread::JoinHandle;
use tokio::sync::mpsc;
use tracing::{debug, error, trace, warn};
use url::Url;

use crate::error::{LoaderError, Result, TransportError};
use crate::network::{NetworkAccess, NetworkReply, ProgressFn};

/// Name of a directory manifest file.
pub const MANIFEST_FILE: &str = "weftdir";

/// Fetched bytes and the URL they finally came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fetched {
    /// Payload
    pub data: Bytes,
    /// URL after redirects
    pub final_url: Url,
}

type FetchResult = std::result::Result<Fetched, TransportError>;

enum Request {
    Fetch {
        id: u64,
        url: Url,
        reply: Option<Sender<FetchResult>>,
    },
    Stop,
}

/// Results delivered to the consuming thread.
#[derive(Debug)]
pub(crate) enum Event {
    Progress { id: u64, fraction: f64 },
    Finished { id: u64, result: FetchResult },
}

pub(crate) struct LoaderThread {
    requests: mpsc::UnboundedSender<Request>,
    events: Receiver<Event>,
    handle: Option<JoinHandle<()>>,
}

impl LoaderThread {
    pub(crate) fn spawn(network: Arc<dyn NetworkAccess>, max_redirects: u32) -> Result<Self> {
        let (requests, inbox) = mpsc::unbounded_channel();
        let (outbox, events) = channel::unbounded();
        let handle = std::thread::Builder::new()
            .name("weft-loader".into())
            .spawn(move || run(network, max_redirects, inbox, outbox))
            .map_err(LoaderError::Spawn)?;
        debug!("Loader thread started");
        Ok(Self {
            requests,
            events,
            handle: Some(handle),
        })
    }

    /// Queues an asynchronous fetch; the result arrives as an [`Event`].
    pub(crate) fn fetch(&self, id: u64, url: Url) -> bool {
        self.requests
            .send(Request::Fetch {
                id,
                url,
                reply: None,
            })
            .is_ok()
    }

    /// Fetches on the worker and blocks until it replies.
    pub(crate) fn fetch_blocking(&self, url: Url) -> FetchResult {
        let (reply, result) = channel::bounded(1);
        let request = Request::Fetch {
            id: 0,
            url,
            reply: Some(reply),
        };
        if self.requests.send(request).is_err() {
            return Err(TransportError::Other);
        }
        result.recv().unwrap_or(Err(TransportError::Other))
    }

    pub(crate) fn try_recv(&self) -> Option<Event> {
        self.events.try_recv().ok()
    }

    pub(crate) fn recv(&self) -> Option<Event> {
        self.events.recv().ok()
    }

    /// Stops the worker and joins it. Idempotent.
    pub(crate) fn shutdown(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        let _ = self.requests.send(Request::Stop);
        if handle.join().is_err() {
            warn!("Loader thread panicked");
        }
        debug!("Loader thread stopped");
    }

    #[cfg(test)]
    pub(crate) fn is_running(&self) -> bool {
        self.handle.is_some()
    }
}

impl Drop for LoaderThread {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run(
    network: Arc<dyn NetworkAccess>,
    max_redirects: u32,
    mut inbox: mpsc::UnboundedReceiver<Request>,
    outbox: Sender<Event>,
) {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to start loader runtime: {}", e);
            return;
        }
    };

    runtime.block_on(async move {
        while let Some(request) = inbox.recv().await {
            let (id, url, reply) = match request {
                Request::Stop => break,
                Request::Fetch { id, url, reply } => (id, url, reply),
            };
            let network = network.clone();
            let outbox = outbox.clone();
            tokio::spawn(async move {
                trace!(id, %url, "fetch started");
                let sink = outbox.clone();
                let report = move |received: u64, total: Option<u64>| {
                    if let Some(total) = total.filter(|t| *t > 0) {
                        let fraction = (received as f64 / total as f64).min(1.0);
                        let _ = sink.send(Event::Progress { id, fraction });
                    }
                };
                let result = fetch(network.as_ref(), url, max_redirects, &report).await;
                match reply {
                    Some(reply) => {
                        let _ = reply.send(result);
                    }
                    None => {
                        let _ = outbox.send(Event::Finished { id, result });
                    }
                }
            });
        }
    });
}

/// Fetches `url`, following redirects up to `max_redirects` times.
pub(crate) async fn fetch(
    network: &dyn NetworkAccess,
    url: Url,
    max_redirects: u32,
    progress: ProgressFn<'_>,
) -> FetchResult {
    if url.scheme() == "file" {
        return read_local(url).await;
    }
    let mut current = url;
    let mut redirects = 0;
    loop {
        match network.get(&current, progress).await? {
            NetworkReply::Data(data) => {
                return Ok(Fetched {
                    data,
                    final_url: current,
                });
            }
            NetworkReply::Redirect(target) => {
                redirects += 1;
                if redirects > max_redirects {
                    return Err(TransportError::TooManyRedirects);
                }
                current = target;
            }
        }
    }
}

async fn read_local(url: Url) -> FetchResult {
    let path = url.to_file_path().map_err(|_| TransportError::InvalidUrl)?;
    let metadata = tokio::fs::metadata(&path)
        .await
        .map_err(|e| TransportError::from_io(&e))?;
    let data = if metadata.is_dir() {
        list_directory(&path).await?
    } else {
        Bytes::from(tokio::fs::read(&path).await.map_err(|e| TransportError::from_io(&e))?)
    };
    Ok(Fetched {
        data,
        final_url: url,
    })
}

/// Synthesizes a manifest for a local directory: its `weftdir`, if any,
/// followed by one unversioned entry per `*.weft` file named like a type.
async fn list_directory(path: &Path) -> std::result::Result<Bytes, TransportError> {
    let mut listing = match tokio::fs::read_to_string(path.join(MANIFEST_FILE)).await {
        Ok(manifest) => manifest,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(TransportError::from_io(&e)),
    };
    if !listing.is_empty() && !listing.ends_with('\n') {
        listing.push('\n');
    }

    let mut entries = tokio::fs::read_dir(path)
        .await
        .map_err(|e| TransportError::from_io(&e))?;
    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(|e| TransportError::from_io(&e))? {
        let name = entry.file_name().to_string_lossy().into_owned();
        let Some(stem) = name.strip_suffix(".weft") else {
            continue;
        };
        if stem.starts_with(|c: char| c.is_ascii_uppercase()) {
            files.push((stem.to_string(), name));
        }
    }
    files.sort();
    for (stem, name) in files {
        listing.push_str(&format!("{} {}\n", stem, name));
    }
    Ok(Bytes::from(listing))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    /// Serves a fixed redirect chain: `/0` redirects to `/1` and so on,
    /// `/<len>` returns data.
    struct Chain {
        len: u32,
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl NetworkAccess for Chain {
        async fn get(&self, url: &Url, progress: ProgressFn<'_>) -> std::result::Result<NetworkReply, TransportError> {
            self.seen.lock().push(url.path().to_string());
            let step: u32 = url.path().trim_start_matches('/').parse().unwrap_or(0);
            if step < self.len {
                return Ok(NetworkReply::Redirect(url.join(&format!("/{}", step + 1)).unwrap()));
            }
            progress(4, Some(4));
            Ok(NetworkReply::Data(Bytes::from_static(b"done")))
        }
    }

    fn noop(_: u64, _: Option<u64>) {}

    #[tokio::test]
    async fn test_follows_redirects() {
        let chain = Chain {
            len: 3,
            seen: Mutex::new(Vec::new()),
        };
        let url = Url::parse("http://example.test/0").unwrap();
        let fetched = fetch(&chain, url, 16, &noop).await.unwrap();
        assert_eq!(fetched.data, Bytes::from_static(b"done"));
        assert_eq!(fetched.final_url.as_str(), "http://example.test/3");
        assert_eq!(chain.seen.lock().len(), 4);
    }

    #[tokio::test]
    async fn test_redirect_cap() {
        let chain = Chain {
            len: 100,
            seen: Mutex::new(Vec::new()),
        };
        let url = Url::parse("http://example.test/0").unwrap();
        assert_eq!(
            fetch(&chain, url.clone(), 16, &noop).await,
            Err(TransportError::TooManyRedirects)
        );
        assert_eq!(chain.seen.lock().len(), 17);
    }

    #[tokio::test]
    async fn test_local_files_and_directories() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Button.weft"), "Item {}").unwrap();
        std::fs::write(dir.path().join("helper.weft"), "Item {}").unwrap();
        std::fs::write(dir.path().join(MANIFEST_FILE), "module Controls").unwrap();
        let chain = Chain {
            len: 0,
            seen: Mutex::new(Vec::new()),
        };

        let file = Url::from_file_path(dir.path().join("Button.weft")).unwrap();
        let fetched = fetch(&chain, file, 16, &noop).await.unwrap();
        assert_eq!(fetched.data, Bytes::from_static(b"Item {}"));

        let directory = Url::from_directory_path(dir.path()).unwrap();
        let listing = fetch(&chain, directory, 16, &noop).await.unwrap();
        assert_eq!(listing.data, Bytes::from("module Controls\nButton Button.weft\n"));

        let missing = Url::from_file_path(dir.path().join("Missing.weft")).unwrap();
        assert_eq!(fetch(&chain, missing, 16, &noop).await, Err(TransportError::FileNotFound));
        assert!(chain.seen.lock().is_empty());
    }

    #[test]
    fn test_thread_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Main.weft");
        std::fs::write(&path, "Item {}").unwrap();
        let network = Arc::new(Chain {
            len: 1,
            seen: Mutex::new(Vec::new()),
        });
        let mut thread = LoaderThread::spawn(network, 16).unwrap();

        let url = Url::from_file_path(&path).unwrap();
        assert_eq!(thread.fetch_blocking(url).unwrap().data, Bytes::from_static(b"Item {}"));

        assert!(thread.fetch(7, Url::parse("http://example.test/0").unwrap()));
        let mut finished = None;
        while finished.is_none() {
            match thread.recv() {
                Some(Event::Finished { id, result }) => finished = Some((id, result)),
                Some(Event::Progress { id, fraction }) => {
                    assert_eq!(id, 7);
                    assert_eq!(fraction, 1.0);
                }
                None => break,
            }
        }
        let (id, result) = finished.unwrap();
        assert_eq!(id, 7);
        assert_eq!(result.unwrap().final_url.as_str(), "http://example.test/1");

        thread.shutdown();
        assert!(!thread.is_running());
        thread.shutdown();
    }
}
