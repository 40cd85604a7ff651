// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Dependency blobs.
//!
//! A [`Blob`] is one loadable resource with explicit dependency edges to
//! other blobs. It moves through
//!
//! ```text
//! Null -> Loading -> WaitingForDependencies -> Complete | Error
//! ```
//!
//! and finishes only after every blob it waits on has finished. Kind
//! specific behavior lives behind [`BlobHooks`], which the type loader
//! implements; the state machine here only sequences the hooks.
//!
//! Blobs are shared between the type cache and their dependents through
//! `Arc`. Only the consuming thread drives them.

use parking_lot::Mutex;
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::{debug, trace};
use weft_engine::Diagnostic;

use crate::manifest::ManifestData;
use crate::script::ScriptData;
use crate::type_data::TypeData;

/// Where a blob is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Created, not yet requested
    Null,
    /// Bytes are being fetched
    Loading,
    /// Bytes arrived; dependencies are outstanding
    WaitingForDependencies,
    /// Finished successfully
    Complete,
    /// Finished with errors
    Error,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Status::Null => "Null",
            Status::Loading => "Loading",
            Status::WaitingForDependencies => "WaitingForDependencies",
            Status::Complete => "Complete",
            Status::Error => "Error",
        };
        f.write_str(name)
    }
}

/// What a blob holds once loaded.
#[derive(Debug)]
pub enum BlobKind {
    /// A component document
    Document(TypeData),
    /// An imported script
    Script(ScriptData),
    /// A directory manifest or listing
    Manifest(ManifestData),
    /// Raw bytes with no parsing
    Plain,
}

/// Kind specific reactions to state changes.
///
/// Every method has an empty default. Implementations may call back into
/// the blob (`add_dependency`, `set_error`) from any hook.
pub trait BlobHooks {
    /// The payload arrived. Parse it and register dependencies here.
    fn data_received(&self, _blob: &Arc<Blob>, _data: &[u8]) {}

    /// The wait set became empty. May add further dependencies.
    fn all_dependencies_done(&self, _blob: &Arc<Blob>) {}

    /// The blob is finishing; `set_error` is still honored.
    fn done(&self, _blob: &Arc<Blob>) {}

    /// A dependency finished with errors.
    fn dependency_error(&self, _blob: &Arc<Blob>, _dependency: &Arc<Blob>) {}

    /// A dependency finished successfully.
    fn dependency_complete(&self, _blob: &Arc<Blob>, _dependency: &Arc<Blob>) {}

    /// Download progress changed, in `[0, 1]`.
    fn download_progress_changed(&self, _blob: &Arc<Blob>, _progress: f64) {}
}

/// Hooks that do nothing, for plain blobs.
pub struct NoHooks;

impl BlobHooks for NoHooks {}

type CompletedFn = Box<dyn FnOnce(&Arc<Blob>) + Send>;

struct State {
    status: Status,
    /// Fraction loaded, 255 == 1.0
    progress: u8,
    is_async: bool,
    final_url: Option<String>,
    errors: Vec<Diagnostic>,
    waiting_for: Vec<Arc<Blob>>,
    waiting_on_me: Vec<Weak<Blob>>,
    is_done: bool,
    in_callback: bool,
    completed: Vec<CompletedFn>,
}

/// A unit of loadable data with dependency edges.
pub struct Blob {
    url: String,
    kind: BlobKind,
    state: Mutex<State>,
}

impl fmt::Debug for Blob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Blob")
            .field("url", &self.url)
            .field("status", &state.status)
            .field("waiting_for", &state.waiting_for.len())
            .finish()
    }
}

impl Blob {
    /// Creates a blob in the `Null` state.
    pub fn new(url: impl Into<String>, kind: BlobKind) -> Arc<Blob> {
        Arc::new(Blob {
            url: url.into(),
            kind,
            state: Mutex::new(State {
                status: Status::Null,
                progress: 0,
                is_async: false,
                final_url: None,
                errors: Vec::new(),
                waiting_for: Vec::new(),
                waiting_on_me: Vec::new(),
                is_done: false,
                in_callback: false,
                completed: Vec::new(),
            }),
        })
    }

    /// URL the blob was requested with.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// URL the data finally came from, after redirects.
    pub fn final_url(&self) -> String {
        self.state
            .lock()
            .final_url
            .clone()
            .unwrap_or_else(|| self.url.clone())
    }

    /// Kind specific data.
    pub fn kind(&self) -> &BlobKind {
        &self.kind
    }

    /// Current status.
    pub fn status(&self) -> Status {
        self.state.lock().status
    }

    /// Not yet requested.
    pub fn is_null(&self) -> bool {
        self.status() == Status::Null
    }

    /// Bytes are being fetched.
    pub fn is_loading(&self) -> bool {
        self.status() == Status::Loading
    }

    /// Waiting on dependencies.
    pub fn is_waiting(&self) -> bool {
        self.status() == Status::WaitingForDependencies
    }

    /// Finished successfully.
    pub fn is_complete(&self) -> bool {
        self.status() == Status::Complete
    }

    /// Finished with errors.
    pub fn is_error(&self) -> bool {
        self.status() == Status::Error
    }

    /// Finished, one way or the other.
    pub fn is_complete_or_error(&self) -> bool {
        matches!(self.status(), Status::Complete | Status::Error)
    }

    /// Download progress in `[0, 1]`.
    pub fn progress(&self) -> f64 {
        f64::from(self.state.lock().progress) / 255.0
    }

    /// Whether the data is delivered asynchronously.
    pub fn is_async(&self) -> bool {
        self.state.lock().is_async
    }

    /// Errors recorded so far.
    pub fn errors(&self) -> Vec<Diagnostic> {
        self.state.lock().errors.clone()
    }

    /// Number of dependencies still outstanding.
    pub fn pending_dependencies(&self) -> usize {
        self.state.lock().waiting_for.len()
    }

    pub(crate) fn start_loading(&self) {
        let mut state = self.state.lock();
        if state.status == Status::Null {
            state.status = Status::Loading;
            state.progress = 0;
        }
    }

    pub(crate) fn set_async(&self, is_async: bool) {
        self.state.lock().is_async = is_async;
    }

    pub(crate) fn set_final_url(&self, url: impl Into<String>) {
        self.state.lock().final_url = Some(url.into());
    }

    /// Records download progress, notifying the hooks when the stored byte
    /// changes.
    pub(crate) fn set_progress(self: &Arc<Self>, fraction: f64, hooks: &dyn BlobHooks) {
        let byte = (fraction.clamp(0.0, 1.0) * 255.0).round() as u8;
        {
            let mut state = self.state.lock();
            if state.progress == byte || state.is_done {
                return;
            }
            state.progress = byte;
        }
        hooks.download_progress_changed(self, f64::from(byte) / 255.0);
    }

    /// Delivers the payload.
    pub(crate) fn set_data(self: &Arc<Self>, data: &[u8], hooks: &dyn BlobHooks) {
        {
            let state = self.state.lock();
            if state.is_done || state.status == Status::Error {
                return;
            }
        }
        self.set_progress(1.0, hooks);
        trace!(url = %self.url, bytes = data.len(), "data received");

        self.callback(|| hooks.data_received(self, data));
        let ready = {
            let mut state = self.state.lock();
            if state.status != Status::Error {
                state.status = Status::WaitingForDependencies;
            }
            state.status == Status::WaitingForDependencies && state.waiting_for.is_empty()
        };
        if ready {
            self.callback(|| hooks.all_dependencies_done(self));
        }
        self.try_done(hooks);
    }

    /// Fails the blob with one error.
    pub fn set_error(self: &Arc<Self>, error: Diagnostic, hooks: &dyn BlobHooks) {
        self.set_errors(vec![error], hooks);
    }

    /// Fails the blob. Irreversible: once in `Error`, later calls are
    /// ignored. Outstanding dependency waits are released.
    pub fn set_errors(self: &Arc<Self>, errors: Vec<Diagnostic>, hooks: &dyn BlobHooks) {
        let cancelled = {
            let mut state = self.state.lock();
            if state.status == Status::Error || (state.is_done && state.status == Status::Complete) {
                return;
            }
            state.status = Status::Error;
            state.errors = errors.into_iter().map(|e| e.or_url(&self.url)).collect();
            std::mem::take(&mut state.waiting_for)
        };
        debug!(url = %self.url, "blob failed");
        for dependency in cancelled {
            dependency.remove_waiter(self);
        }
        self.try_done(hooks);
    }

    /// Makes this blob wait for `dependency`.
    ///
    /// A no-op, returning `false`, when this blob is finished, the
    /// dependency is finished, or it is already tracked. A dependency that
    /// already waits on this blob, directly or transitively, is refused and
    /// fails this blob with "Cyclic dependency".
    pub fn add_dependency(self: &Arc<Self>, dependency: &Arc<Blob>, hooks: &dyn BlobHooks) -> bool {
        {
            let state = self.state.lock();
            if state.is_done || matches!(state.status, Status::Complete | Status::Error) {
                return false;
            }
            if state.waiting_for.iter().any(|d| Arc::ptr_eq(d, dependency)) {
                return false;
            }
        }
        {
            let state = dependency.state.lock();
            if state.is_done || matches!(state.status, Status::Complete | Status::Error) {
                return false;
            }
        }
        if Arc::ptr_eq(self, dependency) || dependency.waits_on(self) {
            self.set_error(Diagnostic::error("Cyclic dependency", 0, 0), hooks);
            return false;
        }

        self.state.lock().waiting_for.push(dependency.clone());
        dependency.state.lock().waiting_on_me.push(Arc::downgrade(self));
        trace!(url = %self.url, dependency = %dependency.url, "dependency added");
        true
    }

    /// Runs `callback` when the blob finishes, or now if it already has.
    pub fn on_completed(self: &Arc<Self>, callback: impl FnOnce(&Arc<Blob>) + Send + 'static) {
        {
            let mut state = self.state.lock();
            let finished = state.is_done && matches!(state.status, Status::Complete | Status::Error);
            if !finished {
                state.completed.push(Box::new(callback));
                return;
            }
        }
        callback(self);
    }

    /// Whether this blob waits on `target`, directly or transitively.
    fn waits_on(&self, target: &Arc<Blob>) -> bool {
        let mut stack: Vec<Arc<Blob>> = self.state.lock().waiting_for.clone();
        let mut visited: Vec<*const Blob> = Vec::new();
        while let Some(blob) = stack.pop() {
            if Arc::ptr_eq(&blob, target) {
                return true;
            }
            let ptr = Arc::as_ptr(&blob);
            if visited.contains(&ptr) {
                continue;
            }
            visited.push(ptr);
            stack.extend(blob.state.lock().waiting_for.iter().cloned());
        }
        false
    }

    fn remove_waiter(&self, waiter: &Arc<Blob>) {
        self.state
            .lock()
            .waiting_on_me
            .retain(|w| w.upgrade().is_some_and(|w| !Arc::ptr_eq(&w, waiter)));
    }

    fn callback(&self, f: impl FnOnce()) {
        self.state.lock().in_callback = true;
        f();
        self.state.lock().in_callback = false;
    }

    /// Finishes the blob if it is no longer loading, inside no callback,
    /// and waits on nothing.
    fn try_done(self: &Arc<Self>, hooks: &dyn BlobHooks) {
        {
            let mut state = self.state.lock();
            if state.is_done
                || state.in_callback
                || matches!(state.status, Status::Null | Status::Loading)
                || !state.waiting_for.is_empty()
            {
                return;
            }
            state.is_done = true;
        }

        hooks.done(self);

        let (waiters, completed, status) = {
            let mut state = self.state.lock();
            if state.status != Status::Error {
                state.status = Status::Complete;
            }
            (
                std::mem::take(&mut state.waiting_on_me),
                std::mem::take(&mut state.completed),
                state.status,
            )
        };
        debug!(url = %self.url, %status, "blob finished");

        for waiter in waiters.iter().filter_map(Weak::upgrade) {
            waiter.dependency_finished(self, hooks);
        }
        for callback in completed {
            callback(self);
        }
    }

    fn dependency_finished(self: &Arc<Self>, dependency: &Arc<Blob>, hooks: &dyn BlobHooks) {
        let removed = {
            let mut state = self.state.lock();
            let before = state.waiting_for.len();
            state.waiting_for.retain(|d| !Arc::ptr_eq(d, dependency));
            state.waiting_for.len() != before
        };
        if !removed {
            return;
        }

        if dependency.is_error() {
            hooks.dependency_error(self, dependency);
        } else {
            hooks.dependency_complete(self, dependency);
        }

        let ready = {
            let state = self.state.lock();
            !state.in_callback
                && !state.is_done
                && state.status == Status::WaitingForDependencies
                && state.waiting_for.is_empty()
        };
        if ready {
            self.callback(|| hooks.all_dependencies_done(self));
        }
        self.try_done(hooks);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Records hook invocations and optionally adds dependencies on data.
    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
        on_data: Mutex<Vec<(String, Arc<Blob>)>>,
    }

    impl Recorder {
        fn push(&self, event: String) {
            self.events.lock().push(event);
        }

        fn events(&self) -> Vec<String> {
            self.events.lock().clone()
        }

        fn depend_on_data(&self, url: &str, dependency: &Arc<Blob>) {
            self.on_data.lock().push((url.to_string(), dependency.clone()));
        }
    }

    impl BlobHooks for Recorder {
        fn data_received(&self, blob: &Arc<Blob>, _data: &[u8]) {
            self.push(format!("data {}", blob.url()));
            let deps: Vec<Arc<Blob>> = self
                .on_data
                .lock()
                .iter()
                .filter(|(url, _)| url == blob.url())
                .map(|(_, d)| d.clone())
                .collect();
            for dep in deps {
                blob.add_dependency(&dep, self);
            }
        }

        fn all_dependencies_done(&self, blob: &Arc<Blob>) {
            self.push(format!("all {}", blob.url()));
        }

        fn done(&self, blob: &Arc<Blob>) {
            self.push(format!("done {}", blob.url()));
        }

        fn dependency_error(&self, blob: &Arc<Blob>, dependency: &Arc<Blob>) {
            self.push(format!("dep-error {} {}", blob.url(), dependency.url()));
        }

        fn dependency_complete(&self, blob: &Arc<Blob>, dependency: &Arc<Blob>) {
            self.push(format!("dep-complete {} {}", blob.url(), dependency.url()));
        }
    }

    fn loading(url: &str) -> Arc<Blob> {
        let blob = Blob::new(url, BlobKind::Plain);
        blob.start_loading();
        blob
    }

    #[test]
    fn test_completes_without_dependencies() {
        let hooks = Recorder::default();
        let blob = loading("a");
        assert!(blob.is_loading());
        blob.set_data(b"x", &hooks);
        assert!(blob.is_complete());
        assert_eq!(blob.progress(), 1.0);
        assert_eq!(hooks.events(), vec!["data a", "all a", "done a"]);
    }

    #[test]
    fn test_waits_for_every_dependency() {
        let hooks = Recorder::default();
        let parent = loading("p");
        let first = loading("d1");
        let second = loading("d2");
        hooks.depend_on_data("p", &first);
        hooks.depend_on_data("p", &second);

        parent.set_data(b"", &hooks);
        assert!(parent.is_waiting());
        assert_eq!(parent.pending_dependencies(), 2);

        second.set_data(b"", &hooks);
        assert!(parent.is_waiting());
        first.set_data(b"", &hooks);
        assert!(parent.is_complete());

        let events = hooks.events();
        let done = events.iter().filter(|e| *e == "done p").count();
        assert_eq!(done, 1);
        let position = |needle: &str| events.iter().position(|e| e == needle).unwrap();
        assert!(position("dep-complete p d2") < position("dep-complete p d1"));
        assert!(position("done d1") < position("done p"));
        assert!(position("all p") < position("done p"));
    }

    #[test]
    fn test_add_dependency_is_idempotent() {
        let hooks = NoHooks;
        let parent = loading("p");
        let dep = loading("d");
        assert!(parent.add_dependency(&dep, &hooks));
        assert!(!parent.add_dependency(&dep, &hooks));
        assert_eq!(parent.pending_dependencies(), 1);

        let finished = loading("f");
        finished.set_data(b"", &hooks);
        assert!(!parent.add_dependency(&finished, &hooks));

        let done = loading("x");
        done.set_data(b"", &hooks);
        assert!(!done.add_dependency(&parent, &hooks));
    }

    #[test]
    fn test_dependency_error_does_not_fail_waiter() {
        let hooks = Recorder::default();
        let parent = loading("p");
        let dep = loading("d");
        hooks.depend_on_data("p", &dep);
        parent.set_data(b"", &hooks);

        dep.set_error(Diagnostic::error("File not found", 0, 0), &hooks);
        assert!(dep.is_error());
        assert_eq!(dep.errors()[0].to_string(), "d: File not found");
        assert!(parent.is_complete());
        assert!(hooks.events().contains(&"dep-error p d".to_string()));
    }

    #[test]
    fn test_error_is_irreversible_and_cancels_waits() {
        let hooks = Recorder::default();
        let parent = loading("p");
        let dep = loading("d");
        hooks.depend_on_data("p", &dep);
        parent.set_data(b"", &hooks);

        parent.set_error(Diagnostic::error("first", 1, 1), &hooks);
        parent.set_error(Diagnostic::error("second", 2, 1), &hooks);
        assert!(parent.is_error());
        assert_eq!(parent.errors().len(), 1);
        assert_eq!(parent.errors()[0].message, "first");
        assert_eq!(parent.pending_dependencies(), 0);
        assert!(!parent.add_dependency(&loading("late"), &hooks));

        dep.set_data(b"", &hooks);
        assert!(!hooks.events().iter().any(|e| e.starts_with("dep-complete p")));
        assert_eq!(hooks.events().iter().filter(|e| *e == "done p").count(), 1);
    }

    #[test]
    fn test_cycles_are_refused() {
        let hooks = NoHooks;
        let a = loading("a");
        let b = loading("b");
        let c = loading("c");
        assert!(a.add_dependency(&b, &hooks));
        assert!(b.add_dependency(&c, &hooks));
        assert!(!c.add_dependency(&a, &hooks));
        assert!(c.is_error());
        assert_eq!(c.errors()[0].message, "Cyclic dependency");

        let d = loading("d");
        assert!(!d.add_dependency(&d, &hooks));
        assert!(d.is_error());
    }

    #[test]
    fn test_completed_callbacks() {
        let hooks = NoHooks;
        let blob = loading("a");
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        blob.on_completed(move |b| sink.lock().push(b.status()));
        assert!(seen.lock().is_empty());
        blob.set_data(b"", &hooks);
        assert_eq!(*seen.lock(), vec![Status::Complete]);

        let sink = seen.clone();
        blob.on_completed(move |b| sink.lock().push(b.status()));
        assert_eq!(seen.lock().len(), 2);
    }

    #[test]
    fn test_progress_byte() {
        struct Progress(Mutex<Vec<f64>>);
        impl BlobHooks for Progress {
            fn download_progress_changed(&self, _blob: &Arc<Blob>, progress: f64) {
                self.0.lock().push(progress);
            }
        }
        let hooks = Progress(Mutex::new(Vec::new()));
        let blob = loading("a");
        blob.set_async(true);
        blob.set_progress(0.5, &hooks);
        blob.set_progress(0.5, &hooks);
        assert_eq!(blob.progress(), 128.0 / 255.0);
        blob.set_data(b"", &hooks);
        assert_eq!(*hooks.0.lock(), vec![128.0 / 255.0, 1.0]);
        assert!(blob.is_async());
    }
}
