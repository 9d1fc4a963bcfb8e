//! A read-only slice that any number of readers can traverse at the same time.
//!
//! The backing items are moved into the [`Broadcast`] on construction and never change. Each
//! call to [`Broadcast::elems`] starts a fresh traversal: a dedicated emitter thread clones the
//! items one by one into that traversal's own channel, at the pace of its reader. Traversals know
//! nothing about each other.
//!
//! ```
//! use share_owned::Broadcast;
//!
//! let shared: Broadcast<&str> = Broadcast::new(vec!["foo", "bar", "baz"]);
//! let a: Vec<_> = shared.elems().unwrap().collect();
//! let b: Vec<_> = shared.elems().unwrap().collect();
//! assert_eq!(a, b);
//! shared.close().unwrap();
//! ```

use std::sync::Arc;
use std::thread;
use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use tracing::{debug, debug_span, error, trace};
use crate::builder::Builder;
use crate::error::{Error, Result};
use crate::gate::Gate;

enum Request<T> {
    /// Start a traversal into the given channel, reporting whether its emitter started.
    Traverse(Sender<T>, Sender<Result<()>>),
    Close,
}

/// Handle to a shared read-only slice. Clones refer to the same slice.
pub struct Broadcast<T> {
    requests: Sender<Request<T>>,
    gate: Arc<Gate>,
}

impl<T> Clone for Broadcast<T> {
    fn clone(&self) -> Self {
        Self {
            requests: self.requests.clone(),
            gate: self.gate.clone(),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> Broadcast<T> {
    /// Take ownership of `items` and start the dispatcher thread.
    ///
    /// # Panics
    /// Panics if the dispatcher thread cannot be spawned. Use [`Builder::broadcast`] to handle
    /// that case.
    pub fn new(items: impl Into<Arc<[T]>>) -> Self {
        match Self::with_builder(Builder::new(), items) {
            Ok(broadcast) => broadcast,
            Err(err) => panic!("{err}"),
        }
    }

    pub(crate) fn with_builder(builder: Builder, items: impl Into<Arc<[T]>>) -> Result<Self> {
        let items = items.into();
        let (requests, incoming) = unbounded();
        let emitters = builder.clone();
        builder.spawn("broadcast", move || dispatch(items, incoming, emitters))?;

        Ok(Self {
            requests,
            gate: Arc::new(Gate::new()),
        })
    }
}

impl<T> Broadcast<T> {
    /// Start a new traversal over every item, in order.
    ///
    /// The returned iterator is independent of every other traversal. Dropping it early stops
    /// its emitter.
    pub fn elems(&self) -> Result<Elems<T>> {
        let pass = self.gate.enter()?;
        let (out, items) = bounded(0);
        let (started, status) = bounded(1);
        self.requests.send(Request::Traverse(out, started)).map_err(|_| Error::Closed)?;
        drop(pass);

        status.recv().map_err(|_| Error::Closed)??;
        Ok(Elems { items })
    }

    /// Stop accepting new traversals. Traversals already started run to completion.
    pub fn close(&self) -> Result<()> {
        self.gate.close()?;
        let _ = self.requests.send(Request::Close);
        Ok(())
    }

    /// Return true once `close` has been called on any handle.
    pub fn is_closed(&self) -> bool {
        self.gate.is_closed()
    }
}

/// One traversal of a [`Broadcast`], returned by [`Broadcast::elems`].
pub struct Elems<T> {
    items: Receiver<T>,
}

impl<T> Iterator for Elems<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        self.items.recv().ok()
    }
}

fn dispatch<T>(items: Arc<[T]>, requests: Receiver<Request<T>>, emitters: Builder)
where
    T: Clone + Send + Sync + 'static,
{
    let span = debug_span!("broadcast", owner = thread::current().name().unwrap_or("broadcast"));
    let _enter = span.enter();
    debug!(len = items.len(), "dispatcher started");

    for request in requests.iter() {
        match request {
            Request::Traverse(out, started) => {
                let items = items.clone();
                let result = emitters.spawn("emit", move || emit(&items, out));
                if let Err(err) = &result {
                    error!(%err, "failed to start traversal");
                }
                let _ = started.send(result);
            }
            Request::Close => break,
        }
    }
    debug!("dispatcher exiting");
}

fn emit<T: Clone>(items: &[T], out: Sender<T>) {
    for item in items {
        if out.send(item.clone()).is_err() {
            trace!("traversal dropped early");
            return;
        }
    }
    trace!(len = items.len(), "traversal complete");
}
