//! A single shared value with blocking and non-blocking reads.
//!
//! The cell starts unset. [`ValueCell::get`] waits for the first [`ValueCell::set`], while
//! [`ValueCell::try_get`] returns immediately. Every caller that was waiting when the first value
//! arrives receives a clone of that same value.
//!
//! The owner thread publishes each new value before acknowledging the `set` that carried it, so
//! once `set` returns, every `try_get` observes that value or a later one.
//!
//! ```
//! use share_owned::ValueCell;
//!
//! let cell = ValueCell::new();
//! assert_eq!(cell.try_get().unwrap(), None);
//!
//! let setter = cell.clone();
//! std::thread::spawn(move || setter.set(String::from("foo")).unwrap());
//!
//! assert_eq!(cell.get().unwrap(), "foo");
//! assert_eq!(cell.try_get().unwrap().as_deref(), Some("foo"));
//! cell.close().unwrap();
//! ```

use std::sync::Arc;
use std::thread;
use arc_swap::ArcSwapOption;
use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use tracing::{debug, debug_span, trace};
use crate::builder::Builder;
use crate::error::{Error, Result};
use crate::gate::Gate;

enum Request<T> {
    Set(T, Sender<()>),
    Get(Sender<T>),
    Close,
}

enum State<T> {
    /// Callers blocked in `get`, waiting for the first value.
    Unset(Vec<Sender<T>>),
    Set(Arc<T>),
}

/// Handle to a shared value. Clones refer to the same cell.
pub struct ValueCell<T> {
    requests: Sender<Request<T>>,
    snapshot: Arc<ArcSwapOption<T>>,
    gate: Arc<Gate>,
}

impl<T> Clone for ValueCell<T> {
    fn clone(&self) -> Self {
        Self {
            requests: self.requests.clone(),
            snapshot: self.snapshot.clone(),
            gate: self.gate.clone(),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> Default for ValueCell<T> {
    fn default() -> Self { Self::new() }
}

impl<T: Clone + Send + Sync + 'static> ValueCell<T> {
    /// Create an unset cell and start its owner thread.
    ///
    /// # Panics
    /// Panics if the owner thread cannot be spawned. Use [`Builder::value`] to handle that case.
    pub fn new() -> Self {
        match Self::with_builder(Builder::new()) {
            Ok(cell) => cell,
            Err(err) => panic!("{err}"),
        }
    }

    pub(crate) fn with_builder(builder: Builder) -> Result<Self> {
        let (requests, incoming) = unbounded();
        let snapshot = Arc::new(ArcSwapOption::empty());
        let published = snapshot.clone();
        builder.spawn("value", move || run(incoming, published))?;

        Ok(Self {
            requests, snapshot,
            gate: Arc::new(Gate::new()),
        })
    }

    /// Replace the stored value.
    ///
    /// Returns once the owner has applied it. The owner never waits on readers, so this does not
    /// depend on any other caller.
    pub fn set(&self, value: T) -> Result<()> {
        let pass = self.gate.enter()?;
        let (done, applied) = bounded(1);
        self.requests.send(Request::Set(value, done)).map_err(|_| Error::Closed)?;
        drop(pass);
        applied.recv().map_err(|_| Error::Closed)
    }

    /// Return the stored value, blocking until the first value has been set.
    ///
    /// If the cell is closed while this is waiting, [`Error::Closed`] is returned.
    pub fn get(&self) -> Result<T> {
        let pass = self.gate.enter()?;
        if let Some(value) = self.snapshot.load_full() {
            return Ok(T::clone(&value));
        }

        let (reply, response) = bounded(1);
        self.requests.send(Request::Get(reply)).map_err(|_| Error::Closed)?;
        drop(pass);
        response.recv().map_err(|_| Error::Closed)
    }
}

impl<T: Clone> ValueCell<T> {
    /// Return the stored value if one has been set, without blocking.
    pub fn try_get(&self) -> Result<Option<T>> {
        if self.gate.is_closed() {
            return Err(Error::Closed);
        }
        Ok(self.snapshot.load_full().map(|value| T::clone(&value)))
    }
}

impl<T> ValueCell<T> {
    /// Stop the owner thread. Callers still blocked in [`ValueCell::get`] receive
    /// [`Error::Closed`].
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

fn run<T: Clone>(requests: Receiver<Request<T>>, snapshot: Arc<ArcSwapOption<T>>) {
    let span = debug_span!("value", owner = thread::current().name().unwrap_or("value"));
    let _enter = span.enter();
    debug!("owner started");

    let mut state = State::Unset(Vec::new());
    for request in requests.iter() {
        match request {
            Request::Set(value, done) => {
                let value = Arc::new(value);
                // Publish before anyone can observe the value through a reply.
                snapshot.store(Some(value.clone()));
                if let State::Unset(waiters) = &mut state {
                    trace!(waiters = waiters.len(), "first value set");
                    for waiter in waiters.drain(..) {
                        let _ = waiter.send(T::clone(&value));
                    }
                }
                state = State::Set(value);
                let _ = done.send(());
            }
            Request::Get(reply) => match &mut state {
                State::Unset(waiters) => waiters.push(reply),
                State::Set(value) => {
                    let _ = reply.send(T::clone(&**value));
                }
            },
            Request::Close => {
                if let State::Unset(waiters) = &state {
                    debug!(waiters = waiters.len(), "closed before first value");
                }
                break;
            }
        }
    }
    debug!("owner exiting");
}
