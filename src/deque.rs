//! An unbounded double-ended queue owned by a single thread.
//!
//! Values can be put at and taken from either end. Putting at the tail and taking from the head
//! gives a FIFO queue, putting and taking at the same end gives a stack.
//!
//! While the buffer holds values the owner offers up to four operations at once: accept a put
//! at either end and hand out the value at either end. Whichever ones have a ready caller are
//! chosen between at random, so no end is starved while its callers keep waiting. After
//! [`Deque::close`] the owner keeps serving both take ends until the buffer is empty, then
//! disconnects them.
//!
//! ```
//! use share_owned::Deque;
//!
//! let deque = Deque::new();
//! let producer = deque.clone();
//! std::thread::spawn(move || {
//!     for word in ["foo", "bar", "baz"] {
//!         producer.put_tail(word).unwrap();
//!     }
//!     producer.close().unwrap();
//! });
//!
//! let words: Vec<_> = deque.iter_head().collect();
//! assert_eq!(words, ["foo", "bar", "baz"]);
//! ```

use std::collections::VecDeque;
use std::sync::Arc;
use std::thread;
use crossbeam_channel::{bounded, Receiver, Select, SelectedOperation, SendError, Sender};
use tracing::{debug, debug_span, trace, warn};
use crate::builder::Builder;
use crate::error::Result;
use crate::gate::Gate;

/// One end of a [`Deque`].
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum End {
    Head,
    Tail,
}

impl End {
    fn push<T>(self, buffer: &mut VecDeque<T>, value: T) {
        match self {
            End::Head => buffer.push_front(value),
            End::Tail => buffer.push_back(value),
        }
    }

    fn pop<T>(self, buffer: &mut VecDeque<T>) -> Option<T> {
        match self {
            End::Head => buffer.pop_front(),
            End::Tail => buffer.pop_back(),
        }
    }
}

/// A pair of channels, one per end.
struct Ends<C> {
    head: C,
    tail: C,
}

impl<C> Ends<C> {
    fn get(&self, end: End) -> &C {
        match end {
            End::Head => &self.head,
            End::Tail => &self.tail,
        }
    }
}

impl<C: Clone> Clone for Ends<C> {
    fn clone(&self) -> Self {
        Self {
            head: self.head.clone(),
            tail: self.tail.clone(),
        }
    }
}

/// Handle to an unbounded double-ended queue. Clones refer to the same deque.
pub struct Deque<T> {
    puts: Ends<Sender<T>>,
    takes: Ends<Receiver<T>>,
    close: Sender<()>,
    gate: Arc<Gate>,
}

impl<T> Clone for Deque<T> {
    fn clone(&self) -> Self {
        Self {
            puts: self.puts.clone(),
            takes: self.takes.clone(),
            close: self.close.clone(),
            gate: self.gate.clone(),
        }
    }
}

impl<T: Send + 'static> Default for Deque<T> {
    fn default() -> Self { Self::new() }
}

impl<T: Send + 'static> Deque<T> {
    /// Create a deque and start its owner thread.
    ///
    /// # Panics
    /// Panics if the owner thread cannot be spawned. Use [`Builder::deque`] to handle that case.
    pub fn new() -> Self {
        match Self::with_builder(Builder::new()) {
            Ok(deque) => deque,
            Err(err) => panic!("{err}"),
        }
    }

    pub(crate) fn with_builder(builder: Builder) -> Result<Self> {
        let (put_head, head_puts) = bounded(0);
        let (put_tail, tail_puts) = bounded(0);
        let (head_takes, take_head) = bounded(0);
        let (tail_takes, take_tail) = bounded(0);
        let (close, closed) = bounded(1);

        let owner = Owner {
            puts: Ends { head: head_puts, tail: tail_puts },
            takes: Ends { head: head_takes, tail: tail_takes },
            closed,
            buffer: VecDeque::new(),
        };
        builder.spawn("deque", move || owner.run())?;

        Ok(Self {
            puts: Ends { head: put_head, tail: put_tail },
            takes: Ends { head: take_head, tail: take_tail },
            close,
            gate: Arc::new(Gate::new()),
        })
    }
}

impl<T> Deque<T> {
    /// Add a value at `end`. This never waits for a consumer.
    pub fn put(&self, end: End, value: T) -> Result<()> {
        let _pass = self.gate.enter()?;
        // The owner only stops receiving puts after the gate is closed.
        let _ = self.puts.get(end).send(value);
        Ok(())
    }

    /// Remove the value at `end`, blocking while the deque is empty.
    ///
    /// Returns `None` once the deque has been closed and drained.
    pub fn take(&self, end: End) -> Option<T> {
        self.takes.get(end).recv().ok()
    }

    /// Add a value to the front of the deque.
    pub fn put_head(&self, value: T) -> Result<()> {
        self.put(End::Head, value)
    }

    /// Add a value to the back of the deque.
    pub fn put_tail(&self, value: T) -> Result<()> {
        self.put(End::Tail, value)
    }

    /// Remove the value at the front of the deque, blocking while it is empty.
    pub fn take_head(&self) -> Option<T> {
        self.take(End::Head)
    }

    /// Remove the value at the back of the deque, blocking while it is empty.
    pub fn take_tail(&self) -> Option<T> {
        self.take(End::Tail)
    }

    /// Close both put ends. The owner keeps handing out values from both take ends until the
    /// deque is empty.
    pub fn close(&self) -> Result<()> {
        self.gate.close()?;
        let _ = self.close.send(());
        Ok(())
    }

    /// Return true once `close` has been called on any handle of this deque.
    pub fn is_closed(&self) -> bool {
        self.gate.is_closed()
    }

    /// A blocking iterator taking from `end` until the deque is closed and empty.
    pub fn iter(&self, end: End) -> Iter<'_, T> {
        Iter { deque: self, end }
    }

    /// A blocking iterator taking from the front.
    pub fn iter_head(&self) -> Iter<'_, T> {
        self.iter(End::Head)
    }

    /// A blocking iterator taking from the back.
    pub fn iter_tail(&self) -> Iter<'_, T> {
        self.iter(End::Tail)
    }
}

/// Draining iterator returned by [`Deque::iter`].
pub struct Iter<'a, T> {
    deque: &'a Deque<T>,
    end: End,
}

impl<T> Iterator for Iter<'_, T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        self.deque.take(self.end)
    }
}

/// State moved into the owner thread.
struct Owner<T> {
    puts: Ends<Receiver<T>>,
    takes: Ends<Sender<T>>,
    closed: Receiver<()>,
    buffer: VecDeque<T>,
}

/// What the owner should do after handling one operation.
enum Step {
    Continue,
    /// `close` was called: hand out what is left.
    Closed,
    /// Every handle is gone, nobody can take the buffered values.
    Disconnected,
}

impl<T> Owner<T> {
    fn run(mut self) {
        let span = debug_span!("deque", owner = thread::current().name().unwrap_or("deque"));
        let _enter = span.enter();
        debug!("owner started");

        loop {
            match self.step() {
                Step::Continue => {}
                Step::Closed => break,
                Step::Disconnected => {
                    warn!(dropped = self.buffer.len(), "all handles dropped");
                    return;
                }
            }
        }

        debug!(len = self.buffer.len(), "closed, draining");
        if self.drain() {
            debug!("owner exiting");
        } else {
            warn!(dropped = self.buffer.len(), "all handles dropped while draining");
        }
    }

    /// Handle one operation while the put ends are open.
    fn step(&mut self) -> Step {
        let mut sel = Select::new();
        let put_head = sel.recv(&self.puts.head);
        let put_tail = sel.recv(&self.puts.tail);
        let close = sel.recv(&self.closed);
        let takes = (!self.buffer.is_empty())
            .then(|| (sel.send(&self.takes.head), sel.send(&self.takes.tail)));

        let oper = sel.select();
        let index = oper.index();
        let end = match takes {
            Some((head, _)) if index == head => End::Head,
            Some((_, tail)) if index == tail => End::Tail,
            _ => {
                let end = if index == put_head {
                    End::Head
                } else if index == put_tail {
                    End::Tail
                } else {
                    debug_assert_eq!(index, close);
                    let _ = oper.recv(&self.closed);
                    return Step::Closed;
                };
                return match oper.recv(self.puts.get(end)) {
                    Ok(value) => {
                        end.push(&mut self.buffer, value);
                        trace!(?end, len = self.buffer.len(), "put");
                        Step::Continue
                    }
                    Err(_) => Step::Disconnected,
                };
            }
        };

        if serve(oper, end, &mut self.buffer, &self.takes) {
            Step::Continue
        } else {
            Step::Disconnected
        }
    }

    /// Hand out the rest of the buffer from whichever end is asked for. Returns false if the
    /// take ends were disconnected first.
    fn drain(&mut self) -> bool {
        while !self.buffer.is_empty() {
            let mut sel = Select::new();
            let head = sel.send(&self.takes.head);
            let tail = sel.send(&self.takes.tail);

            let oper = sel.select();
            let end = if oper.index() == head {
                End::Head
            } else {
                debug_assert_eq!(oper.index(), tail);
                End::Tail
            };
            if !serve(oper, end, &mut self.buffer, &self.takes) {
                return false;
            }
        }
        true
    }
}

fn serve<T>(oper: SelectedOperation<'_>, end: End, buffer: &mut VecDeque<T>, takes: &Ends<Sender<T>>) -> bool {
    let Some(value) = end.pop(buffer) else {
        unreachable!("take offered with an empty buffer");
    };
    match oper.send(takes.get(end), value) {
        Ok(()) => {
            trace!(?end, len = buffer.len(), "take");
            true
        }
        Err(SendError(value)) => {
            // Back where it came from, so the caller sees the full buffer.
            end.push(buffer, value);
            false
        }
    }
}
