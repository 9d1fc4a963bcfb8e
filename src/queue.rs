//! An unbounded FIFO queue owned by a single thread.
//!
//! The buffer lives inside the owner thread. [`Queue::enqueue`] hands a value to the owner, which
//! is always ready to accept one, and [`Queue::dequeue`] waits until the owner offers the front
//! element. Closing the queue stops the owner from accepting values; what is still buffered is
//! handed out in order before the take side disconnects.
//!
//! ```
//! use share_owned::Queue;
//!
//! let queue = Queue::new();
//! let producer = queue.clone();
//! std::thread::spawn(move || {
//!     for word in ["foo", "bar", "baz"] {
//!         producer.enqueue(word).unwrap();
//!     }
//!     producer.close().unwrap();
//! });
//!
//! let words: Vec<_> = queue.iter().collect();
//! assert_eq!(words, ["foo", "bar", "baz"]);
//! ```

use std::collections::VecDeque;
use std::sync::Arc;
use std::thread;
use crossbeam_channel::{bounded, Receiver, Select, Sender};
use tracing::{debug, debug_span, trace, warn};
use crate::builder::Builder;
use crate::error::Result;
use crate::gate::Gate;

/// Handle to an unbounded FIFO queue. Clones refer to the same queue.
pub struct Queue<T> {
    enqueue: Sender<T>,
    dequeue: Receiver<T>,
    close: Sender<()>,
    gate: Arc<Gate>,
}

impl<T> Clone for Queue<T> {
    fn clone(&self) -> Self {
        Self {
            enqueue: self.enqueue.clone(),
            dequeue: self.dequeue.clone(),
            close: self.close.clone(),
            gate: self.gate.clone(),
        }
    }
}

impl<T: Send + 'static> Default for Queue<T> {
    fn default() -> Self { Self::new() }
}

impl<T: Send + 'static> Queue<T> {
    /// Create a queue and start its owner thread.
    ///
    /// # Panics
    /// Panics if the owner thread cannot be spawned. Use [`Builder::queue`] to handle that case.
    pub fn new() -> Self {
        match Self::with_builder(Builder::new()) {
            Ok(queue) => queue,
            Err(err) => panic!("{err}"),
        }
    }

    pub(crate) fn with_builder(builder: Builder) -> Result<Self> {
        let (enqueue, puts) = bounded(0);
        let (takes, dequeue) = bounded(0);
        let (close, closed) = bounded(1);
        builder.spawn("queue", move || run(puts, closed, takes))?;

        Ok(Self {
            enqueue, dequeue, close,
            gate: Arc::new(Gate::new()),
        })
    }
}

impl<T> Queue<T> {
    /// Add a value to the back of the queue.
    ///
    /// This never waits for a consumer. It returns [`Error::Closed`](crate::Error::Closed) if the
    /// queue has been closed.
    pub fn enqueue(&self, value: T) -> Result<()> {
        let _pass = self.gate.enter()?;
        // The owner only drops its receiver after the gate is closed.
        let _ = self.enqueue.send(value);
        Ok(())
    }

    /// Remove the value at the front of the queue, blocking while it is empty.
    ///
    /// Returns `None` once the queue has been closed and every remaining value handed out.
    pub fn dequeue(&self) -> Option<T> {
        self.dequeue.recv().ok()
    }

    /// Close the put side. Values already in the queue can still be dequeued.
    pub fn close(&self) -> Result<()> {
        self.gate.close()?;
        let _ = self.close.send(());
        Ok(())
    }

    /// Return true once `close` has been called on any handle.
    pub fn is_closed(&self) -> bool {
        self.gate.is_closed()
    }

    /// A blocking iterator that dequeues until the queue is closed and empty.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter { queue: self }
    }
}

impl<'a, T> IntoIterator for &'a Queue<T> {
    type Item = T;
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Iter<'a, T> {
        self.iter()
    }
}

/// Draining iterator returned by [`Queue::iter`].
pub struct Iter<'a, T> {
    queue: &'a Queue<T>,
}

impl<T> Iterator for Iter<'_, T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        self.queue.dequeue()
    }
}

fn run<T>(puts: Receiver<T>, closed: Receiver<()>, takes: Sender<T>) {
    let span = debug_span!("queue", owner = thread::current().name().unwrap_or("queue"));
    let _enter = span.enter();
    debug!("owner started");

    let mut buffer = VecDeque::<T>::new();
    loop {
        let mut sel = Select::new();
        let put = sel.recv(&puts);
        let close = sel.recv(&closed);
        // Only offer the front element when there is one.
        let take = (!buffer.is_empty()).then(|| sel.send(&takes));

        let oper = sel.select();
        match oper.index() {
            i if i == put => match oper.recv(&puts) {
                Ok(value) => {
                    buffer.push_back(value);
                    trace!(len = buffer.len(), "enqueued");
                }
                Err(_) => break,
            },
            i if i == close => {
                let _ = oper.recv(&closed);
                break;
            }
            i if Some(i) == take => {
                let Some(value) = buffer.pop_front() else {
                    unreachable!("take offered with an empty buffer");
                };
                if oper.send(&takes, value).is_err() {
                    warn!(dropped = buffer.len() + 1, "all handles dropped");
                    return;
                }
                trace!(len = buffer.len(), "dequeued");
            }
            _ => unreachable!(),
        }
    }

    debug!(len = buffer.len(), "closed, draining");
    for value in buffer.drain(..) {
        if takes.send(value).is_err() {
            warn!("all handles dropped while draining");
            return;
        }
    }
    debug!("owner exiting");
}

#[cfg(test)]
mod test {
    use super::*;
    use std::time::Duration;
    use crossbeam_channel::unbounded;
    use crate::error::Error;
    use crate::test::DropSignal;
    use proptest::prelude::*;

    #[test]
    fn queue_smoke() {
        let queue = Queue::new();
        assert!(!queue.is_closed());

        for word in ["foo", "bar", "baz", "xyz"] {
            queue.enqueue(word).unwrap();
        }
        assert_eq!(queue.dequeue(), Some("foo"));
        queue.close().unwrap();
        assert!(queue.is_closed());

        assert!(matches!(queue.enqueue("late"), Err(Error::Closed)));
        assert!(matches!(queue.close(), Err(Error::AlreadyClosed)));

        let rest: Vec<_> = queue.iter().collect();
        assert_eq!(rest, ["bar", "baz", "xyz"]);
        assert_eq!(queue.dequeue(), None);
    }

    #[test]
    fn queue_concurrent() {
        let queue = Queue::new();
        let vals = ["foo", "bar", "baz", "xyz"];

        std::thread::scope(|s| {
            s.spawn(|| {
                for v in vals {
                    queue.enqueue(v).unwrap();
                }
                queue.close().unwrap();
            });
            s.spawn(|| {
                let mut received = Vec::new();
                for front in &queue {
                    received.push(front);
                }
                assert_eq!(received, vals);
            });
        });
    }

    #[test]
    fn queue_close_empty() {
        let queue: Queue<u32> = Queue::new();
        let consumer = queue.clone();

        std::thread::scope(|s| {
            let handle = s.spawn(move || consumer.dequeue());
            queue.close().unwrap();
            assert_eq!(handle.join().unwrap(), None);
        });
    }

    #[test]
    fn queue_many() {
        #[cfg(miri)]
        const TEST_COUNT: u32 = 100;
        #[cfg(not(miri))]
        const TEST_COUNT: u32 = 100_000;

        let queue = Builder::new().name("many").queue().unwrap();
        std::thread::scope(|s| {
            s.spawn(|| {
                for i in 0..TEST_COUNT {
                    queue.enqueue(i).unwrap();
                }
                queue.close().unwrap();
            });
            let mut expected = 0;
            for v in queue.iter() {
                assert_eq!(v, expected);
                expected += 1;
            }
            assert_eq!(expected, TEST_COUNT);
        });
    }

    #[test]
    fn queue_dropped_handles() {
        let (signal, dropped) = unbounded();
        let queue = Queue::new();
        queue.enqueue(DropSignal(signal.clone())).unwrap();
        queue.enqueue(DropSignal(signal)).unwrap();
        assert!(dropped.try_recv().is_err());

        // The owner exits with both values still buffered and drops them.
        drop(queue);
        for _ in 0..2 {
            assert!(dropped.recv_timeout(Duration::from_secs(5)).is_ok());
        }
    }

    #[test]
    fn queue_producers_conserve() {
        #[cfg(miri)]
        const PER_PRODUCER: u32 = 25;
        #[cfg(not(miri))]
        const PER_PRODUCER: u32 = 1_000;
        const PRODUCERS: u32 = 4;

        let queue = Queue::new();
        let mut received = std::thread::scope(|s| {
            for p in 0..PRODUCERS {
                let queue = &queue;
                s.spawn(move || {
                    for i in 0..PER_PRODUCER {
                        queue.enqueue(p * PER_PRODUCER + i).unwrap();
                    }
                });
            }
            let consumer = s.spawn(|| {
                (0..PRODUCERS * PER_PRODUCER).map(|_| queue.dequeue().unwrap()).collect::<Vec<_>>()
            });
            consumer.join().unwrap()
        });

        queue.close().unwrap();
        assert_eq!(queue.dequeue(), None);

        // Each producer's values come out in the order it put them.
        for p in 0..PRODUCERS {
            let range = p * PER_PRODUCER..(p + 1) * PER_PRODUCER;
            let mine: Vec<_> = received.iter().filter(|&&v| range.contains(&v)).collect();
            assert!(mine.windows(2).all(|w| w[0] < w[1]), "producer {p}");
        }
        received.sort_unstable();
        assert!(received.iter().copied().eq(0..PRODUCERS * PER_PRODUCER));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn queue_conservation(
            puts in prop::collection::vec(any::<u16>(), 0..64),
            takes in 0usize..64,
        ) {
            let queue = Queue::new();
            let takes = takes.min(puts.len());
            let (first, second) = puts.split_at(puts.len() / 2);

            let mut seen = std::thread::scope(|s| {
                s.spawn(|| first.iter().for_each(|&v| queue.enqueue(v).unwrap()));
                s.spawn(|| second.iter().for_each(|&v| queue.enqueue(v).unwrap()));
                let taker = s.spawn(|| (0..takes).map(|_| queue.dequeue()).collect::<Option<Vec<_>>>());
                taker.join().unwrap()
            }).unwrap();

            queue.close().unwrap();
            seen.extend(queue.iter());

            let mut put = puts.clone();
            put.sort_unstable();
            seen.sort_unstable();
            prop_assert_eq!(put, seen);
        }
    }
}
