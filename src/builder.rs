//! Configuration for the owner threads behind each primitive.

use std::sync::Arc;
use std::thread;
use crate::broadcast::Broadcast;
use crate::deque::Deque;
use crate::error::{Error, Result};
use crate::queue::Queue;
use crate::value::ValueCell;

const DEFAULT_NAME: &str = "share";

/// A builder used to configure and spawn the owner thread of a primitive.
///
/// ```
/// use share_owned::Builder;
///
/// let queue = Builder::new().name("jobs").queue::<u32>().unwrap();
/// queue.enqueue(7).unwrap();
/// assert_eq!(queue.dequeue(), Some(7));
/// queue.close().unwrap();
/// ```
#[derive(Clone, Debug, Default)]
pub struct Builder {
    name: Option<String>,
    stack_size: Option<usize>,
}

impl Builder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the prefix of the owner thread names. Threads are named `<prefix>-<role>`, e.g.
    /// `jobs-queue`. The default prefix is `share`.
    pub fn name<N: Into<String>>(self, name: N) -> Self {
        Self {
            name: Some(name.into()),
            ..self
        }
    }

    /// Sets the stack size of every thread spawned for the primitive.
    pub fn stack_size(self, size: usize) -> Self {
        Self {
            stack_size: Some(size),
            ..self
        }
    }

    pub fn queue<T: Send + 'static>(self) -> Result<Queue<T>> {
        Queue::with_builder(self)
    }

    pub fn deque<T: Send + 'static>(self) -> Result<Deque<T>> {
        Deque::with_builder(self)
    }

    pub fn value<T>(self) -> Result<ValueCell<T>>
    where
        T: Clone + Send + Sync + 'static,
    {
        ValueCell::with_builder(self)
    }

    pub fn broadcast<T>(self, items: impl Into<Arc<[T]>>) -> Result<Broadcast<T>>
    where
        T: Clone + Send + Sync + 'static,
    {
        Broadcast::with_builder(self, items)
    }

    pub(crate) fn thread_name(&self, role: &str) -> String {
        format!("{}-{role}", self.name.as_deref().unwrap_or(DEFAULT_NAME))
    }

    /// Spawn a detached thread for `role`.
    pub(crate) fn spawn<F>(&self, role: &str, f: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let name = self.thread_name(role);
        let mut builder = thread::Builder::new().name(name);
        if let Some(size) = self.stack_size {
            builder = builder.stack_size(size);
        }
        builder.spawn(f).map_err(Error::Spawn)?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crossbeam_channel::bounded;

    #[test]
    fn builder_names() {
        assert_eq!(Builder::new().thread_name("queue"), "share-queue");
        assert_eq!(Builder::new().name("jobs").thread_name("deque"), "jobs-deque");
    }

    #[test]
    fn builder_spawn() {
        let (tx, rx) = bounded(1);
        Builder::new()
            .name("named")
            .stack_size(256 * 1024)
            .spawn("test", move || {
                let _ = tx.send(thread::current().name().map(String::from));
            })
            .unwrap();
        assert_eq!(rx.recv().unwrap().as_deref(), Some("named-test"));
    }
}
