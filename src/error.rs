pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The primitive was closed before this operation was issued, or while it waited.
    #[error("operation on a closed primitive")]
    Closed,
    /// `close` was called more than once on the same primitive.
    #[error("primitive was already closed")]
    AlreadyClosed,
    /// The owner thread could not be started.
    #[error("failed to spawn owner thread")]
    Spawn(#[source] std::io::Error),
}

impl Error {
    /// Return true if this error means the primitive has been closed.
    pub fn is_closed(&self) -> bool {
        matches!(self, Error::Closed | Error::AlreadyClosed)
    }
}
