//! One-shot close gate shared by all handles of a primitive.
//!
//! Every send into an owner thread happens while holding a [`Pass`]. Closing flips the high bit
//! of the state word and then waits for outstanding passes to be returned, so anything sent
//! through a pass is ordered before the close signal the caller sends afterwards.

use core::sync::atomic::{AtomicUsize, Ordering};
use crossbeam_utils::Backoff;
use crate::error::{Error, Result};

const CLOSED: usize = 1 << (usize::BITS - 1);

pub(crate) struct Gate {
    state: AtomicUsize,
}

/// Proof that the gate was open when the holder entered it.
pub(crate) struct Pass<'a> {
    gate: &'a Gate,
}

impl Gate {
    pub const fn new() -> Self {
        Self { state: AtomicUsize::new(0) }
    }

    pub fn enter(&self) -> Result<Pass<'_>> {
        let prev = self.state.fetch_add(1, Ordering::Acquire);
        if prev & CLOSED != 0 {
            self.state.fetch_sub(1, Ordering::Release);
            return Err(Error::Closed);
        }
        Ok(Pass { gate: self })
    }

    /// Shut the gate and wait until every pass handed out before it has been dropped.
    ///
    /// Passes must only be held across sends to an owner thread that is always ready to receive
    /// them, otherwise this never returns.
    pub fn close(&self) -> Result<()> {
        let prev = self.state.fetch_or(CLOSED, Ordering::AcqRel);
        if prev & CLOSED != 0 {
            return Err(Error::AlreadyClosed);
        }

        let backoff = Backoff::new();
        while self.state.load(Ordering::Acquire) & !CLOSED != 0 {
            backoff.snooze();
        }
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.state.load(Ordering::Acquire) & CLOSED != 0
    }
}

impl Drop for Pass<'_> {
    fn drop(&mut self) {
        self.gate.state.fetch_sub(1, Ordering::Release);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;

    #[test]
    fn gate_smoke() {
        let gate = Gate::new();
        assert!(!gate.is_closed());
        {
            let _a = gate.enter().unwrap();
            let _b = gate.enter().unwrap();
        }
        gate.close().unwrap();
        assert!(gate.is_closed());
        assert!(matches!(gate.enter(), Err(Error::Closed)));
        assert!(matches!(gate.close(), Err(Error::AlreadyClosed)));
    }

    #[test]
    fn gate_waits_for_passes() {
        let gate = Gate::new();
        let released = AtomicBool::new(false);

        std::thread::scope(|s| {
            let pass = gate.enter().unwrap();
            s.spawn(|| {
                gate.close().unwrap();
                assert!(released.load(Ordering::SeqCst));
            });
            std::thread::sleep(Duration::from_millis(20));
            released.store(true, Ordering::SeqCst);
            drop(pass);
        });
        assert!(gate.is_closed());
    }
}
