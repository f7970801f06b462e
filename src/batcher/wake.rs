//! Edge-triggered wake signal for the worker thread.

use parking_lot::{Condvar, Mutex};

/// A binary wake signal.
///
/// Multiple raises coalesce into a single wake. That is safe here because
/// the worker drains the queues up to the batch cap on every cycle, so a
/// coalesced signal never strands work; the worker re-raises the signal
/// itself when a cycle leaves residue behind.
#[derive(Default)]
pub(crate) struct WakeSignal {
    raised: Mutex<bool>,
    condvar: Condvar,
}

impl WakeSignal {
    /// Raise the signal, waking the worker if it is waiting.
    pub fn raise(&self) {
        let mut raised = self.raised.lock();
        *raised = true;
        self.condvar.notify_one();
    }

    /// Block until the signal is raised, then consume it.
    pub fn wait(&self) {
        let mut raised = self.raised.lock();
        while !*raised {
            self.condvar.wait(&mut raised);
        }
        *raised = false;
    }

    #[cfg(test)]
    pub fn is_raised(&self) -> bool {
        *self.raised.lock()
    }
}
