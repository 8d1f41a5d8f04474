use std::time::{Duration, Instant};

use log::{info, warn};

use crate::gateway::{GatewayError, TreeGateway};
use crate::interaction::{AppState, Effect};

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_secs(2);
pub const DEFAULT_PERIODIC: Duration = Duration::from_secs(15);

pub const STATUS_SAVED: &str = "Saved";
pub const STATUS_SAVE_FAILED: &str = "Failed to save tree";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveTrigger {
    Debounce,
    Periodic,
}

/// Debounce timer restarted by every edit plus a periodic sweep. Time is
/// passed in; the scheduler never reads a clock.
#[derive(Debug, Clone)]
pub struct AutosaveScheduler {
    debounce: Duration,
    periodic: Duration,
    debounce_deadline: Option<Instant>,
    next_sweep: Instant,
    seen_revision: u64,
}

impl AutosaveScheduler {
    pub fn new(debounce: Duration, periodic: Duration, now: Instant) -> Self {
        Self {
            debounce,
            periodic,
            debounce_deadline: None,
            next_sweep: now + periodic,
            seen_revision: 0,
        }
    }

    /// Records the state's revision. A revision not seen before restarts the
    /// debounce window.
    pub fn observe(&mut self, revision: u64, now: Instant) {
        if revision != self.seen_revision {
            self.seen_revision = revision;
            self.debounce_deadline = Some(now + self.debounce);
        }
    }

    /// Forgets a pending debounce, e.g. after an explicit save.
    pub fn cancel_debounce(&mut self) {
        self.debounce_deadline = None;
    }

    /// Returns the timer that fired at `now`, if any. Firing consumes the
    /// debounce and re-arms the sweep.
    pub fn poll(&mut self, now: Instant) -> Option<SaveTrigger> {
        if self.debounce_deadline.is_some_and(|deadline| now >= deadline) {
            self.debounce_deadline = None;
            return Some(SaveTrigger::Debounce);
        }
        if now >= self.next_sweep {
            self.next_sweep = now + self.periodic;
            return Some(SaveTrigger::Periodic);
        }
        None
    }

    /// Earliest moment at which `poll` can fire.
    pub fn next_deadline(&self) -> Instant {
        match self.debounce_deadline {
            Some(deadline) => deadline.min(self.next_sweep),
            None => self.next_sweep,
        }
    }

    pub fn debounce_pending(&self) -> bool {
        self.debounce_deadline.is_some()
    }
}

/// Result of a flush attempt.
#[derive(Debug)]
pub enum FlushOutcome {
    /// Nothing to save.
    Clean,
    Saved,
    /// The gateway failed; the document stays dirty and in memory.
    Failed(GatewayError),
}

/// Saves the open tree when it has unsaved changes. The current viewport is
/// stored into the document first. On failure the dirty flag stays set so the
/// next trigger retries.
pub fn flush_if_dirty<G: TreeGateway>(
    state: &mut AppState,
    gateway: &mut G,
    effects: &mut Vec<Effect>,
) -> FlushOutcome {
    if !state.is_dirty() {
        return FlushOutcome::Clean;
    }
    let Some(tree) = state.snapshot() else {
        return FlushOutcome::Clean;
    };
    match gateway.replace_tree(&tree.id, &tree.name, &tree.data) {
        Ok(()) => {
            state.mark_clean();
            info!("event=save module=autosave status=ok id={}", tree.id);
            effects.push(state.set_status(STATUS_SAVED));
            FlushOutcome::Saved
        }
        Err(err) => {
            warn!("event=save module=autosave status=failed id={} error={err}", tree.id);
            effects.push(state.set_status(STATUS_SAVE_FAILED));
            FlushOutcome::Failed(err)
        }
    }
}
