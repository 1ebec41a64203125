//! Concurrency gate bounding the number of simulator processes alive at once.
//!
//! RULES:
//!   - `active` never exceeds `max_active`.
//!   - Two FIFO queues. A freed slot goes to the oldest foreground waiter,
//!     and only when none is waiting to the oldest background waiter.
//!   - A holder is never preempted; priority only decides admission order.
//!   - Slots are handed over under the lock, so a released slot is never
//!     stolen by a caller that arrived after the queued waiters.

use crate::types::Priority;
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::Duration;

/// How often a cancellable waiter re-checks its token.
const CANCEL_POLL: Duration = Duration::from_millis(20);

/// Shared flag that aborts every job of a batch once fired.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    fired: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.fired.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Default)]
struct GateState {
    active:      usize,
    next_ticket: u64,
    foreground:  VecDeque<u64>,
    background:  VecDeque<u64>,
    /// Tickets that were handed a slot but have not woken up yet.
    admitted:    HashSet<u64>,
}

impl GateState {
    fn queue_mut(&mut self, priority: Priority) -> &mut VecDeque<u64> {
        match priority {
            Priority::Foreground => &mut self.foreground,
            Priority::Background => &mut self.background,
        }
    }

    fn waiting(&self) -> usize {
        self.foreground.len() + self.background.len()
    }

    /// Give free slots to queued tickets, foreground first.
    fn admit_waiters(&mut self, max_active: usize) -> bool {
        let mut admitted_any = false;
        while self.active < max_active {
            let Some(ticket) = self.foreground.pop_front().or_else(|| self.background.pop_front()) else {
                break;
            };
            self.active += 1;
            self.admitted.insert(ticket);
            admitted_any = true;
        }
        admitted_any
    }
}

#[derive(Debug)]
pub struct ConcurrencyGate {
    max_active: usize,
    state:      Mutex<GateState>,
    wakeup:     Condvar,
}

impl ConcurrencyGate {
    pub fn new(max_active: usize) -> Self {
        Self {
            max_active: max_active.max(1),
            state:      Mutex::new(GateState::default()),
            wakeup:     Condvar::new(),
        }
    }

    pub fn max_active(&self) -> usize {
        self.max_active
    }

    pub fn active(&self) -> usize {
        self.lock().active
    }

    pub fn waiting(&self) -> usize {
        self.lock().waiting()
    }

    /// Block until a slot is free, then hold it until the permit drops.
    pub fn acquire(&self, priority: Priority) -> GatePermit<'_> {
        let mut state = self.lock();
        let Some(ticket) = self.try_enter(&mut state, priority) else {
            return GatePermit { gate: self };
        };
        while !state.admitted.remove(&ticket) {
            state = self.wakeup.wait(state).unwrap_or_else(|p| p.into_inner());
        }
        GatePermit { gate: self }
    }

    /// Like `acquire`, but gives up once `cancel` fires. A waiter that gives
    /// up leaves its queue; a slot handed to it in the meantime is passed on.
    pub fn acquire_cancellable(&self, priority: Priority, cancel: &CancelToken) -> Option<GatePermit<'_>> {
        let mut state = self.lock();
        if cancel.is_cancelled() {
            return None;
        }
        let Some(ticket) = self.try_enter(&mut state, priority) else {
            return Some(GatePermit { gate: self });
        };
        loop {
            if state.admitted.remove(&ticket) {
                if cancel.is_cancelled() {
                    drop(state);
                    self.release();
                    return None;
                }
                return Some(GatePermit { gate: self });
            }
            if cancel.is_cancelled() {
                state.queue_mut(priority).retain(|t| *t != ticket);
                return None;
            }
            state = self
                .wakeup
                .wait_timeout(state, CANCEL_POLL)
                .map(|(guard, _)| guard)
                .unwrap_or_else(|p| p.into_inner().0);
        }
    }

    /// Take a free slot immediately, or enqueue and return the ticket to wait on.
    fn try_enter(&self, state: &mut GateState, priority: Priority) -> Option<u64> {
        if state.active < self.max_active && state.waiting() == 0 {
            state.active += 1;
            return None;
        }
        let ticket = state.next_ticket;
        state.next_ticket += 1;
        state.queue_mut(priority).push_back(ticket);
        log::debug!(
            "gate: {} job queued (active={}, waiting={})",
            priority.name(),
            state.active,
            state.waiting()
        );
        Some(ticket)
    }

    fn release(&self) {
        let mut state = self.lock();
        state.active = state.active.saturating_sub(1);
        if state.admit_waiters(self.max_active) {
            self.wakeup.notify_all();
        }
    }

    fn lock(&self) -> MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }
}

/// A held gate slot. Dropping it releases the slot on every exit path.
#[derive(Debug)]
pub struct GatePermit<'a> {
    gate: &'a ConcurrencyGate,
}

impl Drop for GatePermit<'_> {
    fn drop(&mut self) {
        self.gate.release();
    }
}
