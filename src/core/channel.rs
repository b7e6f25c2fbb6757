/// Command channel — an ordered queue of deferred actions with its own
/// pause timer.
use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

/// A captured command, run later by the scheduler.
pub type DeferredAction = Box<dyn FnOnce()>;

/// One independently paced queue of deferred actions.
///
/// `is_paused` is tracked next to `pause_remaining` so that a zero-length
/// delay still suppresses draining for the rest of the current pass.
#[derive(Default)]
pub struct CommandChannel {
    queue: VecDeque<DeferredAction>,
    pause_remaining: Duration,
    is_paused: bool,
    /// Bumped on every delay request; lets a drain notice a yield.
    delay_generation: u64,
}

impl CommandChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, action: DeferredAction) {
        self.queue.push_back(action);
    }

    /// Add `duration` to the pause. Requests accumulate.
    pub fn request_delay(&mut self, duration: Duration) {
        self.pause_remaining += duration;
        self.is_paused = true;
        self.delay_generation = self.delay_generation.wrapping_add(1);
    }

    /// Cancel any pause immediately.
    pub fn break_delay(&mut self) {
        self.pause_remaining = Duration::ZERO;
        self.is_paused = false;
    }

    /// Drop every queued action and zero the timer.
    pub fn clear(&mut self) {
        self.queue.clear();
        self.break_delay();
    }

    /// Count down the pause by `dt`. Returns true when the channel is free
    /// to drain this tick, including the tick in which the timer expires.
    pub(crate) fn advance_pause(&mut self, dt: Duration) -> bool {
        if !self.is_paused {
            return true;
        }
        self.pause_remaining = self.pause_remaining.saturating_sub(dt);
        if self.pause_remaining.is_zero() {
            self.is_paused = false;
            true
        } else {
            false
        }
    }

    pub(crate) fn pop_front(&mut self) -> Option<DeferredAction> {
        self.queue.pop_front()
    }

    pub(crate) fn delay_generation(&self) -> u64 {
        self.delay_generation
    }

    pub fn is_paused(&self) -> bool {
        self.is_paused
    }

    pub fn pause_remaining(&self) -> Duration {
        self.pause_remaining
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// True if the channel may have work on a future tick.
    pub fn has_pending_work(&self) -> bool {
        self.is_paused || !self.queue.is_empty()
    }
}

impl fmt::Debug for CommandChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandChannel")
            .field("queued", &self.queue.len())
            .field("pause_remaining", &self.pause_remaining)
            .field("is_paused", &self.is_paused)
            .finish()
    }
}
