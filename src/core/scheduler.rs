/// Channel set — the per-module deferred command scheduler.
///
/// Owns a fixed number of [`CommandChannel`]s and drains them once per
/// tick. A `ChannelSet` is a cheap shared handle: clones refer to the same
/// channels, so bound commands, fade callbacks and the director's global
/// wait can all reach the scheduler of the module that owns it.
use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::time::Duration;
use thiserror::Error;

use crate::core::channel::{CommandChannel, DeferredAction};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("channel {channel} out of range (channel count: {count})")]
    ChannelOutOfRange { channel: usize, count: usize },
}

#[derive(Debug)]
struct ChannelSetState {
    channels: Vec<CommandChannel>,
    /// True iff some channel may have work on the next tick.
    dirty: bool,
}

#[derive(Debug, Clone)]
pub struct ChannelSet {
    inner: Rc<RefCell<ChannelSetState>>,
}

/// Non-owning handle to a [`ChannelSet`]. Actions queued on a set refer
/// back to it through this, so a set dropped with pending work is freed.
#[derive(Debug, Clone)]
pub struct WeakChannelSet {
    inner: Weak<RefCell<ChannelSetState>>,
}

impl WeakChannelSet {
    pub fn upgrade(&self) -> Option<ChannelSet> {
        self.inner.upgrade().map(|inner| ChannelSet { inner })
    }
}

impl ChannelSet {
    pub fn new(channel_count: usize) -> Self {
        if channel_count == 0 {
            log::warn!("channel set created without channels; its commands will be dropped");
        }
        let channels = (0..channel_count).map(|_| CommandChannel::new()).collect();
        Self {
            inner: Rc::new(RefCell::new(ChannelSetState {
                channels,
                dirty: false,
            })),
        }
    }

    pub fn downgrade(&self) -> WeakChannelSet {
        WeakChannelSet {
            inner: Rc::downgrade(&self.inner),
        }
    }

    pub fn channel_count(&self) -> usize {
        self.inner.borrow().channels.len()
    }

    /// Append a deferred action to `channel`.
    pub fn enqueue(&self, channel: usize, action: DeferredAction) -> Result<(), SchedulerError> {
        let mut state = self.inner.borrow_mut();
        let count = state.channels.len();
        let target = state
            .channels
            .get_mut(channel)
            .ok_or(SchedulerError::ChannelOutOfRange { channel, count })?;
        target.enqueue(action);
        state.dirty = true;
        Ok(())
    }

    /// Pause `channel` for an additional `duration`.
    pub fn request_delay(&self, channel: usize, duration: Duration) -> Result<(), SchedulerError> {
        let mut state = self.inner.borrow_mut();
        let count = state.channels.len();
        let target = state
            .channels
            .get_mut(channel)
            .ok_or(SchedulerError::ChannelOutOfRange { channel, count })?;
        target.request_delay(duration);
        state.dirty = true;
        Ok(())
    }

    pub fn break_delay(&self, channel: usize) -> Result<(), SchedulerError> {
        let mut state = self.inner.borrow_mut();
        let count = state.channels.len();
        state
            .channels
            .get_mut(channel)
            .ok_or(SchedulerError::ChannelOutOfRange { channel, count })?
            .break_delay();
        Ok(())
    }

    /// Pause every channel by the same `duration`, right now.
    pub fn delay_all_channels(&self, duration: Duration) {
        let mut state = self.inner.borrow_mut();
        for channel in &mut state.channels {
            channel.request_delay(duration);
        }
        if !state.channels.is_empty() {
            state.dirty = true;
        }
    }

    /// Queue a delay at the back of every channel, so each channel pauses
    /// once the commands already queued ahead of it have run.
    pub fn queue_delay_all_channels(&self, duration: Duration) {
        for index in 0..self.channel_count() {
            let scheduler = self.downgrade();
            let action: DeferredAction = Box::new(move || {
                // Index came from channel_count; a reset never shrinks the set.
                if let Some(scheduler) = scheduler.upgrade() {
                    let _ = scheduler.request_delay(index, duration);
                }
            });
            let _ = self.enqueue(index, action);
        }
    }

    /// Release every paused channel, e.g. when an awaited effect finished.
    pub fn break_all_channels(&self) {
        let mut state = self.inner.borrow_mut();
        for channel in &mut state.channels {
            channel.break_delay();
        }
    }

    /// Empty every queue and zero every timer. Pending actions are dropped.
    pub fn reset(&self) {
        // Drop the actions after releasing the borrow: they may own handles
        // to this set.
        let drained: Vec<CommandChannel> = {
            let mut state = self.inner.borrow_mut();
            state.dirty = false;
            let count = state.channels.len();
            std::mem::replace(
                &mut state.channels,
                (0..count).map(|_| CommandChannel::new()).collect(),
            )
        };
        drop(drained);
    }

    pub fn is_dirty(&self) -> bool {
        self.inner.borrow().dirty
    }

    /// Run one scheduling pass if anything is pending.
    pub fn tick(&self, dt: Duration) {
        if self.is_dirty() {
            self.dispatch(dt);
        }
    }

    /// Run one scheduling pass over every channel, in index order.
    ///
    /// A paused channel counts down by `dt` and drains in the same pass in
    /// which its timer reaches zero. Draining runs at most the actions
    /// queued when the drain began, and stops early as soon as an action
    /// requests a delay on the draining channel (a zero delay included).
    pub fn dispatch(&self, dt: Duration) {
        let count = self.channel_count();
        for index in 0..count {
            let budget = {
                let mut state = self.inner.borrow_mut();
                let Some(channel) = state.channels.get_mut(index) else {
                    break;
                };
                if !channel.advance_pause(dt) {
                    continue;
                }
                channel.len()
            };

            for _ in 0..budget {
                let (action, generation) = {
                    let mut state = self.inner.borrow_mut();
                    let Some(channel) = state.channels.get_mut(index) else {
                        break;
                    };
                    (channel.pop_front(), channel.delay_generation())
                };
                // A reset from inside an earlier action empties the queue.
                let Some(action) = action else {
                    break;
                };

                action();

                let yielded = self
                    .inner
                    .borrow()
                    .channels
                    .get(index)
                    .map_or(true, |channel| channel.delay_generation() != generation);
                if yielded {
                    break;
                }
            }
        }

        let mut state = self.inner.borrow_mut();
        state.dirty = state.channels.iter().any(CommandChannel::has_pending_work);
    }

    pub fn is_paused(&self, channel: usize) -> bool {
        self.inner
            .borrow()
            .channels
            .get(channel)
            .is_some_and(CommandChannel::is_paused)
    }

    pub fn pause_remaining(&self, channel: usize) -> Duration {
        self.inner
            .borrow()
            .channels
            .get(channel)
            .map_or(Duration::ZERO, CommandChannel::pause_remaining)
    }

    /// Number of actions waiting in `channel`.
    pub fn pending(&self, channel: usize) -> usize {
        self.inner
            .borrow()
            .channels
            .get(channel)
            .map_or(0, CommandChannel::len)
    }

    /// True when no channel has queued actions or a running timer.
    pub fn is_idle(&self) -> bool {
        !self
            .inner
            .borrow()
            .channels
            .iter()
            .any(CommandChannel::has_pending_work)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Log = Rc<RefCell<Vec<String>>>;

    fn record(log: &Log, entry: &str) -> DeferredAction {
        let log = Rc::clone(log);
        let entry = entry.to_string();
        Box::new(move || log.borrow_mut().push(entry))
    }

    fn delay(set: &ChannelSet, channel: usize, duration: Duration) -> DeferredAction {
        let set = set.clone();
        Box::new(move || set.request_delay(channel, duration).unwrap())
    }

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    #[test]
    fn fifo_order_across_channels() {
        let log: Log = Rc::default();
        let set = ChannelSet::new(3);
        for i in 0..4 {
            for channel in 0..3 {
                set.enqueue(channel, record(&log, &format!("c{channel}-{i}")))
                    .unwrap();
            }
        }

        set.tick(Duration::ZERO);

        let entries = log.borrow();
        assert_eq!(entries.len(), 12);
        for channel in 0..3 {
            let ours: Vec<&String> = entries
                .iter()
                .filter(|e| e.starts_with(&format!("c{channel}-")))
                .collect();
            let expected: Vec<String> = (0..4).map(|i| format!("c{channel}-{i}")).collect();
            assert_eq!(ours, expected.iter().collect::<Vec<_>>());
        }
        // Channels drain in index order
        assert_eq!(entries[0], "c0-0");
        assert_eq!(entries[4], "c1-0");
        assert_eq!(entries[8], "c2-0");
    }

    #[test]
    fn additive_delays_before_first_tick() {
        let log: Log = Rc::default();
        let set = ChannelSet::new(1);
        set.request_delay(0, secs(1)).unwrap();
        set.request_delay(0, secs(2)).unwrap();
        set.enqueue(0, record(&log, "after")).unwrap();

        set.tick(secs(2));
        assert!(log.borrow().is_empty(), "max(d1, d2) must not release the channel");
        assert_eq!(set.pause_remaining(0), secs(1));

        set.tick(secs(1));
        assert_eq!(*log.borrow(), vec!["after"]);
    }

    #[test]
    fn zero_delay_yields_until_next_tick() {
        let log: Log = Rc::default();
        let set = ChannelSet::new(1);
        set.enqueue(0, record(&log, "a")).unwrap();
        set.enqueue(0, delay(&set, 0, Duration::ZERO)).unwrap();
        set.enqueue(0, record(&log, "b")).unwrap();

        set.tick(Duration::ZERO);
        assert_eq!(*log.borrow(), vec!["a"]);
        assert_eq!(set.pause_remaining(0), Duration::ZERO);
        assert!(set.is_paused(0));
        assert!(set.is_dirty());

        set.tick(Duration::ZERO);
        assert_eq!(*log.borrow(), vec!["a", "b"]);
        assert!(!set.is_dirty());
    }

    #[test]
    fn break_delay_releases_on_next_tick() {
        let log: Log = Rc::default();
        let set = ChannelSet::new(1);
        set.request_delay(0, secs(30)).unwrap();
        set.enqueue(0, record(&log, "released")).unwrap();

        set.tick(secs(1));
        assert!(log.borrow().is_empty());

        set.break_delay(0).unwrap();
        assert_eq!(set.pause_remaining(0), Duration::ZERO);
        set.tick(Duration::from_millis(16));
        assert_eq!(*log.borrow(), vec!["released"]);
    }

    #[test]
    fn actions_enqueued_while_draining_wait_for_next_tick() {
        let log: Log = Rc::default();
        let set = ChannelSet::new(1);
        let inner_set = set.clone();
        let inner_log = Rc::clone(&log);
        set.enqueue(
            0,
            Box::new(move || {
                inner_log.borrow_mut().push("outer".to_string());
                inner_set.enqueue(0, record(&inner_log, "inner")).unwrap();
            }),
        )
        .unwrap();

        set.tick(Duration::ZERO);
        assert_eq!(*log.borrow(), vec!["outer"]);
        assert!(set.is_dirty());

        set.tick(Duration::ZERO);
        assert_eq!(*log.borrow(), vec!["outer", "inner"]);
    }

    #[test]
    fn delayed_channel_does_not_block_others() {
        // channel 0: [A, delay(2s), B], channel 1: [C], ticking at 1s
        let log: Log = Rc::default();
        let set = ChannelSet::new(2);
        set.enqueue(0, record(&log, "A")).unwrap();
        set.enqueue(0, delay(&set, 0, secs(2))).unwrap();
        set.enqueue(0, record(&log, "B")).unwrap();
        set.enqueue(1, record(&log, "C")).unwrap();

        set.tick(secs(1));
        assert_eq!(*log.borrow(), vec!["A", "C"]);
        assert_eq!(set.pause_remaining(0), secs(2));

        set.tick(secs(1));
        assert_eq!(*log.borrow(), vec!["A", "C"]);
        assert_eq!(set.pause_remaining(0), secs(1));

        set.tick(secs(1));
        assert_eq!(*log.borrow(), vec!["A", "C", "B"]);
        assert!(set.is_idle());
        assert!(!set.is_dirty());
    }

    #[test]
    fn delay_all_and_break_all() {
        let set = ChannelSet::new(3);
        set.delay_all_channels(secs(4));
        for channel in 0..3 {
            assert!(set.is_paused(channel));
            assert_eq!(set.pause_remaining(channel), secs(4));
        }
        set.break_all_channels();
        for channel in 0..3 {
            assert!(!set.is_paused(channel));
        }
    }

    #[test]
    fn queued_delay_runs_after_earlier_commands() {
        let log: Log = Rc::default();
        let set = ChannelSet::new(2);
        set.enqueue(0, record(&log, "before")).unwrap();
        set.queue_delay_all_channels(secs(2));
        set.enqueue(0, record(&log, "after")).unwrap();

        set.tick(Duration::ZERO);
        assert_eq!(*log.borrow(), vec!["before"]);
        assert_eq!(set.pause_remaining(0), secs(2));
        assert_eq!(set.pause_remaining(1), secs(2));

        set.tick(secs(2));
        assert_eq!(*log.borrow(), vec!["before", "after"]);
    }

    #[test]
    fn reset_discards_pending_work() {
        let log: Log = Rc::default();
        let set = ChannelSet::new(2);
        set.enqueue(0, record(&log, "stale")).unwrap();
        set.request_delay(1, secs(5)).unwrap();
        set.reset();

        assert!(set.is_idle());
        assert!(!set.is_dirty());
        assert_eq!(set.channel_count(), 2);
        set.tick(secs(10));
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn out_of_range_channel_is_rejected() {
        let set = ChannelSet::new(1);
        assert_eq!(
            set.enqueue(1, Box::new(|| {})),
            Err(SchedulerError::ChannelOutOfRange { channel: 1, count: 1 })
        );
        assert!(set.request_delay(4, secs(1)).is_err());
        assert!(set.break_delay(4).is_err());
        assert!(!set.is_dirty());
    }

    #[test]
    fn clean_after_draining_everything() {
        let log: Log = Rc::default();
        let set = ChannelSet::new(2);
        assert!(!set.is_dirty());
        set.enqueue(1, record(&log, "x")).unwrap();
        assert!(set.is_dirty());
        set.tick(Duration::from_millis(20));
        assert!(!set.is_dirty());
        assert!(set.is_idle());
    }

    #[test]
    fn set_dropped_with_queued_delays_is_freed() {
        let set = ChannelSet::new(2);
        set.queue_delay_all_channels(secs(1));
        assert_eq!(set.pending(0), 1);

        let weak = set.downgrade();
        assert!(weak.upgrade().is_some());
        drop(set);
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn zero_channel_set_ignores_fan_out() {
        let set = ChannelSet::new(0);
        set.delay_all_channels(secs(1));
        set.queue_delay_all_channels(secs(1));
        set.break_all_channels();
        assert!(!set.is_dirty());
        assert!(set.is_idle());
    }
}
