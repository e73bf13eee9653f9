//! Named one-shot timers for the session event loop.
//!
//! Timers are keyed by purpose: re-arming a purpose replaces its pending
//! entry, and expirations are delivered back into the loop in deadline order.

use std::collections::HashMap;
use std::time::Duration;

use tokio_util::time::DelayQueue;
use tokio_util::time::delay_queue::Key;
use tv_bridge_types::RemoteKey;

/// Identifies what a pending timer is for.
///
/// Token-carrying variants ([`TimerPurpose::RetryPoll`],
/// [`TimerPurpose::AdvanceAfterFailure`]) deliberately embed the retry token
/// they were scheduled under: a superseded entry still fires and the handler
/// turns it into a no-op by comparing tokens.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) enum TimerPurpose {
    /// Controls-menu inactivity auto-hide.
    MenuAutoHide,
    /// Long-press threshold for a held key.
    LongPress(RemoteKey),
    /// Next cold-storage readiness poll.
    RetryPoll { retry_id: u64 },
    /// Delayed auto-advance after retry exhaustion.
    AdvanceAfterFailure { retry_id: u64 },
    /// Give up waiting for the first track-list event of a load.
    TrackSelectTimeout { load_seq: u64 },
}

pub(crate) struct TimerWheel {
    queue: DelayQueue<TimerPurpose>,
    keys: HashMap<TimerPurpose, Key>,
}

impl TimerWheel {
    pub(crate) fn new() -> Self {
        Self {
            queue: DelayQueue::new(),
            keys: HashMap::new(),
        }
    }

    /// Schedule `purpose` after `delay`, replacing any pending entry for the
    /// same purpose.
    pub(crate) fn arm(&mut self, purpose: TimerPurpose, delay: Duration) {
        if let Some(key) = self.keys.remove(&purpose) {
            self.queue.remove(&key);
        }
        let key = self.queue.insert(purpose, delay);
        self.keys.insert(purpose, key);
    }

    /// Drop the pending entry for `purpose`, if any.
    pub(crate) fn cancel(&mut self, purpose: &TimerPurpose) {
        if let Some(key) = self.keys.remove(purpose) {
            self.queue.remove(&key);
        }
    }

    /// Drop every pending timer.
    pub(crate) fn clear(&mut self) {
        self.queue.clear();
        self.keys.clear();
    }

    /// Await the next expiration; resolves to `None` while the wheel is empty.
    pub(crate) async fn next(&mut self) -> Option<TimerPurpose> {
        let expired = std::future::poll_fn(|cx| self.queue.poll_expired(cx)).await;
        match expired {
            Some(entry) => {
                let purpose = entry.into_inner();
                self.keys.remove(&purpose);
                Some(purpose)
            }
            None => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{self, Duration};

    #[tokio::test(start_paused = true)]
    async fn fires_in_deadline_order() {
        let mut wheel = TimerWheel::new();
        wheel.arm(TimerPurpose::MenuAutoHide, Duration::from_millis(400));
        wheel.arm(
            TimerPurpose::RetryPoll { retry_id: 1 },
            Duration::from_millis(100),
        );

        time::advance(Duration::from_millis(500)).await;
        assert_eq!(
            wheel.next().await,
            Some(TimerPurpose::RetryPoll { retry_id: 1 })
        );
        assert_eq!(wheel.next().await, Some(TimerPurpose::MenuAutoHide));
        assert_eq!(wheel.next().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn rearming_replaces_the_pending_entry() {
        let mut wheel = TimerWheel::new();
        wheel.arm(TimerPurpose::MenuAutoHide, Duration::from_millis(100));
        wheel.arm(TimerPurpose::MenuAutoHide, Duration::from_millis(800));

        // The 100 ms deadline was replaced, so nothing is due yet.
        time::advance(Duration::from_millis(200)).await;
        assert!(time::timeout(Duration::ZERO, wheel.next()).await.is_err());

        time::advance(Duration::from_millis(700)).await;
        assert_eq!(wheel.next().await, Some(TimerPurpose::MenuAutoHide));
        assert_eq!(wheel.next().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_timers_never_fire() {
        let mut wheel = TimerWheel::new();
        wheel.arm(
            TimerPurpose::LongPress(RemoteKey::Center),
            Duration::from_millis(450),
        );
        wheel.cancel(&TimerPurpose::LongPress(RemoteKey::Center));

        time::advance(Duration::from_millis(1_000)).await;
        assert_eq!(wheel.next().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn distinct_tokens_are_distinct_entries() {
        let mut wheel = TimerWheel::new();
        wheel.arm(
            TimerPurpose::RetryPoll { retry_id: 1 },
            Duration::from_millis(100),
        );
        wheel.arm(
            TimerPurpose::RetryPoll { retry_id: 2 },
            Duration::from_millis(200),
        );

        time::advance(Duration::from_millis(300)).await;
        assert_eq!(
            wheel.next().await,
            Some(TimerPurpose::RetryPoll { retry_id: 1 })
        );
        assert_eq!(
            wheel.next().await,
            Some(TimerPurpose::RetryPoll { retry_id: 2 })
        );
    }
}
