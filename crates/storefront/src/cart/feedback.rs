//! Transient "added to cart" signal.
//!
//! Raised on every successful add, cleared automatically after a fixed delay
//! or explicitly through [`AddedFeedback::dismiss`]. The auto-clear is an owned
//! task that is aborted on dismissal and on re-raise, so a stale timer never
//! closes a newer signal.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Default display time of the feedback signal.
pub const DEFAULT_FEEDBACK_DURATION: Duration = Duration::from_millis(3000);

/// The feedback flag plus its auto-clear timer.
#[derive(Debug)]
pub struct AddedFeedback {
    visible: Arc<watch::Sender<bool>>,
    timer: Mutex<Option<JoinHandle<()>>>,
    duration: Duration,
}

impl Default for AddedFeedback {
    fn default() -> Self {
        Self::new(DEFAULT_FEEDBACK_DURATION)
    }
}

impl AddedFeedback {
    #[must_use]
    pub fn new(duration: Duration) -> Self {
        let (visible, _) = watch::channel(false);
        Self {
            visible: Arc::new(visible),
            timer: Mutex::new(None),
            duration,
        }
    }

    /// Whether the feedback should be shown.
    #[must_use]
    pub fn is_visible(&self) -> bool {
        *self.visible.borrow()
    }

    /// Follow visibility changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.visible.subscribe()
    }

    /// Show the feedback and (re)start the auto-clear timer.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn raise(&self) {
        self.visible.send_replace(true);

        let visible = Arc::clone(&self.visible);
        let duration = self.duration;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            visible.send_replace(false);
        });

        if let Some(previous) = self.swap_timer(Some(handle)) {
            previous.abort();
        }
    }

    /// Hide the feedback now and cancel the pending auto-clear.
    pub fn dismiss(&self) {
        if let Some(previous) = self.swap_timer(None) {
            previous.abort();
        }
        self.visible.send_replace(false);
    }

    fn swap_timer(&self, next: Option<JoinHandle<()>>) -> Option<JoinHandle<()>> {
        match self.timer.lock() {
            Ok(mut timer) => std::mem::replace(&mut *timer, next),
            Err(poisoned) => std::mem::replace(&mut *poisoned.into_inner(), next),
        }
    }
}

impl Drop for AddedFeedback {
    fn drop(&mut self) {
        if let Some(timer) = self.swap_timer(None) {
            timer.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_auto_clears_after_duration() {
        let feedback = AddedFeedback::new(Duration::from_millis(3000));
        feedback.raise();
        assert!(feedback.is_visible());

        tokio::time::sleep(Duration::from_millis(2999)).await;
        assert!(feedback.is_visible());

        tokio::time::sleep(Duration::from_millis(2)).await;
        assert!(!feedback.is_visible());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reraise_restarts_timer() {
        let feedback = AddedFeedback::new(Duration::from_millis(3000));
        feedback.raise();

        tokio::time::sleep(Duration::from_millis(2000)).await;
        feedback.raise();

        // The first timer would have fired here
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(feedback.is_visible());

        tokio::time::sleep(Duration::from_millis(1600)).await;
        assert!(!feedback.is_visible());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dismiss_cancels_timer() {
        let feedback = AddedFeedback::new(Duration::from_millis(3000));
        let mut rx = feedback.subscribe();

        feedback.raise();
        feedback.dismiss();
        assert!(!feedback.is_visible());

        // A later raise is not cut short by the cancelled timer
        tokio::time::sleep(Duration::from_millis(1000)).await;
        feedback.raise();
        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert!(feedback.is_visible());
        assert!(*rx.borrow_and_update());
    }
}
