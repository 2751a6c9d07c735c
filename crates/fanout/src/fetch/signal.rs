use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;

/// One-shot broadcast: fires once, stays fired, wakes every waiter.
#[derive(Debug, Default)]
pub struct CancelSignal {
    fired: AtomicBool,
    notify: Notify,
}

impl CancelSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` only for the call that actually fired the signal.
    pub fn fire(&self) -> bool {
        if self.fired.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.notify.notify_waiters();
        true
    }

    pub fn is_fired(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }

    /// Resolves once the signal has fired. Safe to use as a `select!` branch.
    pub async fn fired(&self) {
        let notified = self.notify.notified();
        tokio::pin!(notified);
        // register before checking the flag, otherwise a fire in between is lost
        notified.as_mut().enable();
        if self.is_fired() {
            return;
        }
        notified.await;
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use super::*;

    #[tokio::test]
    async fn test_fire_is_idempotent_under_contention() {
        let signal = Arc::new(CancelSignal::new());
        let mut handles = Vec::new();
        for _ in 0..16 {
            let signal = signal.clone();
            handles.push(tokio::spawn(async move { signal.fire() }));
        }

        let mut winners = 0;
        for h in handles {
            if h.await.unwrap() {
                winners += 1;
            }
        }

        assert_eq!(winners, 1);
        assert!(signal.is_fired());
        assert!(!signal.fire());
    }

    #[tokio::test]
    async fn test_waiters_registered_before_fire_are_woken() {
        let signal = Arc::new(CancelSignal::new());
        let mut waiters = Vec::new();
        for _ in 0..4 {
            let signal = signal.clone();
            waiters.push(tokio::spawn(async move { signal.fired().await }));
        }
        tokio::task::yield_now().await;

        signal.fire();
        for w in waiters {
            tokio::time::timeout(Duration::from_secs(1), w)
                .await
                .expect("waiter should observe the fired signal")
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_fired_returns_immediately_after_fire() {
        let signal = CancelSignal::new();
        signal.fire();
        tokio::time::timeout(Duration::from_millis(50), signal.fired())
            .await
            .expect("already fired");
    }
}
