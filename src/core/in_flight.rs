use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// System-wide "a classification is running" flag.
#[derive(Default)]
pub struct InFlight {
    flag: AtomicBool,
    released: Notify,
}

impl InFlight {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn is_set(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// Atomic check-and-set. Returns `None` if another holder exists.
    pub fn try_acquire(self: &Arc<Self>) -> Option<InFlightGuard> {
        self.flag
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlightGuard { owner: self.clone() })
    }

    /// Wait until the flag can be taken.
    pub async fn acquire(self: &Arc<Self>) -> InFlightGuard {
        loop {
            // Registered before the check so a release in between is not lost
            let released = self.released.notified();
            if let Some(guard) = self.try_acquire() {
                return guard;
            }
            released.await;
        }
    }
}

/// Clears the flag exactly once when dropped, including on panic unwind.
pub struct InFlightGuard {
    owner: Arc<InFlight>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.owner.flag.store(false, Ordering::Release);
        self.owner.released.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn second_acquire_fails_while_held() {
        let flag = InFlight::new();
        let guard = flag.try_acquire().expect("first acquire");
        assert!(flag.is_set());
        assert!(flag.try_acquire().is_none());
        drop(guard);
        assert!(!flag.is_set());
        assert!(flag.try_acquire().is_some());
    }

    #[test]
    fn released_on_panic() {
        let flag = InFlight::new();
        let inner = flag.clone();
        let result = std::thread::spawn(move || {
            let _guard = inner.try_acquire().unwrap();
            panic!("classifier blew up");
        })
        .join();
        assert!(result.is_err());
        assert!(!flag.is_set());
    }

    #[tokio::test]
    async fn waiter_runs_after_release() {
        let flag = InFlight::new();
        let guard = flag.try_acquire().unwrap();

        let waiter = {
            let flag = flag.clone();
            tokio::spawn(async move {
                let _guard = flag.acquire().await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());
        drop(guard);

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should be woken")
            .unwrap();
        assert!(!flag.is_set());
    }
}
