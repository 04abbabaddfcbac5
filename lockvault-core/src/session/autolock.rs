//! Inactivity deadline for an unlocked session.

use std::time::{Duration, Instant};

/// Tracks when an unlocked session must lock itself.
///
/// The deadline is armed on unlock, pushed back by activity and cleared on
/// lock. While disarmed nothing expires.
#[derive(Debug, Clone)]
pub struct AutoLockManager {
    deadline: Option<Instant>,
    timeout: Duration,
}

impl AutoLockManager {
    pub fn new(timeout: Duration) -> Self {
        Self {
            deadline: None,
            timeout,
        }
    }

    /// Start or restart the deadline
    pub fn record_activity(&mut self) {
        self.deadline = Some(Instant::now() + self.timeout);
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    #[cfg(test)]
    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    /// Check if the deadline has passed
    pub fn should_lock(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    #[cfg(test)]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Time left before locking; `None` while disarmed
    #[cfg(test)]
    pub fn time_until_lock(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_disarmed_never_locks() {
        let manager = AutoLockManager::new(Duration::from_millis(1));
        thread::sleep(Duration::from_millis(10));
        assert!(!manager.should_lock());
        assert!(manager.time_until_lock().is_none());
    }

    #[test]
    fn test_auto_lock_timeout() {
        let mut manager = AutoLockManager::new(Duration::from_millis(100));
        manager.record_activity();

        // Should not lock immediately
        assert!(!manager.should_lock());

        thread::sleep(Duration::from_millis(150));
        assert!(manager.should_lock());
        assert_eq!(manager.time_until_lock(), Some(Duration::ZERO));
    }

    #[test]
    fn test_activity_resets_timer() {
        // Wide margins for slow CI runners
        let mut manager = AutoLockManager::new(Duration::from_millis(250));
        manager.record_activity();

        thread::sleep(Duration::from_millis(150));
        manager.record_activity();

        thread::sleep(Duration::from_millis(150));
        assert!(!manager.should_lock());

        thread::sleep(Duration::from_millis(200));
        assert!(manager.should_lock());
    }

    #[test]
    fn test_cancel() {
        let mut manager = AutoLockManager::new(Duration::from_millis(10));
        manager.record_activity();
        assert!(manager.is_armed());

        manager.cancel();
        thread::sleep(Duration::from_millis(30));
        assert!(!manager.should_lock());
        assert!(!manager.is_armed());
    }
}
