//! Time source injected into the sync engine

/// Source of "now" for the coordinator and retry scheduling.
///
/// Injected rather than ambient so tests control backoff windows and
/// timestamps deterministically.
pub trait Clock: Send + Sync {
    /// Current time as Unix milliseconds.
    fn now_millis(&self) -> i64;
}

/// Wall-clock implementation used in production.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_clock_advances() {
        let clock = SystemClock;
        let a = clock.now_millis();
        assert!(a > 0);
        assert!(clock.now_millis() >= a);
    }
}
