use std::sync::Arc;
use std::time::Duration;

/// Maps a reconnect attempt count to the delay before the next attempt.
/// Attempt counts reset to zero on every successful open.
pub type Backoff = Arc<dyn Fn(u32) -> Duration + Send + Sync>;

const BACKOFF_CAP: Duration = Duration::from_secs(30);

/// Default reconnect delay: immediate first retry, then exponential
/// doubling from one second up to a 30s cap.
pub fn default_backoff() -> Backoff {
    Arc::new(|attempt| {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let exp = attempt.min(5);
        Duration::from_millis(1000u64 << exp).min(BACKOFF_CAP)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_retry_is_immediate() {
        let backoff = default_backoff();
        assert_eq!(backoff(0), Duration::ZERO);
    }

    #[test]
    fn doubles_then_caps() {
        let backoff = default_backoff();
        assert_eq!(backoff(1), Duration::from_secs(2));
        assert_eq!(backoff(2), Duration::from_secs(4));
        assert_eq!(backoff(4), Duration::from_secs(16));
        assert_eq!(backoff(5), Duration::from_secs(30));
        assert_eq!(backoff(60), Duration::from_secs(30));
    }
}
