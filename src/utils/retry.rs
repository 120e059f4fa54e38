//! Retry utilities: backoff builders.
//!
//! Uses `backon` for exponential backoff with jitter.

use std::time::Duration;

use backon::ExponentialBuilder;

/// Backoff between failed receives in a consume loop.
///
/// - Min delay: 100ms
/// - Max delay: 30s
/// - Jitter enabled
///
/// Callers fall back to the max delay once the iterator is exhausted.
pub fn receive_backoff() -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_millis(100))
        .with_max_delay(Duration::from_secs(30))
        .with_max_times(16)
        .with_jitter()
}

/// Backoff for inline retries of transient search-index failures.
///
/// - Min delay: 50ms
/// - Max delay: 2s
/// - Retries: `max_attempts - 1`
/// - Jitter enabled
pub fn index_backoff(max_attempts: usize) -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_millis(50))
        .with_max_delay(Duration::from_secs(2))
        .with_max_times(max_attempts.saturating_sub(1))
        .with_jitter()
}

#[cfg(test)]
mod tests {
    use super::*;
    use backon::BackoffBuilder;

    #[test]
    fn test_index_backoff_yields_attempts_minus_one_delays() {
        assert_eq!(index_backoff(3).build().count(), 2);
        assert_eq!(index_backoff(1).build().count(), 0);
        assert_eq!(index_backoff(0).build().count(), 0);
    }

    #[test]
    fn test_receive_backoff_is_capped() {
        for delay in receive_backoff().build() {
            // Jitter may add up to one extra min-delay-sized step.
            assert!(delay <= Duration::from_secs(60));
        }
    }
}
