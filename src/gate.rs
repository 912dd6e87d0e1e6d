use std::time::{Duration, SystemTime};

/// Interval used when neither the command nor the configuration sets one.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(3600);

/// Decides whether a command whose last successful run was at `last_run`
/// should run again at `now`.
///
/// A zero interval or `force` always makes the command due. A `last_run` in
/// the future (clock skew, or an mtime set by hand) counts as having run just
/// now.
pub fn is_due(last_run: SystemTime, interval: Duration, now: SystemTime, force: bool) -> bool {
    if force || interval.is_zero() {
        return true;
    }

    let elapsed = now.duration_since(last_run).unwrap_or(Duration::ZERO);
    elapsed >= interval
}
