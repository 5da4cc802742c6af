//! Small shared helpers.

use std::time::{SystemTime, UNIX_EPOCH};

/// Current unix timestamp in seconds. Saturates to 0 before the epoch.
pub fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamp_is_sane() {
        // 2020-01-01 as a floor; the relay does not run on time-warped hosts.
        assert!(current_timestamp() > 1_577_836_800);
    }
}
