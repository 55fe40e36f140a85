// A simple module to define the time types used in the project
//
// Transaction and block timestamps are f64 unix seconds so that they
// serialize identically on every node. Liveness tracking uses whole seconds.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

// Seconds timestamps used to determine it using its type
pub type TimestampSeconds = u64;

#[inline]
pub fn get_current_time() -> Duration {
    let start = SystemTime::now();

    start
        .duration_since(UNIX_EPOCH)
        .expect("Incorrect time returned from get_current_time")
}

// Return timestamp in seconds
pub fn get_current_time_in_seconds() -> TimestampSeconds {
    get_current_time().as_secs()
}

// Return the wall clock as fractional unix seconds
// Used for transaction and block timestamps
pub fn get_current_timestamp() -> f64 {
    get_current_time().as_secs_f64()
}
