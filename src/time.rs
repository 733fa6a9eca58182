//! The single monotonic clock source every timer-driven component (SWIM
//! rounds, Raft election/heartbeat timers, pending-ACK ages) shares.

use std::sync::Once;
use std::time::Instant;

static INIT: Once = Once::new();
static mut START: Option<Instant> = None;

fn start() -> Instant {
    unsafe {
        INIT.call_once(|| START = Some(Instant::now()));
        START.expect("initialized by call_once above")
    }
}

/// Milliseconds elapsed since this process's first call to `now_ms()`.
/// Anchored at first use via `Instant` rather than wall-clock time so
/// timer arithmetic stays cheap and doesn't depend on NTP adjustments
/// mid-run.
pub fn now_ms() -> u64 {
    start().elapsed().as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn now_ms_is_monotonic() {
        let a = now_ms();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let b = now_ms();
        assert!(b >= a);
    }
}
