//! Cancellation input-watcher thread.
//!
//! Grounded in the teacher's `MiningControl` atomic-flag pattern
//! (`facades/rust/src/lib.rs`), narrowed from pause/resume/stop to the
//! single cooperative cancellation flag the spec calls for.

use std::io::Read;
use std::thread::JoinHandle;

use collatz_search_gpu::CancelFlag;

/// Spawn a thread that performs blocking single-byte reads of stdin,
/// setting `flag` when `key` is observed.
///
/// The terminal is left in whatever buffering mode the platform
/// default provides; on a line-buffered terminal the keystroke is only
/// delivered to this thread after Enter, which matches the spec's
/// documented caveat rather than fighting the default stdin mode.
pub fn spawn_watcher(key: u8, flag: CancelFlag) -> JoinHandle<()> {
    std::thread::spawn(move || {
        let mut stdin = std::io::stdin();
        let mut byte = [0u8; 1];
        loop {
            match stdin.read(&mut byte) {
                Ok(0) => break, // stdin closed
                Ok(_) => {
                    if byte[0] == key {
                        flag.set();
                        break;
                    }
                }
                Err(_) => break,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_flag_starts_clear() {
        let flag = CancelFlag::new();
        assert!(!flag.is_set());
    }
}
