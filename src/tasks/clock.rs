use std::thread;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

const SLICE: Duration = Duration::from_millis(20);

/// Blocking sleep that gives up early once `token` is cancelled.
///
/// Returns `true` when the full duration elapsed.
pub fn sleep_or_cancel(token: &CancellationToken, duration: Duration) -> bool {
    let deadline = Instant::now() + duration;
    loop {
        if token.is_cancelled() {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        thread::sleep((deadline - now).min(SLICE));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completes_when_not_cancelled() {
        let token = CancellationToken::new();
        let start = Instant::now();
        assert!(sleep_or_cancel(&token, Duration::from_millis(60)));
        assert!(start.elapsed() >= Duration::from_millis(60));
    }

    #[test]
    fn returns_early_on_cancel() {
        let token = CancellationToken::new();
        let remote = token.clone();
        let canceller = thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            remote.cancel();
        });
        let start = Instant::now();
        assert!(!sleep_or_cancel(&token, Duration::from_secs(5)));
        assert!(start.elapsed() < Duration::from_secs(2));
        canceller.join().unwrap();
    }
}
