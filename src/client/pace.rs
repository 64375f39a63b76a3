use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;

/// Courtesy spacing between consecutive network calls.
///
/// The first call goes out immediately; each later call waits until at
/// least `delay` has passed since the previous one. A zero delay disables
/// pacing.
#[derive(Debug)]
pub struct Pacer {
    delay: Duration,
    last: Mutex<Option<Instant>>,
}

impl Pacer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            last: Mutex::new(None),
        }
    }

    /// Wait for this call's slot, then mark it taken.
    pub async fn wait(&self) {
        if self.delay.is_zero() {
            return;
        }
        let previous = *self.last.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = previous {
            let ready_at = previous + self.delay;
            if ready_at > Instant::now() {
                log::trace!("Pacing: sleeping until next slot");
                tokio::time::sleep_until(ready_at).await;
            }
        }
        *self.last.lock().unwrap_or_else(|e| e.into_inner()) = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_first_call_is_immediate_then_spaced() {
        let pacer = Pacer::new(Duration::from_millis(100));
        let start = Instant::now();
        pacer.wait().await;
        assert_eq!(start.elapsed(), Duration::ZERO);
        pacer.wait().await;
        assert!(start.elapsed() >= Duration::from_millis(100));
        pacer.wait().await;
        assert!(start.elapsed() >= Duration::from_millis(200));
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_never_sleeps() {
        let pacer = Pacer::new(Duration::ZERO);
        let start = Instant::now();
        for _ in 0..5 {
            pacer.wait().await;
        }
        assert_eq!(start.elapsed(), Duration::ZERO);
    }
}
