//! Silence/turn detection: a debounce timer rearmed on every finalized chunk.
//!
//! When no new finalized text arrives for the quiet period, the detector fires once.
//! Rearming always cancels the previous timer, and every fire carries the generation it
//! was armed with so a fire that raced a rearm or a clear is ignored.

use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

pub struct TurnDetector {
    quiet_period: Duration,
    generation: u64,
    timer: Option<JoinHandle<()>>,
}

impl TurnDetector {
    pub fn new(quiet_period: Duration) -> Self {
        Self {
            quiet_period,
            generation: 0,
            timer: None,
        }
    }

    pub fn quiet_period(&self) -> Duration {
        self.quiet_period
    }

    /// Restart the quiet-period countdown; `on_quiet(generation)` runs when it elapses.
    pub fn rearm<F>(&mut self, on_quiet: F) -> u64
    where
        F: FnOnce(u64) + Send + 'static,
    {
        self.clear();
        let generation = self.generation;
        let quiet = self.quiet_period;
        self.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(quiet).await;
            on_quiet(generation);
        }));
        generation
    }

    /// Cancel any armed countdown and invalidate fires already in flight.
    pub fn clear(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        self.generation += 1;
    }

    pub fn is_armed(&self) -> bool {
        self.timer.is_some()
    }

    /// Accept a fire if it belongs to the armed countdown. Each countdown is accepted once.
    pub fn take_fire(&mut self, generation: u64) -> bool {
        if self.timer.is_some() && generation == self.generation {
            self.timer = None;
            true
        } else {
            debug!(generation, current = self.generation, "Stale silence timer ignored");
            false
        }
    }
}

impl Drop for TurnDetector {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[tokio::test(start_paused = true)]
    async fn rearm_pushes_the_deadline_out() {
        let mut detector = TurnDetector::new(Duration::from_millis(1000));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let start = tokio::time::Instant::now();

        let tx1 = tx.clone();
        let first = detector.rearm(move |g| {
            let _ = tx1.send(g);
        });
        tokio::time::sleep(Duration::from_millis(600)).await;
        let tx2 = tx.clone();
        let second = detector.rearm(move |g| {
            let _ = tx2.send(g);
        });
        assert_ne!(first, second);

        let fired = rx.recv().await.unwrap();
        assert_eq!(fired, second);
        assert!(start.elapsed() >= Duration::from_millis(1600));
        assert!(detector.take_fire(fired));
        assert!(!detector.take_fire(fired));
        assert!(!detector.take_fire(first));
    }

    #[tokio::test(start_paused = true)]
    async fn clear_invalidates_a_fire_already_sent() {
        let mut detector = TurnDetector::new(Duration::from_millis(100));
        let (tx, mut rx) = mpsc::unbounded_channel();
        detector.rearm(move |g| {
            let _ = tx.send(g);
        });
        let fired = rx.recv().await.unwrap();
        detector.clear();
        assert!(!detector.is_armed());
        assert!(!detector.take_fire(fired));
    }
}
