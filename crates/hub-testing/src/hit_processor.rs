//! A scriptable [`hub_queue::HitProcessor`] double: feed it a fixed sequence
//! of outcomes and it plays them back in order, repeating the last one once
//! the script runs out.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use hub_queue::{Hit, HitOutcome, HitProcessor};

pub struct ScriptedHitProcessor {
    script: Mutex<Vec<HitOutcome>>,
    retry_interval: Duration,
    calls: AtomicUsize,
}

impl ScriptedHitProcessor {
    #[must_use]
    pub fn new(script: Vec<HitOutcome>) -> Self {
        Self { script: Mutex::new(script), retry_interval: Duration::from_millis(5), calls: AtomicUsize::new(0) }
    }

    #[must_use]
    pub fn always(outcome: HitOutcome) -> Self {
        Self::new(vec![outcome])
    }

    #[must_use]
    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HitProcessor for ScriptedHitProcessor {
    async fn process_batch(&self, _hits: &[Hit]) -> HitOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut script = self.script.lock();
        if script.len() > 1 {
            script.remove(0)
        } else {
            script[0].clone()
        }
    }

    fn retry_interval(&self, _hits: &[Hit]) -> Duration {
        self.retry_interval
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn plays_back_outcomes_in_order_then_repeats_the_last() {
        let processor = ScriptedHitProcessor::new(vec![
            HitOutcome::Recoverable { reason: "503".to_string() },
            HitOutcome::Success,
        ]);
        assert!(matches!(processor.process_batch(&[]).await, HitOutcome::Recoverable { .. }));
        assert!(matches!(processor.process_batch(&[]).await, HitOutcome::Success));
        assert!(matches!(processor.process_batch(&[]).await, HitOutcome::Success));
        assert_eq!(processor.call_count(), 3);
    }
}
