use log::trace;
use std::thread;
use std::time::{Duration, Instant};

/// Paces the cycle loop to a target frequency.
///
/// `sleep()` is far too coarse for sub-millisecond periods, so time saved by
/// fast cycles is banked as debt and slept off in one go once it crosses
/// `threshold`. Slow cycles pay the debt back first.
#[derive(Debug)]
pub struct Sleeper {
    period: Duration,
    threshold: Duration,
    debt: Duration,
    last: Instant,
}

impl Sleeper {
    pub fn with_frequency(hz: u32) -> Self {
        Sleeper {
            period: Duration::from_nanos(1_000_000_000 / u64::from(hz.max(1))),
            threshold: Duration::from_millis(25),
            debt: Duration::ZERO,
            last: Instant::now(),
        }
    }

    pub fn sleep(&mut self) {
        if let Some(nap) = self.settle(self.last.elapsed()) {
            trace!("Sleeping for {}ms", nap.as_millis());
            thread::sleep(nap);
        }
        self.last = Instant::now();
    }

    // Books one cycle that took `elapsed`; returns how long to sleep, if at all.
    fn settle(&mut self, elapsed: Duration) -> Option<Duration> {
        match self.period.checked_sub(elapsed) {
            Some(ahead) => {
                self.debt += ahead;
                trace!("Sleep debt now {:?} (+{:?})", self.debt, ahead);
            }
            None => {
                let behind = elapsed - self.period;
                if self.debt >= behind {
                    self.debt -= behind;
                    trace!("Running slow, sleep debt now {:?}", self.debt);
                } else {
                    trace!("Running REALLY slow, dropping sleep debt");
                    self.debt = Duration::ZERO;
                }
                return None;
            }
        }
        if self.debt > self.threshold {
            Some(std::mem::take(&mut self.debt))
        } else {
            None
        }
    }
}
