use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Inclusive range a randomized pause is drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelayWindow {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl DelayWindow {
    pub const fn new(min_ms: u64, max_ms: u64) -> Self {
        Self { min_ms, max_ms }
    }

    pub fn width_ms(&self) -> u64 {
        self.max_ms.saturating_sub(self.min_ms)
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        if self.max_ms <= self.min_ms {
            return Duration::from_millis(self.min_ms);
        }
        Duration::from_millis(rng.gen_range(self.min_ms..=self.max_ms))
    }
}

pub trait Pacer {
    fn pause(&self, window: &DelayWindow);
}

/// Sleeps the calling thread for a random duration inside the window.
#[derive(Debug, Default, Clone, Copy)]
pub struct JitterPacer;

impl Pacer for JitterPacer {
    fn pause(&self, window: &DelayWindow) {
        let delay = window.sample(&mut rand::thread_rng());
        log::trace!("Sleeping {} ms", delay.as_millis());
        std::thread::sleep(delay);
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoPacer;

impl Pacer for NoPacer {
    fn pause(&self, _window: &DelayWindow) {}
}

impl<P: Pacer + ?Sized> Pacer for &P {
    fn pause(&self, window: &DelayWindow) {
        (**self).pause(window)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn samples_stay_inside_window() {
        let window = DelayWindow::new(500, 1500);
        let mut rng = rand::thread_rng();
        for _ in 0..200 {
            let d = window.sample(&mut rng).as_millis() as u64;
            assert!((500..=1500).contains(&d));
        }
    }

    #[test]
    fn degenerate_window_is_fixed() {
        let window = DelayWindow::new(700, 100);
        assert_eq!(window.sample(&mut rand::thread_rng()), Duration::from_millis(700));
        assert_eq!(window.width_ms(), 0);
    }
}
