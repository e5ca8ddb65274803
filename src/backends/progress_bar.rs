//! Progress reporting for long step loops (`progress` feature).
//!
//! [`StepProgress`] drives an `indicatif` bar over the time steps of a run. Its message shows the
//! time just computed, the wall-clock cost of that step and a smoothed cost over the run so far.
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};

use crate::constants::Day;

/// Exponentially smoothed wall-clock cost of a step, in seconds.
#[derive(Debug, Default)]
struct StepCost {
    smoothed: Option<f64>,
}

impl StepCost {
    /// Weight of the newest step.
    const WEIGHT: f64 = 0.2;

    /// Fold one step cost in and return the updated average. The first step seeds it.
    fn record(&mut self, seconds: f64) -> f64 {
        let next = match self.smoothed {
            None => seconds,
            Some(prev) => prev + Self::WEIGHT * (seconds - prev),
        };
        self.smoothed = Some(next);
        next
    }
}

/// Short rendering of a wall-clock span: `"253µs"`, `"42.0ms"`, `"3.14s"`.
fn human_seconds(seconds: f64) -> String {
    if seconds < 1e-3 {
        format!("{:.0}µs", seconds * 1e6)
    } else if seconds < 1.0 {
        format!("{:.1}ms", seconds * 1e3)
    } else {
        format!("{seconds:.2}s")
    }
}

/// Progress bar over the time steps of a run.
pub struct StepProgress {
    bar: ProgressBar,
    last: Instant,
    cost: StepCost,
}

impl StepProgress {
    pub fn new(n_steps: usize) -> Self {
        let bar = ProgressBar::new((n_steps as u64).max(1));
        let style = ProgressStyle::with_template(
            "{bar:40.cyan/blue} {pos}/{len} ({percent:>3}%) | ETA {eta_precise} | {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar());
        bar.set_style(style);
        bar.enable_steady_tick(Duration::from_millis(200));
        StepProgress {
            bar,
            last: Instant::now(),
            cost: StepCost::default(),
        }
    }

    /// Record one finished step at `time`.
    pub fn tick(&mut self, time: Day) {
        let now = Instant::now();
        let step = now.duration_since(self.last).as_secs_f64();
        self.last = now;
        let smoothed = self.cost.record(step);
        self.bar.set_message(format!(
            "t={time:.5} d | step {} | ~{}/step",
            human_seconds(step),
            human_seconds(smoothed)
        ));
        self.bar.inc(1);
    }

    pub fn finish(self) {
        self.bar.finish_and_clear();
    }
}

#[cfg(test)]
mod progress_test {
    use super::*;

    #[test]
    fn test_human_seconds() {
        assert_eq!(human_seconds(253e-6), "253µs");
        assert_eq!(human_seconds(0.042), "42.0ms");
        assert_eq!(human_seconds(3.14), "3.14s");
    }

    #[test]
    fn test_step_cost_smoothing() {
        let mut cost = StepCost::default();
        assert_eq!(cost.record(1.0), 1.0);
        assert!((cost.record(2.0) - 1.2).abs() < 1e-12);
        assert!((cost.record(1.2) - 1.2).abs() < 1e-12);
    }
}
