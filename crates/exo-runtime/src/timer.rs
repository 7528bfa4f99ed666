//! [`LoopTimer`] – paces control-loop iterations toward a target frequency.
//!
//! The timer keeps an absolute deadline and advances it by one period per
//! call, so sleep jitter does not accumulate into drift.  When an iteration
//! runs late:
//!
//! - by less than one period, the next wait is shortened and the loop
//!   catches up;
//! - by a full period or more, the schedule is re-anchored at "now" instead
//!   of bursting through the backlog.
//!
//! No wait is ever negative and lateness is never an error: it is counted in
//! [`CycleStats`] and logged.

use std::time::{Duration, Instant};

use exo_types::ExoError;
use serde::Serialize;
use tracing::{debug, warn};

/// Whether [`LoopTimer::pace`] actually sleeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PacingMode {
    /// Sleep until the next deadline.
    Realtime,
    /// Return immediately; only statistics are kept.  Used for replay.
    Unpaced,
}

// ─── Cycle statistics ───────────────────────────────────────────────

/// Period statistics between successive `pace` returns.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CycleStats {
    /// Number of `pace` calls.
    pub cycle_count: u64,
    /// Calls that arrived after their deadline.
    pub overruns: u64,
    /// Overruns of a full period or more, after which the schedule was
    /// re-anchored.
    pub resyncs: u64,
    /// Shortest observed period [s].
    pub min_period: Option<f64>,
    /// Longest observed period [s].
    pub max_period: Option<f64>,
    #[serde(skip)]
    sum_period: f64,
    #[serde(skip)]
    periods: u64,
}

impl CycleStats {
    fn record_period(&mut self, period: f64) {
        self.min_period = Some(self.min_period.map_or(period, |m| m.min(period)));
        self.max_period = Some(self.max_period.map_or(period, |m| m.max(period)));
        self.sum_period += period;
        self.periods += 1;
    }

    /// Mean observed period [s], `None` before the second call.
    pub fn avg_period(&self) -> Option<f64> {
        (self.periods > 0).then(|| self.sum_period / self.periods as f64)
    }
}

// ─── Scheduling ─────────────────────────────────────────────────────

/// One scheduling decision: how long to wait now and the deadline after.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    pub wait: Duration,
    pub next_deadline: Instant,
    pub overrun: bool,
    pub resync: bool,
}

/// Decide the wait for a call arriving at `now` against `deadline`.
pub fn schedule(deadline: Instant, now: Instant, period: Duration) -> Schedule {
    if now <= deadline {
        return Schedule {
            wait: deadline - now,
            next_deadline: deadline + period,
            overrun: false,
            resync: false,
        };
    }
    let lateness = now - deadline;
    if lateness >= period {
        Schedule {
            wait: Duration::ZERO,
            next_deadline: now + period,
            overrun: true,
            resync: true,
        }
    } else {
        Schedule {
            wait: Duration::ZERO,
            next_deadline: deadline + period,
            overrun: true,
            resync: false,
        }
    }
}

// ─── LoopTimer ──────────────────────────────────────────────────────

#[derive(Debug)]
pub struct LoopTimer {
    period: Duration,
    mode: PacingMode,
    deadline: Option<Instant>,
    last_return: Option<Instant>,
    stats: CycleStats,
}

impl LoopTimer {
    /// Timer for `target_freq` Hz.
    ///
    /// # Errors
    ///
    /// Returns [`ExoError::Config`] unless `target_freq` is a positive,
    /// finite number.
    pub fn new(target_freq: f64, mode: PacingMode) -> Result<Self, ExoError> {
        if !(target_freq.is_finite() && target_freq > 0.0) {
            return Err(ExoError::Config(format!(
                "target frequency must be positive, got {target_freq}"
            )));
        }
        Ok(Self {
            period: Duration::from_secs_f64(1.0 / target_freq),
            mode,
            deadline: None,
            last_return: None,
            stats: CycleStats::default(),
        })
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn mode(&self) -> PacingMode {
        self.mode
    }

    pub fn stats(&self) -> &CycleStats {
        &self.stats
    }

    /// Block until the next iteration is due.
    ///
    /// The first call returns at once and anchors the schedule.
    pub fn pace(&mut self) {
        let now = Instant::now();
        if self.mode == PacingMode::Realtime {
            match self.deadline {
                None => self.deadline = Some(now + self.period),
                Some(deadline) => {
                    let step = schedule(deadline, now, self.period);
                    if !step.wait.is_zero() {
                        std::thread::sleep(step.wait);
                    }
                    if step.resync {
                        self.stats.resyncs += 1;
                        warn!(
                            late_ms = (now - deadline).as_secs_f64() * 1e3,
                            period_ms = self.period.as_secs_f64() * 1e3,
                            "loop overran by more than one period; schedule re-anchored"
                        );
                    } else if step.overrun {
                        debug!(late_us = (now - deadline).as_micros() as u64, "loop iteration late");
                    }
                    if step.overrun {
                        self.stats.overruns += 1;
                    }
                    self.deadline = Some(step.next_deadline);
                }
            }
        }

        let returned = Instant::now();
        if let Some(prev) = self.last_return {
            self.stats.record_period((returned - prev).as_secs_f64());
        }
        self.last_return = Some(returned);
        self.stats.cycle_count += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const P: Duration = Duration::from_millis(10);

    #[test]
    fn on_time_call_waits_until_deadline() {
        let t0 = Instant::now();
        let s = schedule(t0 + P, t0 + Duration::from_millis(4), P);
        assert_eq!(s.wait, Duration::from_millis(6));
        assert_eq!(s.next_deadline, t0 + 2 * P);
        assert!(!s.overrun);
    }

    #[test]
    fn slightly_late_call_catches_up_next_time() {
        let t0 = Instant::now();
        let deadline = t0 + P;
        let s = schedule(deadline, deadline + Duration::from_millis(3), P);
        assert_eq!(s.wait, Duration::ZERO);
        assert!(s.overrun && !s.resync);
        // The following deadline keeps the original grid, so the next wait
        // is shortened to 7 ms.
        assert_eq!(s.next_deadline, t0 + 2 * P);
    }

    #[test]
    fn long_overrun_reanchors_instead_of_bursting() {
        let t0 = Instant::now();
        let deadline = t0 + P;
        let now = deadline + Duration::from_millis(35);
        let s = schedule(deadline, now, P);
        assert_eq!(s.wait, Duration::ZERO);
        assert!(s.resync);
        assert_eq!(s.next_deadline, now + P);
        // Only the iteration right after the overrun is affected: the one
        // after that waits a full period again.
        let after = schedule(s.next_deadline, now + Duration::from_millis(1), P);
        assert_eq!(after.wait, Duration::from_millis(9));
    }

    #[test]
    fn rejects_non_positive_frequency() {
        assert!(LoopTimer::new(0.0, PacingMode::Realtime).is_err());
        assert!(LoopTimer::new(-5.0, PacingMode::Realtime).is_err());
        assert!(LoopTimer::new(f64::NAN, PacingMode::Unpaced).is_err());
    }

    #[test]
    fn realtime_pacing_holds_average_period() {
        let mut timer = LoopTimer::new(200.0, PacingMode::Realtime).unwrap();
        let start = Instant::now();
        for _ in 0..21 {
            timer.pace();
        }
        // 20 full periods after the anchoring call.
        let elapsed = start.elapsed().as_secs_f64();
        assert!(elapsed >= 20.0 * 0.005 * 0.95, "elapsed {elapsed}");
        let avg = timer.stats().avg_period().unwrap();
        assert!(avg >= 0.005 * 0.95, "avg {avg}");
        assert_eq!(timer.stats().cycle_count, 21);
    }

    #[test]
    fn single_overrun_only_delays_one_iteration() {
        let mut timer = LoopTimer::new(100.0, PacingMode::Realtime).unwrap();
        timer.pace();
        std::thread::sleep(Duration::from_millis(35));
        let late = Instant::now();
        timer.pace();
        assert!(late.elapsed() < Duration::from_millis(5));
        assert_eq!(timer.stats().resyncs, 1);

        let before = Instant::now();
        timer.pace();
        let waited = before.elapsed();
        assert!(waited >= Duration::from_millis(8), "waited {waited:?}");
        assert!(waited < Duration::from_millis(30), "waited {waited:?}");
    }

    #[test]
    fn unpaced_mode_never_sleeps() {
        let mut timer = LoopTimer::new(1.0, PacingMode::Unpaced).unwrap();
        let start = Instant::now();
        for _ in 0..100 {
            timer.pace();
        }
        assert!(start.elapsed() < Duration::from_millis(500));
        assert_eq!(timer.stats().overruns, 0);
        assert_eq!(timer.stats().cycle_count, 100);
    }
}
