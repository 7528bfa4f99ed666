//! Gait-state estimation.
//!
//! A [`GaitStateEstimator`] turns one side's [`Frame`] stream into a
//! [`GaitState`].  The stock implementation, [`HeelStrikeEstimator`], finds
//! heel strikes as rising edges of the shank gyroscope signal and derives
//! gait phase from the running mean of recent stride periods.

use std::collections::VecDeque;

use exo_types::{Configuration, EstimatorParams, Frame, GaitState, Side};
use tracing::{debug, trace};

/// Per-side gait-state detector.
///
/// `detect` is called exactly once per iteration with the frame just read,
/// in loop order.
pub trait GaitStateEstimator: Send {
    fn detect(&mut self, frame: &Frame) -> GaitState;

    /// Pick up new estimator parameters.  Called at the start of the
    /// iteration that first sees the update.
    fn update_params(&mut self, config: &Configuration);
}

// ────────────────────────────────────────────────────────────────────────────
// HeelStrikeEstimator
// ────────────────────────────────────────────────────────────────────────────

/// Heel-strike detector with stride-period averaging.
///
/// - A heel strike is a rising crossing of `gyro_z` above
///   `heel_strike_threshold`, at least `heel_strike_refractory` seconds after
///   the previous one.
/// - The stride period is the mean of the last `num_strides_averaged`
///   strike-to-strike intervals.  An interval longer than
///   `max_stride_period` means the wearer stopped walking; the history is
///   discarded.
/// - Gait phase is the time since the last strike over the stride period.
///   It is unknown until one interval has been seen, and unknown again once
///   it would exceed `1.0`.
#[derive(Debug, Clone)]
pub struct HeelStrikeEstimator {
    side: Side,
    params: EstimatorParams,
    above_threshold: bool,
    last_strike: Option<f64>,
    intervals: VecDeque<f64>,
}

impl HeelStrikeEstimator {
    pub fn new(side: Side, params: EstimatorParams) -> Self {
        Self {
            side,
            params,
            above_threshold: false,
            last_strike: None,
            intervals: VecDeque::new(),
        }
    }

    fn stride_period(&self) -> Option<f64> {
        if self.intervals.is_empty() {
            return None;
        }
        Some(self.intervals.iter().sum::<f64>() / self.intervals.len() as f64)
    }

    fn trim_history(&mut self) {
        let keep = self.params.num_strides_averaged.max(1);
        while self.intervals.len() > keep {
            self.intervals.pop_front();
        }
    }

    /// Returns `true` if the rising edge at `t` counts as a heel strike.
    fn register_edge(&mut self, t: f64) -> bool {
        match self.last_strike {
            Some(prev) => {
                let interval = t - prev;
                if interval < self.params.heel_strike_refractory {
                    trace!(side = %self.side, interval, "edge inside refractory window ignored");
                    return false;
                }
                if interval > self.params.max_stride_period {
                    debug!(side = %self.side, interval, "stride too long; stride history reset");
                    self.intervals.clear();
                } else {
                    self.intervals.push_back(interval);
                    self.trim_history();
                }
            }
            None => debug!(side = %self.side, t, "first heel strike"),
        }
        self.last_strike = Some(t);
        true
    }
}

impl GaitStateEstimator for HeelStrikeEstimator {
    fn detect(&mut self, frame: &Frame) -> GaitState {
        let t = frame.loop_time;
        let above = frame.gyro_z > self.params.heel_strike_threshold;
        let rising = above && !self.above_threshold;
        self.above_threshold = above;

        let heel_strike = rising && self.register_edge(t);
        let stride_period = self.stride_period();
        let gait_phase = match (self.last_strike, stride_period) {
            (Some(strike), Some(period)) if period > 0.0 => {
                let phase = (t - strike) / period;
                (0.0..=1.0).contains(&phase).then_some(phase)
            }
            _ => None,
        };

        GaitState {
            heel_strike,
            gait_phase,
            stride_period,
        }
    }

    fn update_params(&mut self, config: &Configuration) {
        self.params = config.estimator_params.clone();
        self.trim_history();
    }
}
