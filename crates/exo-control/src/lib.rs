//! `exo-control` – gait estimation and control laws for the ankle
//! exoskeleton.
//!
//! # Modules
//!
//! - [`estimator`] – [`GaitStateEstimator`] trait and the heel-strike
//!   detector.
//! - [`controller`] – [`Controller`] trait, spline assistance, zero-torque
//!   and standing-hold laws.
//! - [`pid`] – PID loop used by the standing-hold law.
//! - [`limits`] – [`CommandLimiter`], the rule engine every outgoing command
//!   passes through.
//! - [`muxer`] – builds the estimator and controller a configuration names.

pub mod controller;
pub mod estimator;
pub mod limits;
pub mod muxer;
pub mod pid;

pub use controller::{
    Controller, SplineController, StandingHoldController, ZeroTorqueController, spline_torque,
};
pub use estimator::{GaitStateEstimator, HeelStrikeEstimator};
pub use limits::{CommandLimiter, CommandRule};
pub use muxer::{build_controller, build_estimator};
